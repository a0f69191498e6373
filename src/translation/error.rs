//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制

use std::fmt;

use thiserror::Error;

use crate::translation::core::capability::CapabilityError;

/// 翻译错误类型
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 外部翻译能力错误
    #[error("翻译能力错误: {0}")]
    CapabilityError(String),

    /// 超时错误
    #[error("操作超时: {0}")]
    TimeoutError(String),

    /// DOM 结构与预期不符
    #[error("DOM错误: {0}")]
    DomError(String),

    /// 非法的覆盖层状态迁移
    #[error("非法状态迁移: {from} -> {event}")]
    InvalidTransition { from: String, event: String },

    /// 设置存储错误
    #[error("存储错误: {0}")]
    StorageError(String),

    /// 与扩展外壳通信失败
    #[error("外壳通信错误: {0}")]
    ShellError(String),

    /// 任务队列已关闭
    #[error("任务队列已关闭")]
    QueueClosed,

    /// 解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::CapabilityError(_) => true,
            TranslationError::TimeoutError(_) => true,
            TranslationError::StorageError(_) => true,
            TranslationError::ShellError(_) => true,
            TranslationError::ConfigError(_) => false,
            TranslationError::InvalidInput(_) => false,
            TranslationError::DomError(_) => false,
            TranslationError::InvalidTransition { .. } => false,
            TranslationError::QueueClosed => false,
            TranslationError::ParseError(_) => false,
            TranslationError::SerializationError(_) => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::CapabilityError(_) => ErrorSeverity::Warning,
            TranslationError::TimeoutError(_) => ErrorSeverity::Warning,
            TranslationError::DomError(_) => ErrorSeverity::Warning,
            TranslationError::InvalidTransition { .. } => ErrorSeverity::Warning,
            TranslationError::StorageError(_) => ErrorSeverity::Warning,
            TranslationError::ShellError(_) => ErrorSeverity::Warning,
            TranslationError::QueueClosed => ErrorSeverity::Error,
            TranslationError::ParseError(_) => ErrorSeverity::Error,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::CapabilityError(_) => ErrorCategory::Capability,
            TranslationError::TimeoutError(_) => ErrorCategory::Timeout,
            TranslationError::DomError(_) => ErrorCategory::Dom,
            TranslationError::InvalidTransition { .. } => ErrorCategory::Dom,
            TranslationError::StorageError(_) => ErrorCategory::Storage,
            TranslationError::ShellError(_) => ErrorCategory::Storage,
            TranslationError::QueueClosed => ErrorCategory::Concurrency,
            TranslationError::ParseError(_) => ErrorCategory::Parsing,
            TranslationError::SerializationError(_) => ErrorCategory::Parsing,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let new_msg = format!("{} (上下文: {})", self, context);

        match &mut self {
            TranslationError::ConfigError(msg)
            | TranslationError::InvalidInput(msg)
            | TranslationError::CapabilityError(msg)
            | TranslationError::TimeoutError(msg)
            | TranslationError::DomError(msg)
            | TranslationError::StorageError(msg)
            | TranslationError::ShellError(msg)
            | TranslationError::ParseError(msg)
            | TranslationError::SerializationError(msg)
            | TranslationError::InternalError(msg) => *msg = new_msg,
            TranslationError::InvalidTransition { .. } | TranslationError::QueueClosed => {}
        }

        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Capability,
    Timeout,
    Dom,
    Storage,
    Concurrency,
    Parsing,
    Internal,
}

impl From<CapabilityError> for TranslationError {
    fn from(error: CapabilityError) -> Self {
        TranslationError::CapabilityError(error.to_string())
    }
}

impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::InternalError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ParseError(format!("TOML解析错误: {}", error))
    }
}

impl From<tokio::time::error::Elapsed> for TranslationError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        TranslationError::TimeoutError(format!("异步操作超时: {}", error))
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }
    }

    /// 创建DOM错误
    pub fn dom_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::DomError(msg.to_string())
    }

    /// 创建配置错误
    pub fn config_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::ConfigError(msg.to_string())
    }
}
