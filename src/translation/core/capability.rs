//! 外部翻译 / 语言检测能力的契约
//!
//! 宿主环境（浏览器内置 Translator / LanguageDetector）通过这些 trait 接入，
//! 本 crate 只依赖契约而不关心实现。

use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// 源语言 → 目标语言
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// 源语言与目标语言相同（无需翻译）
    pub fn is_identity(&self) -> bool {
        self.source.eq_ignore_ascii_case(&self.target)
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.source, self.target)
    }
}

/// 语言对的可用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Downloadable,
    Unavailable,
}

/// 外部能力错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// 当前环境没有该能力
    #[error("capability not supported in this environment")]
    NotSupported,

    /// 权限被拒绝（检测器被策略禁用等）
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// 需要用户直接操作才能开始下载
    #[error("requires user activation: {0}")]
    RequiresUserActivation(String),

    #[error("capability call failed: {0}")]
    Failed(String),
}

/// 语言检测候选
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionCandidate {
    pub language: String,
    pub confidence: f64,
}

/// 下载进度汇报器，交给 `TranslatorCapability::create`
#[derive(Debug, Clone)]
pub struct DownloadMonitor {
    sender: mpsc::UnboundedSender<u8>,
}

impl DownloadMonitor {
    pub fn new(sender: mpsc::UnboundedSender<u8>) -> Self {
        Self { sender }
    }

    /// 报告已加载比例（0.0 – 1.0）
    pub fn report(&self, loaded: f64) {
        let percent = (loaded.clamp(0.0, 1.0) * 100.0).round() as u8;
        // 接收方已放弃监听时丢弃进度即可
        let _ = self.sender.send(percent);
    }
}

/// 已创建的翻译器实例
#[async_trait(?Send)]
pub trait TranslatorHandle {
    async fn translate(&self, text: &str) -> Result<String, CapabilityError>;
}

/// 翻译能力
#[async_trait(?Send)]
pub trait TranslatorCapability {
    /// 查询语言对是否可用
    async fn availability(&self, pair: &LanguagePair) -> Result<Availability, CapabilityError>;

    /// 创建翻译器；语言对需要下载时，会在下载完成后才返回
    async fn create(
        &self,
        pair: &LanguagePair,
        monitor: Option<DownloadMonitor>,
    ) -> Result<Rc<dyn TranslatorHandle>, CapabilityError>;
}

/// 设备端语言检测能力（可选）
#[async_trait(?Send)]
pub trait LanguageDetector {
    async fn detect(&self, text: &str) -> Result<Vec<DetectionCandidate>, CapabilityError>;
}

/// 宿主平台的轻量语言提示（可选）
#[async_trait(?Send)]
pub trait LanguageHintProvider {
    async fn detect_hint(&self, text: &str) -> Option<String>;
}
