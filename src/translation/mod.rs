//! 翻译模块
//!
//! 页内双语翻译覆盖层，采用清晰的模块化架构：
//! - **core**: 外部翻译能力契约与翻译网关
//! - **pipeline**: 语言识别与片段选择
//! - **overlay**: 译文写入、还原与状态提示
//! - **orchestrator**: 整页翻译过程
//! - **controller**: 自动翻译控制器与全局任务队列
//! - **storage**: 翻译缓存与设置存储
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::rc::Rc;
//!
//! use translationgummy::parsers::LiveDocument;
//! use translationgummy::translation::{
//!     LanguageClassifier, MemorySettings, OverlayConfig, OverlayController, TranslationGateway,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OverlayConfig::default();
//! let gateway = Rc::new(TranslationGateway::new(None, LanguageClassifier::heuristic_only(), &config));
//! let controller = OverlayController::new(config, gateway, Rc::new(MemorySettings::new()));
//!
//! controller.attach(LiveDocument::parse("<p>Some long enough paragraph</p>")).await?;
//! let report = controller.translate_page().await?;
//! println!("已写入 {} 处译文", report.applied);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 配置管理模块 - 覆盖层的时间参数、阈值与默认语言
pub mod config;

/// 自动翻译控制器 - 页面会话、任务队列、变更观察与导航处理
pub mod controller;

/// 核心模块 - 外部能力契约与翻译网关
pub mod core;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

/// 整页翻译编排
pub mod orchestrator;

/// 覆盖层模块 - DOM 标记、状态机、写入与还原
pub mod overlay;

/// 文本处理管道模块 - 语言识别与片段选择
pub mod pipeline;

/// 输入框即时翻译
pub mod smart_input;

/// 存储管理模块 - 翻译缓存与设置存储
pub mod storage;

// ============================================================================
// 核心API导出
// ============================================================================

pub use config::{constants, load_overlay_config, OverlayConfig};
pub use controller::{NavigationEvent, OverlayController, ShellMessage, ShellResponse, TaskQueue};
pub use core::{
    Availability, CapabilityError, GatewayEvent, LanguagePair, Placeholder, Translation,
    TranslationGateway, TranslatorCapability, TranslatorHandle,
};
pub use error::{ErrorCategory, ErrorSeverity, TranslationError, TranslationResult};
pub use orchestrator::{PassOptions, PassPhase, PassReport, TranslationOrchestrator};
pub use overlay::{OverlayEngine, PageTranslationStatus, RevertReport};
pub use pipeline::{Fragment, FragmentMode, FragmentSelector, LanguageClassifier};
pub use smart_input::{KeyPress, SmartInput};
pub use storage::{MemorySettings, SettingChange, SettingsStore, ShellChannel, TranslationCache};

// ============================================================================
// 便利函数
// ============================================================================

/// 读取 HTML 快照并统计覆盖层状态
pub fn status_of_html(html: &str) -> PageTranslationStatus {
    let document = crate::parsers::LiveDocument::parse(html);
    overlay::page_status(document.document())
}

/// 去除 HTML 快照中的全部覆盖层，返回还原后的 HTML
pub fn revert_html(html: &str) -> TranslationResult<(String, RevertReport)> {
    let document = crate::parsers::LiveDocument::parse(html);
    let engine = OverlayEngine::new(document.clone());
    let report = engine.revert_all(document.document());
    let bytes = crate::parsers::serialize_document(document.document())?;
    let restored = String::from_utf8(bytes)
        .map_err(|e| TranslationError::SerializationError(format!("输出不是有效的UTF-8: {}", e)))?;
    Ok((restored, report))
}

/// 模块版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 模块初始化
pub fn init() {
    tracing::info!("翻译覆盖层 v{} 已加载", VERSION);
}
