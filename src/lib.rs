//! # TranslationGummy Library
//!
//! 页内双语翻译覆盖层：在活动文档中挑选可翻译片段，写入可还原的译文，
//! 并在页面变化时自动补翻。
//!
//! ## 模块组织
//!
//! - `parsers` - HTML 解析、DOM 操作、可观察的活动文档
//! - `translation` - 语言识别、翻译网关、覆盖层、编排与控制器
//! - `env` - 环境变量
//! - `logging` - 日志初始化

pub mod env;
pub mod logging;
pub mod parsers;
pub mod translation;

// Re-export commonly used items for convenience
pub use parsers::{LiveDocument, MutationKind, MutationRecord};
pub use translation::{
    OverlayConfig, OverlayController, PageTranslationStatus, TranslationError, TranslationResult,
};
