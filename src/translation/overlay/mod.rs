//! 覆盖层模块
//!
//! - `markers`: DOM 标记命名空间与自身变更识别
//! - `state`: 节点状态机与行内快照账本
//! - `engine`: 写入 / 还原译文
//! - `indicator`: 页面状态提示

pub mod engine;
pub mod indicator;
pub mod markers;
pub mod state;

pub use engine::{
    page_status, replace_direct_text, sanitize_element, wrapper_text, OverlayEngine,
    PageTranslationStatus, RevertReport,
};
pub use indicator::{IndicatorMessage, StatusIndicator};
pub use markers::{introduces_content, is_self_generated, InjectedKind};
pub use state::{BackupLedger, InlineBackup, OverlayEvent, OverlayState};
