//! 翻译管道模块
//!
//! 页面文本进入翻译前的两步：识别语言、挑选片段

pub mod classifier;
pub mod selector;

// 重新导出主要类型
pub use classifier::{detect_by_script, normalize_language_tag, LanguageClassifier};
pub use selector::{Fragment, FragmentMode, FragmentSelector};
