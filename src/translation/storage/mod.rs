//! 存储模块
//!
//! 翻译结果缓存与外部设置存储。

pub mod cache;
pub mod settings;

pub use cache::{CacheKey, CacheStats, TranslationCache};
pub use settings::{
    reset_tab_state, resolve_tab_enabled, stored_tab_enabled, target_read_lang,
    target_write_lang, MemorySettings, SettingChange, SettingsStore, ShellChannel, TabState,
};
