//! 覆盖层配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::OverlayConfig;

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 片段选择
    pub const MIN_BLOCK_CHARS: usize = 10;
    pub const BLOCK_SELECTORS: &[&str] = &["p", "h1", "h2", "h3", "li", "blockquote"];
    pub const NESTED_BLOCK_TAGS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote"];
    pub const INLINE_TARGET_TAGS: &[&str] = &["a", "button", "span"];
    pub const NAV_ROLES: &[&str] = &["navigation", "menu", "menubar"];
    pub const NAV_CLASS_HINTS: &[&str] = &["menu", "menu-bar", "menubar", "dropdown", "navbar"];

    // 翻译能力
    pub const DEFAULT_TRANSLATE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DETECTOR_CHAR_LIMIT: usize = 4000;
    pub const DOWNLOAD_RECHECK_DELAY: Duration = Duration::from_secs(2);
    pub const DEFAULT_TRANSLATION_CACHE_SIZE: usize = 500;

    // 自动翻译
    pub const DEFAULT_MUTATION_DEBOUNCE: Duration = Duration::from_millis(600);
    pub const DEFAULT_NAVIGATION_SETTLE_DELAY: Duration = Duration::from_millis(800);
    pub const OBSERVER_RETRY_INTERVAL: Duration = Duration::from_millis(100);

    // 模型下载轮询（约 5 分钟）
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
    pub const DEFAULT_POLL_MAX_ATTEMPTS: usize = 30;

    // 状态提示
    pub const ERROR_BANNER_DURATION: Duration = Duration::from_secs(3);

    // 默认语言
    pub const DEFAULT_READ_LANG: &str = "en";
    pub const DEFAULT_WRITE_LANG: &str = "en";

    // 设置存储键
    pub const KEY_TARGET_READ_LANG: &str = "targetReadLang";
    pub const KEY_TARGET_WRITE_LANG: &str = "targetWriteLang";
    pub const KEY_TOGGLE_STATE: &str = "translationToggleState";
    pub const KEY_TOGGLE_STATE_BY_TAB: &str = "translationToggleStateByTab";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "translationgummy.toml",
        ".translationgummy.toml",
        "/etc/translationgummy/overlay.toml",
    ];
}

/// 加载配置：配置文件 → 环境变量覆盖 → 校验，失败时退回默认值
pub fn load_overlay_config() -> OverlayConfig {
    match OverlayConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            OverlayConfig::default()
        }
    }
}
