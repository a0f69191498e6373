//! 覆盖层配置
//!
//! 统一的配置接口，支持文件配置、环境变量和默认值

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::error::{helpers, TranslationResult};

/// 覆盖层配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OverlayConfig {
    // 片段选择
    pub min_block_chars: usize,

    // 翻译能力
    pub translate_timeout_ms: u64,
    pub detector_char_limit: usize,
    pub download_recheck_delay_ms: u64,
    pub translation_cache_size: usize,

    // 自动翻译
    pub mutation_debounce_ms: u64,
    pub navigation_settle_delay_ms: u64,
    pub observer_retry_interval_ms: u64,

    // 下载轮询
    pub poll_interval_ms: u64,
    pub poll_max_attempts: usize,

    // 状态提示
    pub error_banner_duration_ms: u64,

    // 默认语言
    pub default_read_lang: String,
    pub default_write_lang: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            min_block_chars: constants::MIN_BLOCK_CHARS,

            translate_timeout_ms: constants::DEFAULT_TRANSLATE_TIMEOUT.as_millis() as u64,
            detector_char_limit: constants::DETECTOR_CHAR_LIMIT,
            download_recheck_delay_ms: constants::DOWNLOAD_RECHECK_DELAY.as_millis() as u64,
            translation_cache_size: constants::DEFAULT_TRANSLATION_CACHE_SIZE,

            mutation_debounce_ms: constants::DEFAULT_MUTATION_DEBOUNCE.as_millis() as u64,
            navigation_settle_delay_ms: constants::DEFAULT_NAVIGATION_SETTLE_DELAY.as_millis()
                as u64,
            observer_retry_interval_ms: constants::OBSERVER_RETRY_INTERVAL.as_millis() as u64,

            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL.as_millis() as u64,
            poll_max_attempts: constants::DEFAULT_POLL_MAX_ATTEMPTS,

            error_banner_duration_ms: constants::ERROR_BANNER_DURATION.as_millis() as u64,

            default_read_lang: constants::DEFAULT_READ_LANG.to_string(),
            default_write_lang: constants::DEFAULT_WRITE_LANG.to_string(),
        }
    }
}

impl OverlayConfig {
    /// 按搜索路径加载第一个存在的配置文件，再应用环境变量
    pub fn load() -> TranslationResult<Self> {
        let mut config = constants::CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Self::from_file)
            .transpose()?
            .unwrap_or_default();

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载
    pub fn from_file(path: &Path) -> TranslationResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        tracing::info!("已加载配置文件: {}", path.display());
        Ok(config)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml(content: &str) -> TranslationResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.translate_timeout_ms == 0 {
            return Err(helpers::config_error("翻译超时不能为0"));
        }

        if self.poll_interval_ms == 0 || self.poll_max_attempts == 0 {
            return Err(helpers::config_error("轮询间隔与轮询次数必须大于0"));
        }

        if self.detector_char_limit == 0 {
            return Err(helpers::config_error("语言检测字符上限不能为0"));
        }

        if self.translation_cache_size == 0 {
            return Err(helpers::config_error("翻译缓存大小不能为0"));
        }

        if self.default_read_lang.trim().is_empty() || self.default_write_lang.trim().is_empty() {
            return Err(helpers::config_error("默认语言不能为空"));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{overlay, EnvVar};

        if let Ok(lang) = overlay::ReadLang::get() {
            self.default_read_lang = lang;
        }

        if let Ok(lang) = overlay::WriteLang::get() {
            self.default_write_lang = lang;
        }

        if let Ok(timeout) = overlay::TranslateTimeout::get() {
            self.translate_timeout_ms = timeout.as_millis() as u64;
            tracing::info!("环境变量覆盖翻译超时: {}ms", self.translate_timeout_ms);
        }

        if let Ok(debounce) = overlay::MutationDebounce::get() {
            self.mutation_debounce_ms = debounce.as_millis() as u64;
        }

        if let Ok(interval) = overlay::PollInterval::get() {
            self.poll_interval_ms = interval.as_millis() as u64;
        }

        if let Ok(attempts) = overlay::PollMaxAttempts::get() {
            self.poll_max_attempts = attempts;
        }
    }

    pub fn translate_timeout(&self) -> Duration {
        Duration::from_millis(self.translate_timeout_ms)
    }

    pub fn download_recheck_delay(&self) -> Duration {
        Duration::from_millis(self.download_recheck_delay_ms)
    }

    pub fn mutation_debounce(&self) -> Duration {
        Duration::from_millis(self.mutation_debounce_ms)
    }

    pub fn navigation_settle_delay(&self) -> Duration {
        Duration::from_millis(self.navigation_settle_delay_ms)
    }

    pub fn observer_retry_interval(&self) -> Duration {
        Duration::from_millis(self.observer_retry_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_banner_duration(&self) -> Duration {
        Duration::from_millis(self.error_banner_duration_ms)
    }
}
