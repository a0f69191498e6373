//! 统一的环境变量管理系统
//!
//! 类型安全、可验证的环境变量读取，用于覆盖覆盖层配置

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => Self::DEFAULT.ok_or_else(|| EnvError {
                variable: Self::NAME.to_string(),
                message: "Required environment variable not set".to_string(),
            }),
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

fn parse_millis(name: &str, value: &str) -> EnvResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| EnvError {
            variable: name.to_string(),
            message: format!("Invalid duration '{}', expected milliseconds", value),
        })
}

fn parse_count(name: &str, value: &str) -> EnvResult<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(EnvError {
            variable: name.to_string(),
            message: format!("Invalid count '{}', expected a positive integer", value),
        }),
    }
}

fn parse_lang(name: &str, value: &str) -> EnvResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(EnvError {
            variable: name.to_string(),
            message: format!("Invalid language tag '{}'", value),
        });
    }
    Ok(trimmed.to_string())
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "GUMMY_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }
}

/// 覆盖层相关环境变量
pub mod overlay {
    use super::*;

    /// 默认阅读目标语言
    pub struct ReadLang;
    impl EnvVar<String> for ReadLang {
        const NAME: &'static str = "GUMMY_TARGET_READ_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Default target language for page translation";

        fn parse(value: &str) -> EnvResult<String> {
            parse_lang(Self::NAME, value)
        }
    }

    /// 默认输入框目标语言
    pub struct WriteLang;
    impl EnvVar<String> for WriteLang {
        const NAME: &'static str = "GUMMY_TARGET_WRITE_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Default target language for Shift+Enter input translation";

        fn parse(value: &str) -> EnvResult<String> {
            parse_lang(Self::NAME, value)
        }
    }

    /// 单次翻译超时
    pub struct TranslateTimeout;
    impl EnvVar<Duration> for TranslateTimeout {
        const NAME: &'static str = "GUMMY_TRANSLATE_TIMEOUT_MS";
        const DEFAULT: Option<Duration> = None;
        const DESCRIPTION: &'static str = "Per-fragment translation timeout in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(Self::NAME, value)
        }
    }

    /// 变更防抖时间
    pub struct MutationDebounce;
    impl EnvVar<Duration> for MutationDebounce {
        const NAME: &'static str = "GUMMY_MUTATION_DEBOUNCE_MS";
        const DEFAULT: Option<Duration> = None;
        const DESCRIPTION: &'static str = "Debounce before an auto-translate pass, in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(Self::NAME, value)
        }
    }

    /// 可用性轮询间隔
    pub struct PollInterval;
    impl EnvVar<Duration> for PollInterval {
        const NAME: &'static str = "GUMMY_POLL_INTERVAL_MS";
        const DEFAULT: Option<Duration> = None;
        const DESCRIPTION: &'static str = "Model availability poll interval in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(Self::NAME, value)
        }
    }

    /// 可用性轮询次数上限
    pub struct PollMaxAttempts;
    impl EnvVar<usize> for PollMaxAttempts {
        const NAME: &'static str = "GUMMY_POLL_MAX_ATTEMPTS";
        const DEFAULT: Option<usize> = None;
        const DESCRIPTION: &'static str = "Maximum availability poll attempts before giving up";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_count(Self::NAME, value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!(core::LogLevel::parse("DEBUG").unwrap(), "debug");
        assert!(core::LogLevel::parse("verbose").is_err());
    }

    #[test]
    fn test_duration_and_count_parse() {
        assert_eq!(
            overlay::TranslateTimeout::parse("2500").unwrap(),
            Duration::from_millis(2500)
        );
        assert!(overlay::TranslateTimeout::parse("soon").is_err());
        assert!(overlay::PollMaxAttempts::parse("0").is_err());
        assert_eq!(overlay::PollMaxAttempts::parse("12").unwrap(), 12);
    }

    #[test]
    fn test_lang_parse() {
        assert_eq!(overlay::ReadLang::parse(" zh-Hant ").unwrap(), "zh-Hant");
        assert!(overlay::WriteLang::parse("en us").is_err());
    }
}
