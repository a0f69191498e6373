//! 语言识别模块
//!
//! 三层策略，先成功者为准：
//! 1. 设备端语言检测能力（未被权限错误封禁时）
//! 2. 宿主平台的轻量语言提示
//! 3. Unicode 区段启发式

use std::cell::Cell;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;

use crate::translation::config::constants;
use crate::translation::core::capability::{
    CapabilityError, LanguageDetector, LanguageHintProvider,
};

/// 繁体中文标签
pub const TRADITIONAL_CHINESE: &str = "zh-Hant";
/// 简体中文标签
pub const SIMPLIFIED_CHINESE: &str = "zh";

const UNDETERMINED: &str = "und";

/// 按优先级排列的文字区段
fn script_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"[\x{AC00}-\x{D7AF}\x{1100}-\x{11FF}\x{3130}-\x{318F}]", "ko"),
            (r"[\x{3040}-\x{309F}\x{30A0}-\x{30FF}]", "ja"),
            (r"[\x{4E00}-\x{9FFF}\x{3400}-\x{4DBF}]", TRADITIONAL_CHINESE),
            (r"[\x{0400}-\x{04FF}]", "ru"),
            (r"[\x{0600}-\x{06FF}]", "ar"),
            (r"[\x{0900}-\x{097F}]", "hi"),
            (r"[\x{0E00}-\x{0E7F}]", "th"),
            (
                r"[ăâđêôơưĂÂĐÊÔƠƯạảấầẩẫậắằẳẵặẹẻẽếềểễệỉịọỏốồổỗộớờởỡợụủứừửữựỳỵỷỹ]",
                "vi",
            ),
        ]
        .into_iter()
        .filter_map(|(pattern, lang)| match Regex::new(pattern) {
            Ok(re) => Some((re, lang)),
            Err(e) => {
                tracing::error!("语言区段正则无效 {}: {}", lang, e);
                None
            }
        })
        .collect()
    })
}

/// 第三层：Unicode 区段启发式，默认英文
pub fn detect_by_script(text: &str) -> &'static str {
    script_rules()
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, lang)| *lang)
        .unwrap_or("en")
}

/// 规范化语言标签
///
/// 中文变体收敛为繁/简两种；带地区子标签时地区大写、其余子标签首字母大写
pub fn normalize_language_tag(tag: &str) -> String {
    let cleaned = tag.trim().replace('_', "-");
    let parts: Vec<&str> = cleaned.split('-').filter(|p| !p.is_empty()).collect();
    let Some((primary, rest)) = parts.split_first() else {
        return String::new();
    };
    let primary = primary.to_ascii_lowercase();

    if primary == "zh" {
        let lowered: Vec<String> = rest.iter().map(|p| p.to_ascii_lowercase()).collect();
        let traditional = lowered
            .iter()
            .any(|p| matches!(p.as_str(), "hant" | "tw" | "hk" | "mo"));
        return if traditional {
            TRADITIONAL_CHINESE.to_string()
        } else {
            SIMPLIFIED_CHINESE.to_string()
        };
    }

    if rest.is_empty() {
        return primary;
    }

    let mut normalized = vec![primary];
    for part in rest {
        let formatted = if part.len() == 2 && part.chars().all(|c| c.is_ascii_alphabetic()) {
            part.to_ascii_uppercase()
        } else if part.len() == 3 && part.chars().all(|c| c.is_ascii_digit()) {
            part.to_string()
        } else {
            title_case(part)
        };
        normalized.push(formatted);
    }
    normalized.join("-")
}

fn title_case(part: &str) -> String {
    let lower = part.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// 语言识别器
pub struct LanguageClassifier {
    detector: Option<Rc<dyn LanguageDetector>>,
    hint: Option<Rc<dyn LanguageHintProvider>>,
    detector_blocked: Cell<bool>,
    char_limit: usize,
}

impl LanguageClassifier {
    pub fn new(
        detector: Option<Rc<dyn LanguageDetector>>,
        hint: Option<Rc<dyn LanguageHintProvider>>,
    ) -> Self {
        Self {
            detector,
            hint,
            detector_blocked: Cell::new(false),
            char_limit: constants::DETECTOR_CHAR_LIMIT,
        }
    }

    /// 只有启发式一层
    pub fn heuristic_only() -> Self {
        Self::new(None, None)
    }

    pub fn with_char_limit(mut self, limit: usize) -> Self {
        self.char_limit = limit.max(1);
        self
    }

    /// 检测器是否因权限错误被停用
    pub fn is_detector_blocked(&self) -> bool {
        self.detector_blocked.get()
    }

    /// 识别文本的源语言，返回规范化标签
    pub async fn detect(&self, text: &str) -> String {
        if let Some(lang) = self.detect_with_detector(text).await {
            return lang;
        }

        if let Some(hint) = &self.hint {
            if let Some(lang) = hint.detect_hint(text).await {
                let normalized = normalize_language_tag(&lang);
                if !normalized.is_empty() && normalized != UNDETERMINED {
                    tracing::trace!("宿主语言提示: {}", normalized);
                    return normalized;
                }
            }
        }

        detect_by_script(text).to_string()
    }

    async fn detect_with_detector(&self, text: &str) -> Option<String> {
        if self.detector_blocked.get() {
            return None;
        }
        let detector = self.detector.as_ref()?;

        let sample: String = text.chars().take(self.char_limit).collect();
        match detector.detect(&sample).await {
            Ok(candidates) => candidates
                .into_iter()
                .filter(|c| c.confidence.is_finite())
                .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
                .map(|c| normalize_language_tag(&c.language))
                .filter(|lang| !lang.is_empty() && lang != UNDETERMINED),
            Err(CapabilityError::PermissionDenied(reason)) => {
                tracing::warn!("语言检测器权限被拒绝，本页面后续跳过: {}", reason);
                self.detector_blocked.set(true);
                None
            }
            Err(e) => {
                tracing::debug!("语言检测器失败，改用后备策略: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use async_trait::async_trait;

    use crate::translation::core::capability::DetectionCandidate;

    struct RecordingDetector {
        calls: RefCell<Vec<usize>>,
        result: Result<Vec<DetectionCandidate>, CapabilityError>,
    }

    #[async_trait(?Send)]
    impl LanguageDetector for RecordingDetector {
        async fn detect(&self, text: &str) -> Result<Vec<DetectionCandidate>, CapabilityError> {
            self.calls.borrow_mut().push(text.chars().count());
            self.result.clone()
        }
    }

    struct FixedHint(Option<&'static str>);

    #[async_trait(?Send)]
    impl LanguageHintProvider for FixedHint {
        async fn detect_hint(&self, _text: &str) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[test]
    fn test_script_priority_order() {
        assert_eq!(detect_by_script("안녕하세요"), "ko");
        // 假名优先于汉字
        assert_eq!(detect_by_script("日本語のテキスト"), "ja");
        assert_eq!(detect_by_script("你好世界"), TRADITIONAL_CHINESE);
        assert_eq!(detect_by_script("Привет мир"), "ru");
        assert_eq!(detect_by_script("مرحبا"), "ar");
        assert_eq!(detect_by_script("नमस्ते"), "hi");
        assert_eq!(detect_by_script("สวัสดี"), "th");
        assert_eq!(detect_by_script("Xin chào thế giới"), "vi");
        assert_eq!(detect_by_script("Hello world"), "en");
    }

    #[test]
    fn test_normalize_language_tag() {
        assert_eq!(normalize_language_tag("zh-TW"), "zh-Hant");
        assert_eq!(normalize_language_tag("zh_hant_hk"), "zh-Hant");
        assert_eq!(normalize_language_tag("zh-CN"), "zh");
        assert_eq!(normalize_language_tag("zh-Hans"), "zh");
        assert_eq!(normalize_language_tag("ZH"), "zh");
        assert_eq!(normalize_language_tag("ms"), "ms");
        assert_eq!(normalize_language_tag("en-us"), "en-US");
        assert_eq!(normalize_language_tag("sr-latn-rs"), "sr-Latn-RS");
        assert_eq!(normalize_language_tag("es-419"), "es-419");
        assert_eq!(normalize_language_tag(""), "");
    }

    #[tokio::test]
    async fn test_heuristic_tier_for_chinese() {
        let classifier = LanguageClassifier::heuristic_only();
        assert_eq!(classifier.detect("你好世界").await, TRADITIONAL_CHINESE);
    }

    #[tokio::test]
    async fn test_detector_wins_and_input_is_capped() {
        let detector = Rc::new(RecordingDetector {
            calls: RefCell::new(Vec::new()),
            result: Ok(vec![
                DetectionCandidate { language: "fr".to_string(), confidence: 0.2 },
                DetectionCandidate { language: "de-de".to_string(), confidence: 0.7 },
            ]),
        });
        let classifier = LanguageClassifier::new(Some(detector.clone()), None);

        let long_text = "a".repeat(5000);
        assert_eq!(classifier.detect(&long_text).await, "de-DE");
        assert_eq!(*detector.calls.borrow(), vec![4000]);
    }

    #[tokio::test]
    async fn test_permission_failure_is_remembered() {
        let detector = Rc::new(RecordingDetector {
            calls: RefCell::new(Vec::new()),
            result: Err(CapabilityError::PermissionDenied("policy".to_string())),
        });
        let classifier =
            LanguageClassifier::new(Some(detector.clone()), Some(Rc::new(FixedHint(Some("ja-jp")))));

        assert_eq!(classifier.detect("whatever").await, "ja-JP");
        assert!(classifier.is_detector_blocked());
        assert_eq!(classifier.detect("whatever").await, "ja-JP");
        assert_eq!(detector.calls.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_undetermined_hint_falls_through() {
        let classifier = LanguageClassifier::new(None, Some(Rc::new(FixedHint(Some("und")))));
        assert_eq!(classifier.detect("Привет").await, "ru");
    }
}
