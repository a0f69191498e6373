//! 占位文本
//!
//! 翻译失败时仍然把原文嵌在带标记的方括号里返回，调用方据前缀判断类别，
//! 不需要比对完整内容。

const DOWNLOADING_PREFIX: &str = "[翻譯模型下載中，請稍候...]";
const UNAVAILABLE_PREFIX: &str = "[翻譯功能暫不可用:";
const FAILED_PREFIX: &str = "[翻譯失敗:";
const ABSENT_PREFIX: &str = "[translated:";

/// 占位类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// 模型正在下载
    Downloading,
    /// 语言对不可用
    Unavailable,
    /// 超时、创建实例失败或翻译调用失败
    Failed,
    /// 环境中没有翻译能力
    CapabilityAbsent,
}

impl Placeholder {
    /// 渲染占位文本
    pub fn render(self, target_lang: &str, original: &str) -> String {
        match self {
            Placeholder::Downloading => format!("{} {}", DOWNLOADING_PREFIX, original),
            Placeholder::Unavailable => {
                format!("{}{}] {}", UNAVAILABLE_PREFIX, target_lang, original)
            }
            Placeholder::Failed => format!("{}{}] {}", FAILED_PREFIX, target_lang, original),
            Placeholder::CapabilityAbsent => {
                format!("{}{}] {}", ABSENT_PREFIX, target_lang, original)
            }
        }
    }

    /// 识别占位文本
    pub fn classify(text: &str) -> Option<Placeholder> {
        let text = text.trim_start();
        if text.starts_with(DOWNLOADING_PREFIX) {
            Some(Placeholder::Downloading)
        } else if text.starts_with(UNAVAILABLE_PREFIX) {
            Some(Placeholder::Unavailable)
        } else if text.starts_with(FAILED_PREFIX) {
            Some(Placeholder::Failed)
        } else if text.starts_with(ABSENT_PREFIX) {
            Some(Placeholder::CapabilityAbsent)
        } else {
            None
        }
    }
}

pub fn is_download_placeholder(text: &str) -> bool {
    Placeholder::classify(text) == Some(Placeholder::Downloading)
}

pub fn is_placeholder(text: &str) -> bool {
    Placeholder::classify(text).is_some()
}
