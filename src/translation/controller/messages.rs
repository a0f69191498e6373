//! 与扩展外壳交换的消息

use serde::{Deserialize, Serialize};

use crate::translation::error::TranslationError;
use crate::translation::overlay::PageTranslationStatus;

/// 外壳发来的请求，按 `action` 字段区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ShellMessage {
    TranslatePage,
    RevertPage,
    UpdateExistingTranslations,
    GetPageTranslationStatus,
}

impl ShellMessage {
    pub fn from_json(json: &str) -> Result<Self, TranslationError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// 回复
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PageTranslationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ShellResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn with_status(status: PageTranslationStatus) -> Self {
        Self {
            success: true,
            status: Some(status),
            error: None,
        }
    }

    pub fn failed(error: &TranslationError) -> Self {
        Self {
            success: false,
            status: None,
            error: Some(error.to_string()),
        }
    }
}

impl<T> From<Result<T, TranslationError>> for ShellResponse {
    fn from(result: Result<T, TranslationError>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::failed(&e),
        }
    }
}

/// 页面导航事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationEvent {
    #[serde(rename = "DOMContentLoaded")]
    DomContentLoaded,
    PopState,
    PushState,
    ReplaceState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_tagged_by_action() {
        assert_eq!(
            ShellMessage::from_json(r#"{"action":"translatePage"}"#).unwrap(),
            ShellMessage::TranslatePage
        );
        assert_eq!(
            ShellMessage::from_json(r#"{"action":"getPageTranslationStatus"}"#).unwrap(),
            ShellMessage::GetPageTranslationStatus
        );
        assert!(ShellMessage::from_json(r#"{"action":"explode"}"#).is_err());
    }

    #[test]
    fn test_response_json_shape() {
        let status = PageTranslationStatus {
            is_translated: true,
            translated_count: 2,
            wrapper_count: 1,
        };
        let json = serde_json::to_string(&ShellResponse::with_status(status)).unwrap();
        assert_eq!(
            json,
            r#"{"success":true,"status":{"isTranslated":true,"translatedCount":2,"wrapperCount":1}}"#
        );

        let failed = ShellResponse::from(Err::<(), _>(TranslationError::QueueClosed));
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("任务队列已关闭"));
    }
}
