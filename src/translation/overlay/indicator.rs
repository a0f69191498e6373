//! 页面状态提示
//!
//! 挂在 body 末尾的一个注入节点，显示翻译中 / 下载中 / 出错等状态。

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use markup5ever_rcdom::Handle;
use tokio::task::JoinHandle;

use super::markers::{InjectedKind, INDICATOR_TAG, INJECTED_ATTR};
use crate::parsers::html::dom::{is_attached, text_content};
use crate::parsers::html::LiveDocument;

pub const INDICATOR_CLASS: &str = "translationgummy-indicator";

/// 提示内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorMessage {
    Translating,
    Downloading { percent: Option<u8> },
    DownloadTimeout,
    Unavailable,
    Error(String),
}

impl IndicatorMessage {
    pub fn text(&self) -> String {
        match self {
            IndicatorMessage::Translating => "翻譯中...".to_string(),
            IndicatorMessage::Downloading { percent: None } => {
                "翻譯模型下載中，請稍候...".to_string()
            }
            IndicatorMessage::Downloading { percent: Some(p) } => {
                format!("翻譯模型下載中 {}%，請稍候...", p)
            }
            IndicatorMessage::DownloadTimeout => "翻譯模型下載逾時，請稍後再試".to_string(),
            IndicatorMessage::Unavailable => "此語言組合暫不支援翻譯".to_string(),
            IndicatorMessage::Error(reason) => format!("翻譯失敗: {}", reason),
        }
    }
}

/// 状态提示
pub struct StatusIndicator {
    document: Rc<LiveDocument>,
    node: RefCell<Option<Handle>>,
    message: RefCell<Option<IndicatorMessage>>,
    dismiss: RefCell<Option<JoinHandle<()>>>,
    banner_duration: Duration,
}

impl StatusIndicator {
    pub fn new(document: Rc<LiveDocument>, banner_duration: Duration) -> Self {
        Self {
            document,
            node: RefCell::new(None),
            message: RefCell::new(None),
            dismiss: RefCell::new(None),
            banner_duration,
        }
    }

    /// 显示或更新提示
    pub fn show(&self, message: IndicatorMessage) {
        self.cancel_dismiss();

        let node = match self.attached_node() {
            Some(node) => node,
            None => {
                let Some(body) = self.document.body() else {
                    tracing::debug!("页面没有 body，无法显示提示");
                    return;
                };
                let node = indicator_node();
                self.document.append_child(&body, &node);
                *self.node.borrow_mut() = Some(node.clone());
                node
            }
        };

        self.document.replace_children_with_text(&node, &message.text());
        *self.message.borrow_mut() = Some(message);
    }

    /// 显示错误，`banner_duration` 后自动消失
    pub fn flash_error(&self, reason: &str) {
        self.flash(IndicatorMessage::Error(reason.to_string()));
    }

    /// 显示提示，`banner_duration` 后自动消失
    pub fn flash(&self, message: IndicatorMessage) {
        self.show(message);
        let Some(node) = self.attached_node() else {
            return;
        };

        let document = self.document.clone();
        let duration = self.banner_duration;
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(duration).await;
            document.remove_node(&node);
        });
        *self.dismiss.borrow_mut() = Some(handle);
    }

    pub fn hide(&self) {
        self.cancel_dismiss();
        if let Some(node) = self.node.borrow_mut().take() {
            self.document.remove_node(&node);
        }
        *self.message.borrow_mut() = None;
    }

    pub fn is_visible(&self) -> bool {
        self.attached_node().is_some()
    }

    /// 当前显示的提示；节点已被移除时为 None
    pub fn message(&self) -> Option<IndicatorMessage> {
        if self.is_visible() {
            self.message.borrow().clone()
        } else {
            None
        }
    }

    pub fn text(&self) -> Option<String> {
        self.attached_node().map(|node| text_content(&node))
    }

    fn attached_node(&self) -> Option<Handle> {
        self.node
            .borrow()
            .as_ref()
            .filter(|node| is_attached(node))
            .cloned()
    }

    fn cancel_dismiss(&self) {
        if let Some(handle) = self.dismiss.borrow_mut().take() {
            handle.abort();
        }
    }
}

impl Drop for StatusIndicator {
    fn drop(&mut self) {
        self.cancel_dismiss();
    }
}

fn indicator_node() -> Handle {
    crate::parsers::html::dom::create_element(
        INDICATOR_TAG,
        &[
            (INJECTED_ATTR, InjectedKind::Indicator.as_str()),
            ("class", INDICATOR_CLASS),
            ("role", "status"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::overlay::markers::is_self_generated;

    #[test]
    fn test_show_update_hide() {
        let doc = LiveDocument::parse("<p>page</p>");
        let indicator = StatusIndicator::new(doc.clone(), Duration::from_secs(3));
        doc.observe();

        indicator.show(IndicatorMessage::Translating);
        indicator.show(IndicatorMessage::Downloading { percent: Some(40) });
        assert_eq!(indicator.text().as_deref(), Some("翻譯模型下載中 40%，請稍候..."));

        // 提示节点的写入都算自身变更
        assert!(doc.take_records().iter().all(is_self_generated));

        indicator.hide();
        assert!(!indicator.is_visible());
        assert!(indicator.message().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_banner_dismisses_itself() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let doc = LiveDocument::parse("<p>page</p>");
                let indicator = StatusIndicator::new(doc.clone(), Duration::from_secs(3));

                indicator.flash_error("boom");
                assert_eq!(indicator.message(), Some(IndicatorMessage::Error("boom".to_string())));

                tokio::time::sleep(Duration::from_secs(2)).await;
                assert!(indicator.is_visible());
                tokio::time::sleep(Duration::from_secs(2)).await;
                assert!(!indicator.is_visible());
            })
            .await;
    }
}
