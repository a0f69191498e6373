//! 覆盖层节点状态
//!
//! 每个可翻译元素处在 `Untouched` / `BlockTranslated` / `InlineTranslated` 之一。
//! 状态从 DOM 标记读出、写回 DOM 标记，迁移统一经过 `OverlayState::transition` 校验。
//! 备份属性一旦写入就不再覆盖，直到还原。

use markup5ever_rcdom::Handle;

use super::markers::{
    INLINE_ORIGINAL_ATTR, INLINE_TRANSLATED_CLASS, ORIGINAL_ATTR, TRANSLATED_CLASS,
};
use crate::parsers::html::dom::{
    add_class, get_node_attr, has_class, is_attached, remove_class, set_node_attr,
};
use crate::parsers::html::WeakNodeMap;
use crate::translation::error::{TranslationError, TranslationResult};

/// 状态迁移事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayEvent {
    ApplyBlock,
    ApplyInline,
    Revert,
}

impl OverlayEvent {
    fn name(self) -> &'static str {
        match self {
            OverlayEvent::ApplyBlock => "ApplyBlock",
            OverlayEvent::ApplyInline => "ApplyInline",
            OverlayEvent::Revert => "Revert",
        }
    }
}

/// 节点的覆盖层状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayState {
    Untouched,
    BlockTranslated { backup: String },
    InlineTranslated { backup: String },
}

impl OverlayState {
    /// 从 DOM 标记读取
    pub fn read(element: &Handle) -> Self {
        if has_class(element, TRANSLATED_CLASS) {
            OverlayState::BlockTranslated {
                backup: get_node_attr(element, ORIGINAL_ATTR).unwrap_or_default(),
            }
        } else if has_class(element, INLINE_TRANSLATED_CLASS) {
            OverlayState::InlineTranslated {
                backup: get_node_attr(element, INLINE_ORIGINAL_ATTR).unwrap_or_default(),
            }
        } else {
            OverlayState::Untouched
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OverlayState::Untouched => "Untouched",
            OverlayState::BlockTranslated { .. } => "BlockTranslated",
            OverlayState::InlineTranslated { .. } => "InlineTranslated",
        }
    }

    pub fn is_translated(&self) -> bool {
        !matches!(self, OverlayState::Untouched)
    }

    pub fn backup(&self) -> Option<&str> {
        match self {
            OverlayState::Untouched => None,
            OverlayState::BlockTranslated { backup } | OverlayState::InlineTranslated { backup } => {
                Some(backup)
            }
        }
    }

    /// 计算迁移后的状态
    ///
    /// `snapshot` 只在首次翻译时成为备份；已翻译的节点重复应用时保留原备份
    pub fn transition(&self, event: OverlayEvent, snapshot: &str) -> TranslationResult<Self> {
        match (self, event) {
            (_, OverlayEvent::Revert) => Ok(OverlayState::Untouched),
            (OverlayState::Untouched, OverlayEvent::ApplyBlock) => Ok(OverlayState::BlockTranslated {
                backup: snapshot.to_string(),
            }),
            (OverlayState::Untouched, OverlayEvent::ApplyInline) => {
                Ok(OverlayState::InlineTranslated {
                    backup: snapshot.to_string(),
                })
            }
            (OverlayState::BlockTranslated { .. }, OverlayEvent::ApplyBlock)
            | (OverlayState::InlineTranslated { .. }, OverlayEvent::ApplyInline) => Ok(self.clone()),
            (from, event) => Err(TranslationError::InvalidTransition {
                from: from.name().to_string(),
                event: event.name().to_string(),
            }),
        }
    }

    /// 把状态写回 DOM 标记
    pub fn write(&self, element: &Handle) {
        match self {
            OverlayState::Untouched => {
                remove_class(element, TRANSLATED_CLASS);
                remove_class(element, INLINE_TRANSLATED_CLASS);
                set_node_attr(element, ORIGINAL_ATTR, None);
                set_node_attr(element, INLINE_ORIGINAL_ATTR, None);
            }
            OverlayState::BlockTranslated { backup } => {
                if get_node_attr(element, ORIGINAL_ATTR).is_none() {
                    set_node_attr(element, ORIGINAL_ATTR, Some(backup.clone()));
                }
                add_class(element, TRANSLATED_CLASS);
            }
            OverlayState::InlineTranslated { backup } => {
                if get_node_attr(element, INLINE_ORIGINAL_ATTR).is_none() {
                    set_node_attr(element, INLINE_ORIGINAL_ATTR, Some(backup.clone()));
                }
                add_class(element, INLINE_TRANSLATED_CLASS);
            }
        }
    }
}

/// 行内目标的精确快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineBackup {
    /// 首次翻译前每个直接文本节点的内容，按文档顺序
    pub segments: Vec<String>,
    /// 原本没有直接文本节点，译文节点是插入的
    pub inserted_text: bool,
}

/// 节点 → 行内快照
///
/// 属性中的备份仍是权威来源；账本只用于逐个文本节点地精确还原
#[derive(Default)]
pub struct BackupLedger {
    inline: WeakNodeMap<InlineBackup>,
}

impl BackupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录首次翻译前的快照，由调用方保证只在 `Untouched` 时调用
    pub fn record_inline(&mut self, element: &Handle, backup: InlineBackup) {
        self.inline.insert(element, backup);
    }

    pub fn inline(&self, element: &Handle) -> Option<&InlineBackup> {
        self.inline.get(element)
    }

    pub fn take_inline(&mut self, element: &Handle) -> Option<InlineBackup> {
        self.inline.remove(element)
    }

    /// 丢弃已脱离文档的元素的快照，返回丢弃数
    pub fn prune_detached(&mut self) -> usize {
        let before = self.inline.len();
        self.inline.retain(|element, _| is_attached(element));
        before - self.inline.len()
    }

    pub fn len(&self) -> usize {
        self.inline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inline.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{create_element, find_elements, text_content};
    use crate::parsers::html::LiveDocument;

    #[test]
    fn test_transitions() {
        let untouched = OverlayState::Untouched;
        let block = untouched
            .transition(OverlayEvent::ApplyBlock, "original")
            .expect("untouched -> block");
        assert_eq!(block, OverlayState::BlockTranslated { backup: "original".to_string() });

        // 重复应用不覆盖备份
        let again = block.transition(OverlayEvent::ApplyBlock, "changed").expect("block -> block");
        assert_eq!(again.backup(), Some("original"));

        assert_eq!(
            block.transition(OverlayEvent::Revert, "").expect("revert"),
            OverlayState::Untouched
        );
    }

    #[test]
    fn test_mode_switch_is_rejected() {
        let inline = OverlayState::InlineTranslated { backup: "Home".to_string() };
        let err = inline
            .transition(OverlayEvent::ApplyBlock, "Home")
            .expect_err("inline -> block");
        assert!(matches!(
            err,
            TranslationError::InvalidTransition { ref from, ref event }
                if from == "InlineTranslated" && event == "ApplyBlock"
        ));
    }

    #[test]
    fn test_write_and_read_markers() {
        let element = create_element("p", &[("class", "lead")]);
        let state = OverlayState::BlockTranslated { backup: "Some text".to_string() };
        state.write(&element);
        assert_eq!(OverlayState::read(&element), state);

        // 备份只写一次
        OverlayState::BlockTranslated { backup: "Other".to_string() }.write(&element);
        assert_eq!(get_node_attr(&element, ORIGINAL_ATTR).as_deref(), Some("Some text"));

        OverlayState::Untouched.write(&element);
        assert_eq!(OverlayState::read(&element), OverlayState::Untouched);
        assert_eq!(get_node_attr(&element, "class").as_deref(), Some("lead"));
    }

    #[test]
    fn test_ledger_take_removes_entry() {
        let element = create_element("a", &[]);
        let mut ledger = BackupLedger::new();
        ledger.record_inline(
            &element,
            InlineBackup { segments: vec![" Home ".to_string()], inserted_text: false },
        );
        assert_eq!(
            ledger.inline(&element).map(|b| b.segments.clone()),
            Some(vec![" Home ".to_string()])
        );
        assert_eq!(ledger.len(), 1);
        assert!(ledger.take_inline(&element).is_some());
        assert!(ledger.take_inline(&element).is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_ledger_prunes_detached_elements() {
        let doc = LiveDocument::parse("<a>Home</a><a>Docs</a>");
        let links = find_elements(doc.document(), &["a"]);
        let mut ledger = BackupLedger::new();
        for link in &links {
            ledger.record_inline(
                link,
                InlineBackup {
                    segments: vec![text_content(link)],
                    inserted_text: false,
                },
            );
        }

        // 页面脚本移除节点后仍持有引用
        assert!(doc.remove_node(&links[1]));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.prune_detached(), 1);
        assert!(ledger.inline(&links[0]).is_some());
        assert!(ledger.inline(&links[1]).is_none());
    }
}
