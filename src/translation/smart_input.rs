//! 输入框即时翻译
//!
//! 焦点落在 `input` / `textarea` / 可编辑元素上时，Shift+Enter 把输入内容
//! 翻译成 `targetWriteLang` 并原地替换。

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, Node};

use crate::parsers::html::dom::{get_node_attr, get_node_name, is_attached, set_node_attr, text_content};
use crate::parsers::html::{LiveDocument, WeakNodeMap};
use crate::translation::core::gateway::TranslationGateway;
use crate::translation::error::TranslationResult;
use crate::translation::orchestrator::MutationGate;
use crate::translation::storage::settings::{target_write_lang, SettingsStore};

/// 键盘事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    pub shift: bool,
}

impl KeyPress {
    pub fn new(key: impl Into<String>, shift: bool) -> Self {
        Self {
            key: key.into(),
            shift,
        }
    }

    pub fn is_translate_shortcut(&self) -> bool {
        self.shift && self.key == "Enter"
    }
}

/// 上一次翻译的原文与输出
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceEntry {
    source: String,
    output: String,
}

/// 输入翻译
pub struct SmartInput {
    document: Rc<LiveDocument>,
    gateway: Rc<TranslationGateway>,
    settings: Rc<dyn SettingsStore>,
    gate: Rc<MutationGate>,
    default_lang: String,
    active: RefCell<Option<Weak<Node>>>,
    sources: RefCell<WeakNodeMap<SourceEntry>>,
}

/// 可编辑元素：`input`、`textarea` 或 `contenteditable`
pub fn is_editable(element: &Handle) -> bool {
    match get_node_name(element) {
        Some("input") | Some("textarea") => true,
        Some(_) => is_content_editable(element),
        None => false,
    }
}

fn is_content_editable(element: &Handle) -> bool {
    get_node_attr(element, "contenteditable")
        .is_some_and(|value| !value.eq_ignore_ascii_case("false"))
}

impl SmartInput {
    pub fn new(
        document: Rc<LiveDocument>,
        gateway: Rc<TranslationGateway>,
        settings: Rc<dyn SettingsStore>,
        gate: Rc<MutationGate>,
        default_lang: &str,
    ) -> Self {
        Self {
            document,
            gateway,
            settings,
            gate,
            default_lang: default_lang.to_string(),
            active: RefCell::new(None),
            sources: RefCell::new(WeakNodeMap::new()),
        }
    }

    /// 记录获得焦点的可编辑元素；其他元素不改变当前记录
    pub fn focus_in(&self, element: &Handle) {
        if is_editable(element) {
            *self.active.borrow_mut() = Some(Rc::downgrade(element));
        }
    }

    pub fn active_element(&self) -> Option<Handle> {
        self.active
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(is_attached)
    }

    /// 处理按键；返回 true 表示拦截了默认行为
    pub async fn key_down(&self, key: &KeyPress) -> TranslationResult<bool> {
        if !key.is_translate_shortcut() {
            return Ok(false);
        }
        let Some(element) = self.active_element() else {
            return Ok(false);
        };

        self.sources.borrow_mut().retain(|node, _| is_attached(node));

        let current = read_value(&element);
        if current.trim().is_empty() {
            return Ok(true);
        }

        // 再次按下时从原文重新翻译，而不是翻译译文
        let source = match self.sources.borrow().get(&element) {
            Some(entry) if entry.output == current => entry.source.clone(),
            _ => current,
        };

        let target = target_write_lang(self.settings.as_ref(), &self.default_lang).await;
        let Some(output) = self.gateway.translate(&source, &target).await else {
            tracing::debug!("输入内容已是目标语言 {}，保持不变", target);
            return Ok(true);
        };

        self.write_value(&element, &output)?;
        self.sources
            .borrow_mut()
            .insert(&element, SourceEntry { source, output });
        tracing::info!("输入框内容已翻译 → {}", target);
        Ok(true)
    }

    /// 缓存的原文条目数
    pub fn cached_sources(&self) -> usize {
        self.sources.borrow().len()
    }

    /// 写入期间关闭闸门；写入产生的记录直接丢弃，之前积压的记录放回
    fn write_value(&self, element: &Handle, value: &str) -> TranslationResult<()> {
        let pending = self.document.take_records();
        {
            let _suppressed = self.gate.suppress();
            if get_node_name(element) == Some("input") {
                set_node_attr(element, "value", Some(value.to_string()));
            } else {
                self.document.replace_children_with_text(element, value);
            }
            let own = self.document.take_records();
            tracing::trace!("丢弃输入框写入记录 {} 条", own.len());
        }
        self.document.requeue_records(pending);
        Ok(())
    }
}

fn read_value(element: &Handle) -> String {
    if get_node_name(element) == Some("input") {
        get_node_attr(element, "value").unwrap_or_default()
    } else {
        text_content(element)
    }
}
