//! DOM 标记命名空间
//!
//! 覆盖层唯一的持久化层就是元素上的类名与 data 属性，清理与还原都靠它们定位节点。

use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::{closest, get_node_attr, has_class};
use crate::parsers::html::{MutationKind, MutationRecord};

/// 块级片段已翻译
pub const TRANSLATED_CLASS: &str = "translationgummy-translated";
/// 行内片段已翻译
pub const INLINE_TRANSLATED_CLASS: &str = "translationgummy-inline-translated";
/// 块级原文备份
pub const ORIGINAL_ATTR: &str = "data-translationgummy-original";
/// 行内原文备份
pub const INLINE_ORIGINAL_ATTR: &str = "data-translationgummy-inline-original";
/// 注入节点标记，取值见 `InjectedKind`
pub const INJECTED_ATTR: &str = "data-translationgummy-injected";
/// 译文包装节点的类名
pub const WRAPPER_CLASS: &str = "translationgummy-translation";

/// 旧版并排布局容器（仅用于还原）
pub const LEGACY_CONTAINER_CLASS: &str = "translationgummy-bilingual-container";
pub const LEGACY_ORIGINAL_CLASS: &str = "translationgummy-original";

pub const WRAPPER_TAG: &str = "span";
pub const BREAK_TAG: &str = "br";
pub const INDICATOR_TAG: &str = "div";

/// 注入节点类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedKind {
    Wrapper,
    Break,
    Indicator,
}

impl InjectedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InjectedKind::Wrapper => "wrapper",
            InjectedKind::Break => "break",
            InjectedKind::Indicator => "indicator",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "wrapper" => Some(InjectedKind::Wrapper),
            "break" => Some(InjectedKind::Break),
            "indicator" => Some(InjectedKind::Indicator),
            _ => None,
        }
    }
}

/// 节点的注入类别，非注入节点返回 None
pub fn injected_kind(node: &Handle) -> Option<InjectedKind> {
    get_node_attr(node, INJECTED_ATTR).and_then(|value| InjectedKind::parse(&value))
}

pub fn is_wrapper(node: &Handle) -> bool {
    injected_kind(node) == Some(InjectedKind::Wrapper)
}

pub fn is_injected_break(node: &Handle) -> bool {
    injected_kind(node) == Some(InjectedKind::Break)
}

pub fn is_indicator(node: &Handle) -> bool {
    injected_kind(node) == Some(InjectedKind::Indicator)
}

/// 节点自身或祖先是注入节点
pub fn within_injected(node: &Handle) -> bool {
    closest(node, &|candidate| get_node_attr(candidate, INJECTED_ATTR).is_some()).is_some()
}

pub fn is_block_translated(node: &Handle) -> bool {
    has_class(node, TRANSLATED_CLASS)
}

pub fn is_inline_translated(node: &Handle) -> bool {
    has_class(node, INLINE_TRANSLATED_CLASS)
}

pub fn is_legacy_container(node: &Handle) -> bool {
    has_class(node, LEGACY_CONTAINER_CLASS)
}

/// 变更记录是否完全由覆盖层自己的注入产生
///
/// 新增节点或改动的文本全部落在注入节点之内才算；只删除节点时看被改动的父节点
pub fn is_self_generated(record: &MutationRecord) -> bool {
    match record.kind {
        MutationKind::CharacterData => within_injected(&record.target),
        MutationKind::ChildList if record.added.is_empty() => within_injected(&record.target),
        MutationKind::ChildList => record.added.iter().all(within_injected),
    }
}

/// 变更记录是否带来了页面自己的新内容（需要自动翻译）
pub fn introduces_content(record: &MutationRecord) -> bool {
    if is_self_generated(record) {
        return false;
    }
    match record.kind {
        MutationKind::CharacterData => true,
        MutationKind::ChildList => !record.added.is_empty(),
    }
}
