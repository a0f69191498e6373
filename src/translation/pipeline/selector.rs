//! 片段选择
//!
//! 遍历候选块元素，按结构启发式把它们分成块级片段或导航中的行内片段。

use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::{
    child_elements, closest, direct_text_nodes, find_elements, get_node_attr, get_node_name,
    text_of,
};
use crate::parsers::html::{LiveDocument, WHITESPACES};
use crate::translation::config::{constants, OverlayConfig};
use crate::translation::overlay::markers::{
    injected_kind, is_block_translated, is_inline_translated, is_legacy_container, is_wrapper,
    within_injected,
};
use crate::translation::overlay::sanitize_element;

/// 片段模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentMode {
    /// 在元素末尾追加译文包装节点
    Block,
    /// 原地替换直接文本
    Inline,
}

/// 一个可翻译片段
#[derive(Debug, Clone)]
pub struct Fragment {
    pub element: Handle,
    pub mode: FragmentMode,
    /// 选择时的文本快照
    pub original_text: String,
}

/// 片段选择器
#[derive(Debug, Clone)]
pub struct FragmentSelector {
    min_block_chars: usize,
}

impl Default for FragmentSelector {
    fn default() -> Self {
        Self {
            min_block_chars: constants::MIN_BLOCK_CHARS,
        }
    }
}

impl FragmentSelector {
    pub fn new(config: &OverlayConfig) -> Self {
        Self {
            min_block_chars: config.min_block_chars,
        }
    }

    /// 选出 `root` 之下所有待翻译片段，顺带清理重复注入
    pub fn select(&self, document: &LiveDocument, root: &Handle) -> Vec<Fragment> {
        let mut fragments = Vec::new();

        for element in find_elements(root, constants::BLOCK_SELECTORS) {
            if within_injected(&element) || closest(&element, &is_legacy_container).is_some() {
                continue;
            }

            sanitize_element(document, &element);

            if is_block_translated(&element) || has_wrapper_child(&element) {
                continue;
            }

            let navigation_item =
                get_node_name(&element) == Some("li") && in_navigation_context(&element);

            if navigation_item {
                if contains_any(&element, constants::NESTED_BLOCK_TAGS) {
                    tracing::trace!("跳过含块级子元素的导航项");
                    continue;
                }
                fragments.extend(inline_targets(&element));
                continue;
            }

            let text = source_text(&element);
            let trimmed = text.trim();
            if trimmed.chars().count() > self.min_block_chars {
                fragments.push(Fragment {
                    element: element.clone(),
                    mode: FragmentMode::Block,
                    original_text: trimmed.to_string(),
                });
            }
        }

        tracing::debug!("选出 {} 个片段", fragments.len());
        fragments
    }
}

fn has_wrapper_child(element: &Handle) -> bool {
    child_elements(element).iter().any(is_wrapper)
}

/// 元素自身或祖先处在导航区域内
pub fn in_navigation_context(element: &Handle) -> bool {
    closest(element, &|node| {
        if get_node_name(node) == Some("nav") {
            return true;
        }
        if get_node_attr(node, "role").is_some_and(|role| {
            constants::NAV_ROLES.contains(&role.trim().to_ascii_lowercase().as_str())
        }) {
            return true;
        }
        get_node_attr(node, "class").is_some_and(|classes| {
            classes.split(WHITESPACES).any(|token| {
                let token = token.to_ascii_lowercase();
                constants::NAV_CLASS_HINTS.iter().any(|hint| token.contains(hint))
            })
        })
    })
    .is_some()
}

/// 后代中是否有指定标签（不含自身）
fn contains_any(element: &Handle, tags: &[&str]) -> bool {
    child_elements(element)
        .iter()
        .any(|child| !find_elements(child, tags).is_empty())
}

/// 元素文本，跳过已注入的译文与提示节点
fn source_text(element: &Handle) -> String {
    let mut buf = String::new();
    collect_source_text(element, &mut buf);
    buf
}

fn collect_source_text(node: &Handle, buf: &mut String) {
    for child in node.children.borrow().iter() {
        if let Some(text) = text_of(child) {
            buf.push_str(&text);
        } else if injected_kind(child).is_none() {
            collect_source_text(child, buf);
        }
    }
}

/// 元素直接文本（不含嵌套元素内的文本）
pub fn direct_text(element: &Handle) -> String {
    direct_text_nodes(element)
        .iter()
        .filter_map(text_of)
        .collect()
}

/// 导航项中可原地翻译的行内子元素
fn inline_targets(item: &Handle) -> Vec<Fragment> {
    child_elements(item)
        .into_iter()
        .filter(|child| match get_node_name(child) {
            Some("span") => child_elements(child).is_empty(),
            Some(tag) => constants::INLINE_TARGET_TAGS.contains(&tag),
            None => false,
        })
        .filter(|child| !is_inline_translated(child))
        .filter_map(|child| {
            let text = direct_text(&child);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Fragment {
                    original_text: trimmed.to_string(),
                    element: child,
                    mode: FragmentMode::Inline,
                })
            }
        })
        .collect()
}
