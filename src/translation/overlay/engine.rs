//! 覆盖层引擎
//!
//! 把译文写入片段、从备份还原片段。原始节点从不销毁：
//! 块级片段在末尾追加包装节点，行内片段只改直接文本节点。

use std::cell::RefCell;
use std::rc::Rc;

use markup5ever_rcdom::Handle;
use serde::{Deserialize, Serialize};

use super::markers::{
    injected_kind, is_block_translated, is_indicator, is_inline_translated, is_injected_break,
    is_legacy_container, is_wrapper, InjectedKind, BREAK_TAG, INJECTED_ATTR,
    LEGACY_ORIGINAL_CLASS, WRAPPER_CLASS, WRAPPER_TAG,
};
use super::state::{BackupLedger, InlineBackup, OverlayEvent, OverlayState};
use crate::parsers::html::dom::{
    child_elements, create_element, create_text, direct_text_nodes, get_node_attr, get_node_name,
    has_class, previous_sibling, remove_class, text_content, text_of, walk_elements,
};
use crate::parsers::html::{is_block_display, LiveDocument};
use crate::translation::error::TranslationResult;
use crate::translation::pipeline::selector::{direct_text, Fragment, FragmentMode};

/// 页面翻译状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTranslationStatus {
    pub is_translated: bool,
    pub translated_count: usize,
    pub wrapper_count: usize,
}

/// 一次还原的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevertReport {
    pub blocks: usize,
    pub inlines: usize,
    pub legacy_containers: usize,
    pub stray_nodes: usize,
    pub indicators: usize,
}

impl RevertReport {
    pub fn total(&self) -> usize {
        self.blocks + self.inlines + self.legacy_containers + self.stray_nodes + self.indicators
    }
}

/// 把元素下重复的包装节点 / 换行节点收敛为各至多一个，返回移除数量
pub fn sanitize_element(document: &LiveDocument, element: &Handle) -> usize {
    let children = child_elements(element);
    let wrappers: Vec<&Handle> = children.iter().filter(|c| is_wrapper(c)).collect();
    let breaks: Vec<&Handle> = children.iter().filter(|c| is_injected_break(c)).collect();

    let mut removed = 0;
    for extra in wrappers.iter().skip(1) {
        if document.remove_node(extra) {
            removed += 1;
        }
    }

    // 只保留紧邻包装节点之前的那一个换行
    let kept_break = wrappers
        .first()
        .and_then(|wrapper| previous_sibling(wrapper))
        .filter(is_injected_break);
    for br in breaks {
        if kept_break.as_ref().is_some_and(|kept| Rc::ptr_eq(kept, br)) {
            continue;
        }
        if document.remove_node(br) {
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::debug!("清理重复注入节点 {} 个", removed);
    }
    removed
}

/// 页面翻译状态（纯读取）
pub fn page_status(root: &Handle) -> PageTranslationStatus {
    let mut translated_count = 0;
    let mut wrapper_count = 0;
    walk_elements(root, &mut |node| {
        if is_block_translated(node) || is_inline_translated(node) {
            translated_count += 1;
        }
        if is_wrapper(node) {
            wrapper_count += 1;
        }
    });
    PageTranslationStatus {
        is_translated: translated_count > 0 || wrapper_count > 0,
        translated_count,
        wrapper_count,
    }
}

/// 覆盖层引擎
pub struct OverlayEngine {
    document: Rc<LiveDocument>,
    ledger: RefCell<BackupLedger>,
}

impl OverlayEngine {
    pub fn new(document: Rc<LiveDocument>) -> Self {
        Self {
            document,
            ledger: RefCell::new(BackupLedger::new()),
        }
    }

    pub fn document(&self) -> &Rc<LiveDocument> {
        &self.document
    }

    /// 按片段模式写入译文
    pub fn apply(&self, fragment: &Fragment, text: &str) -> TranslationResult<()> {
        match fragment.mode {
            FragmentMode::Block => self.apply_block(fragment, text),
            FragmentMode::Inline => self.apply_inline(fragment, text),
        }
    }

    /// 块级片段：末尾追加包装节点，已有包装节点时原地更新
    pub fn apply_block(&self, fragment: &Fragment, text: &str) -> TranslationResult<()> {
        let element = &fragment.element;
        sanitize_element(&self.document, element);

        let next = OverlayState::read(element)
            .transition(OverlayEvent::ApplyBlock, &fragment.original_text)?;

        if let Some(wrapper) = child_elements(element).into_iter().find(is_wrapper) {
            self.document.replace_children_with_text(&wrapper, text);
            next.write(element);
            return Ok(());
        }

        next.write(element);

        let tag = get_node_name(element).unwrap_or_default();
        if is_block_display(tag, get_node_attr(element, "style").as_deref()) {
            let br = create_element(BREAK_TAG, &[(INJECTED_ATTR, InjectedKind::Break.as_str())]);
            self.document.append_child(element, &br);
        }

        let wrapper = create_element(
            WRAPPER_TAG,
            &[
                (INJECTED_ATTR, InjectedKind::Wrapper.as_str()),
                ("class", WRAPPER_CLASS),
            ],
        );
        self.document.append_child(element, &wrapper);
        self.document.append_child(&wrapper, &create_text(text));
        Ok(())
    }

    /// 行内片段：只替换直接文本，保留图标等子元素
    pub fn apply_inline(&self, fragment: &Fragment, text: &str) -> TranslationResult<()> {
        let element = &fragment.element;
        let current = OverlayState::read(element);

        let direct = direct_text(element);
        let snapshot = if direct.trim().is_empty() {
            text_content(element)
        } else {
            direct
        };
        let next = current.transition(OverlayEvent::ApplyInline, &snapshot)?;

        if current == OverlayState::Untouched {
            let nodes = direct_text_nodes(element);
            self.ledger.borrow_mut().record_inline(
                element,
                InlineBackup {
                    segments: nodes.iter().filter_map(text_of).collect(),
                    inserted_text: nodes.is_empty(),
                },
            );
        }

        replace_direct_text(&self.document, element, text)?;
        next.write(element);
        Ok(())
    }

    /// 重新翻译已翻译的块级元素（目标语言变化时）
    pub fn update_block(&self, element: &Handle, text: &str) -> TranslationResult<()> {
        let backup = OverlayState::read(element)
            .backup()
            .map(str::to_string)
            .unwrap_or_else(|| text_content(element).trim().to_string());
        self.apply_block(
            &Fragment {
                element: element.clone(),
                mode: FragmentMode::Block,
                original_text: backup,
            },
            text,
        )
    }

    /// 重新翻译已翻译的行内元素
    pub fn update_inline(&self, element: &Handle, text: &str) -> TranslationResult<()> {
        match OverlayState::read(element) {
            OverlayState::Untouched => self.apply_inline(
                &Fragment {
                    element: element.clone(),
                    mode: FragmentMode::Inline,
                    original_text: direct_text(element).trim().to_string(),
                },
                text,
            ),
            state => {
                state.transition(OverlayEvent::ApplyInline, "")?;
                replace_direct_text(&self.document, element, text)
            }
        }
    }

    /// 所有已翻译元素及其状态，按文档顺序
    pub fn translated_elements(&self, root: &Handle) -> Vec<(Handle, OverlayState)> {
        let mut found = Vec::new();
        walk_elements(root, &mut |node| {
            let state = OverlayState::read(node);
            if state.is_translated() {
                found.push((node.clone(), state));
            }
        });
        found
    }

    pub fn page_status(&self, root: &Handle) -> PageTranslationStatus {
        page_status(root)
    }

    /// 还原 `root` 之下的全部覆盖层
    /// 丢弃已被页面移除的行内目标的快照
    pub fn prune_backups(&self) -> usize {
        let pruned = self.ledger.borrow_mut().prune_detached();
        if pruned > 0 {
            tracing::debug!("丢弃 {} 个已脱离文档的行内快照", pruned);
        }
        pruned
    }

    pub fn revert_all(&self, root: &Handle) -> RevertReport {
        let mut report = RevertReport::default();

        for container in collect(root, &is_legacy_container) {
            if self.revert_legacy_container(&container) {
                report.legacy_containers += 1;
            }
        }

        for (element, state) in self.translated_elements(root) {
            let result = match &state {
                OverlayState::BlockTranslated { .. } => {
                    self.revert_block(&element);
                    report.blocks += 1;
                    Ok(())
                }
                OverlayState::InlineTranslated { backup } => {
                    report.inlines += 1;
                    self.revert_inline(&element, backup)
                }
                OverlayState::Untouched => Ok(()),
            };
            if let Err(e) = result {
                tracing::warn!("还原元素失败，继续处理其余元素: {}", e);
            }
            match state.transition(OverlayEvent::Revert, "") {
                Ok(next) => next.write(&element),
                Err(e) => tracing::warn!("{}", e),
            }
        }
        self.prune_backups();

        // 失去标记的元素里残留的注入节点
        for node in collect(root, &|n| {
            matches!(injected_kind(n), Some(InjectedKind::Wrapper | InjectedKind::Break))
        }) {
            if self.document.remove_node(&node) {
                report.stray_nodes += 1;
            }
        }

        for node in collect(root, &is_indicator) {
            if self.document.remove_node(&node) {
                report.indicators += 1;
            }
        }

        if report.total() > 0 {
            tracing::info!(
                "已还原: 块级 {}，行内 {}，旧版容器 {}，残留节点 {}",
                report.blocks,
                report.inlines,
                report.legacy_containers,
                report.stray_nodes
            );
        }
        report
    }

    fn revert_block(&self, element: &Handle) {
        for child in child_elements(element) {
            if is_wrapper(&child) {
                if let Some(prev) = previous_sibling(&child).filter(is_injected_break) {
                    self.document.remove_node(&prev);
                }
                self.document.remove_node(&child);
            } else if is_injected_break(&child) {
                self.document.remove_node(&child);
            }
        }
    }

    fn revert_inline(&self, element: &Handle, backup: &str) -> TranslationResult<()> {
        let nodes = direct_text_nodes(element);
        let snapshot = self.ledger.borrow_mut().take_inline(element);

        match snapshot {
            Some(snapshot) if snapshot.inserted_text => {
                for node in nodes {
                    self.document.remove_node(&node);
                }
                Ok(())
            }
            Some(snapshot) if snapshot.segments.len() == nodes.len() => {
                for (node, segment) in nodes.iter().zip(snapshot.segments.iter()) {
                    self.document.set_text(node, segment)?;
                }
                Ok(())
            }
            // 没有快照（例如另一实例写入的标记）时按属性备份还原
            _ => replace_direct_text(&self.document, element, backup),
        }
    }

    fn revert_legacy_container(&self, container: &Handle) -> bool {
        let original = child_elements(container)
            .iter()
            .flat_map(|child| collect(child, &|n| has_class(n, LEGACY_ORIGINAL_CLASS)))
            .next();
        let Some(original) = original else {
            tracing::debug!("旧版容器中没有原文节点");
            return false;
        };

        remove_class(&original, LEGACY_ORIGINAL_CLASS);
        match self.document.replace_node(container, &original) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("还原旧版容器失败: {}", e);
                false
            }
        }
    }
}

fn collect(root: &Handle, predicate: &dyn Fn(&Handle) -> bool) -> Vec<Handle> {
    let mut found = Vec::new();
    walk_elements(root, &mut |node| {
        if predicate(node) {
            found.push(node.clone());
        }
    });
    found
}

/// 保留空白地替换元素的直接文本
///
/// 改写第一个非空直接文本节点（保留其首尾空白），清空其余非空直接文本节点；
/// 没有直接文本节点时在最前面插入一个。
pub fn replace_direct_text(
    document: &LiveDocument,
    element: &Handle,
    text: &str,
) -> TranslationResult<()> {
    let nodes = direct_text_nodes(element);
    let is_non_empty = |node: &Handle| text_of(node).is_some_and(|t| !t.trim().is_empty());

    let target = nodes
        .iter()
        .position(|node| is_non_empty(node))
        .or(if nodes.is_empty() { None } else { Some(0) });

    let Some(index) = target else {
        let first = element.children.borrow().first().cloned();
        return document.insert_before(element, &create_text(text), first.as_ref());
    };

    let current = text_of(&nodes[index]).unwrap_or_default();
    let trimmed_start = current.trim_start();
    let leading = &current[..current.len() - trimmed_start.len()];
    let trailing = &trimmed_start[trimmed_start.trim_end().len()..];
    document.set_text(&nodes[index], &format!("{}{}{}", leading, text.trim(), trailing))?;

    for (i, node) in nodes.iter().enumerate() {
        if i != index && is_non_empty(node) {
            document.set_text(node, "")?;
        }
    }
    Ok(())
}

/// 元素的块级译文（包装节点文本）
pub fn wrapper_text(element: &Handle) -> Option<String> {
    child_elements(element)
        .into_iter()
        .find(is_wrapper)
        .map(|wrapper| text_content(&wrapper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::find_elements;
    use crate::parsers::html::serialize_document;
    use crate::translation::overlay::markers::{INLINE_ORIGINAL_ATTR, ORIGINAL_ATTR, TRANSLATED_CLASS};

    fn html(doc: &LiveDocument) -> String {
        String::from_utf8(serialize_document(doc.document()).expect("serialize")).expect("utf8")
    }

    fn first(doc: &LiveDocument, tag: &str) -> Handle {
        find_elements(doc.document(), &[tag]).remove(0)
    }

    fn block(element: &Handle) -> Fragment {
        Fragment {
            element: element.clone(),
            mode: FragmentMode::Block,
            original_text: text_content(element).trim().to_string(),
        }
    }

    fn inline(element: &Handle) -> Fragment {
        Fragment {
            element: element.clone(),
            mode: FragmentMode::Inline,
            original_text: direct_text(element).trim().to_string(),
        }
    }

    #[test]
    fn test_block_round_trip() {
        let doc = LiveDocument::parse("<p>Some <b>bold</b> paragraph text</p>");
        let before = html(&doc);
        let engine = OverlayEngine::new(doc.clone());
        let p = first(&doc, "p");

        engine.apply_block(&block(&p), "译文段落").expect("apply");
        assert_eq!(wrapper_text(&p).as_deref(), Some("译文段落"));
        assert!(has_class(&p, TRANSLATED_CLASS));
        assert_eq!(
            get_node_attr(&p, ORIGINAL_ATTR).as_deref(),
            Some("Some bold paragraph text")
        );
        // p 是块级，有一个换行
        assert_eq!(child_elements(&p).iter().filter(|c| is_injected_break(c)).count(), 1);

        let report = engine.revert_all(doc.document());
        assert_eq!(report.blocks, 1);
        assert_eq!(html(&doc), before);
    }

    #[test]
    fn test_apply_twice_keeps_single_wrapper() {
        let doc = LiveDocument::parse("<h2>Heading worth translating</h2>");
        let engine = OverlayEngine::new(doc.clone());
        let h2 = first(&doc, "h2");

        engine.apply_block(&block(&h2), "first").expect("apply");
        engine.apply_block(&block(&h2), "second").expect("apply again");

        let children = child_elements(&h2);
        assert_eq!(children.iter().filter(|c| is_wrapper(c)).count(), 1);
        assert_eq!(children.iter().filter(|c| is_injected_break(c)).count(), 1);
        assert_eq!(wrapper_text(&h2).as_deref(), Some("second"));
        assert_eq!(
            get_node_attr(&h2, ORIGINAL_ATTR).as_deref(),
            Some("Heading worth translating")
        );
    }

    #[test]
    fn test_sanitize_collapses_duplicates() {
        let doc = LiveDocument::parse(
            r#"<p>Text<br data-translationgummy-injected="break"><br data-translationgummy-injected="break"><span data-translationgummy-injected="wrapper" class="translationgummy-translation">a</span><span data-translationgummy-injected="wrapper" class="translationgummy-translation">b</span></p>"#,
        );
        let p = first(&doc, "p");
        assert_eq!(sanitize_element(&doc, &p), 2);
        assert_eq!(sanitize_element(&doc, &p), 0);
        let children = child_elements(&p);
        assert_eq!(children.len(), 2);
        assert!(is_injected_break(&children[0]));
        assert!(is_wrapper(&children[1]));
    }

    #[test]
    fn test_inline_display_gets_no_break() {
        let doc = LiveDocument::parse(r#"<p style="display: inline-block">Inline styled paragraph</p>"#);
        let engine = OverlayEngine::new(doc.clone());
        let p = first(&doc, "p");
        engine.apply_block(&block(&p), "x").expect("apply");
        assert!(!child_elements(&p).iter().any(is_injected_break));
        assert!(wrapper_text(&p).is_some());
    }

    #[test]
    fn test_inline_round_trip_is_byte_exact() {
        let doc = LiveDocument::parse(
            "<ul><li><a href=\"/\"> <i class=\"icon\"></i> Home \n</a></li></ul>",
        );
        let before = html(&doc);
        let engine = OverlayEngine::new(doc.clone());
        let a = first(&doc, "a");

        engine.apply_inline(&inline(&a), "ホーム").expect("apply");
        assert_eq!(text_content(&a), "  ホーム \n");
        assert!(is_inline_translated(&a));
        assert_eq!(get_node_attr(&a, INLINE_ORIGINAL_ATTR).as_deref(), Some("  Home \n"));
        assert_eq!(child_elements(&a).len(), 1);

        engine.revert_all(doc.document());
        assert_eq!(html(&doc), before);
        assert_eq!(get_node_name(&child_elements(&a)[0]), Some("i"));
    }

    #[test]
    fn test_inline_without_ledger_uses_attribute_backup() {
        let doc = LiveDocument::parse(
            r#"<a class="translationgummy-inline-translated" data-translationgummy-inline-original="Home"> ホーム </a>"#,
        );
        let engine = OverlayEngine::new(doc.clone());
        engine.revert_all(doc.document());
        let a = first(&doc, "a");
        assert_eq!(text_content(&a), " Home ");
        assert!(get_node_attr(&a, "class").is_none());
    }

    #[test]
    fn test_revert_drops_backups_of_removed_targets() {
        let doc = LiveDocument::parse("<nav><a>Home</a><a>Docs</a></nav>");
        let engine = OverlayEngine::new(doc.clone());
        let links = find_elements(doc.document(), &["a"]);
        for link in &links {
            engine.apply_inline(&inline(link), "译").expect("apply");
        }
        assert_eq!(engine.ledger.borrow().len(), 2);

        assert!(doc.remove_node(&links[1]));
        let report = engine.revert_all(doc.document());
        assert_eq!(report.inlines, 1);
        assert!(engine.ledger.borrow().is_empty());
        assert_eq!(text_content(&links[0]), "Home");
    }

    #[test]
    fn test_inline_inserts_text_node_when_missing() {
        let doc = LiveDocument::parse("<button><svg></svg></button>");
        let before = html(&doc);
        let engine = OverlayEngine::new(doc.clone());
        let button = first(&doc, "button");

        engine.apply_inline(&inline(&button), "送信").expect("apply");
        assert_eq!(direct_text(&button), "送信");

        engine.revert_all(doc.document());
        assert_eq!(html(&doc), before);
    }

    #[test]
    fn test_mode_conflict_is_reported() {
        let doc = LiveDocument::parse("<p>Paragraph with enough text</p>");
        let engine = OverlayEngine::new(doc.clone());
        let p = first(&doc, "p");
        engine.apply_block(&block(&p), "x").expect("apply");
        assert!(engine.apply_inline(&inline(&p), "y").is_err());
    }

    #[test]
    fn test_legacy_container_revert() {
        let doc = LiveDocument::parse(
            r#"<div id="root"><div class="translationgummy-bilingual-container"><p class="translationgummy-original">Original words</p><div class="translationgummy-translation">Translated</div></div></div>"#,
        );
        let engine = OverlayEngine::new(doc.clone());
        let report = engine.revert_all(doc.document());
        assert_eq!(report.legacy_containers, 1);

        let root = first(&doc, "div");
        let children = child_elements(&root);
        assert_eq!(children.len(), 1);
        assert_eq!(get_node_name(&children[0]), Some("p"));
        assert_eq!(text_content(&children[0]), "Original words");
    }

    #[test]
    fn test_page_status_counts() {
        let doc = LiveDocument::parse(
            "<p>First paragraph text</p><p>Second paragraph text</p><nav><li><a>Home</a></li></nav>",
        );
        let engine = OverlayEngine::new(doc.clone());
        assert_eq!(engine.page_status(doc.document()), PageTranslationStatus::default());

        for p in find_elements(doc.document(), &["p"]) {
            engine.apply_block(&block(&p), "t").expect("apply");
        }
        engine.apply_inline(&inline(&first(&doc, "a")), "ホーム").expect("apply");

        let status = engine.page_status(doc.document());
        assert_eq!(
            status,
            PageTranslationStatus { is_translated: true, translated_count: 3, wrapper_count: 2 }
        );

        let json = serde_json::to_value(status).expect("json");
        assert_eq!(json["isTranslated"], true);
        assert_eq!(json["wrapperCount"], 2);
    }
}
