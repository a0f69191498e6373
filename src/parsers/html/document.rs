//! 可观察的活动文档
//!
//! 包装 `RcDom` 的文档树。所有写操作都经过这里，开启观察后会生成与浏览器
//! `MutationObserver`（childList + characterData + subtree）一致的变更记录。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use html5ever::tendril::StrTendril;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use tokio::sync::Notify;

use super::dom::{find_nodes, html_to_dom, parent_of};
use crate::translation::error::{helpers, TranslationResult};

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    CharacterData,
}

/// 单条变更记录
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// childList 时为父节点，characterData 时为文本节点
    pub target: Handle,
    pub added: Vec<Handle>,
    pub removed: Vec<Handle>,
}

/// 活动文档
pub struct LiveDocument {
    document: Handle,
    observing: Cell<bool>,
    records: RefCell<Vec<MutationRecord>>,
    notify: Notify,
}

impl LiveDocument {
    /// 从已解析的 DOM 创建
    pub fn new(dom: RcDom) -> Rc<Self> {
        Rc::new(Self {
            document: dom.document,
            observing: Cell::new(false),
            records: RefCell::new(Vec::new()),
            notify: Notify::new(),
        })
    }

    /// 解析 HTML 字符串
    pub fn parse(html: &str) -> Rc<Self> {
        Self::new(html_to_dom(html.as_bytes(), "utf-8"))
    }

    pub fn document(&self) -> &Handle {
        &self.document
    }

    pub fn body(&self) -> Option<Handle> {
        find_nodes(&self.document, &["html", "body"]).into_iter().next()
    }

    // ------------------------------------------------------------------
    // 观察
    // ------------------------------------------------------------------

    /// 开始记录变更
    pub fn observe(&self) {
        self.observing.set(true);
    }

    /// 停止记录并丢弃尚未取走的记录
    pub fn disconnect(&self) {
        self.observing.set(false);
        self.records.borrow_mut().clear();
    }

    pub fn is_observed(&self) -> bool {
        self.observing.get()
    }

    /// 取走所有待处理记录（`MutationObserver.takeRecords()`）
    pub fn take_records(&self) -> Vec<MutationRecord> {
        std::mem::take(&mut *self.records.borrow_mut())
    }

    /// 把先前取走的记录放回队首，保持原有顺序
    pub fn requeue_records(&self, mut earlier: Vec<MutationRecord>) {
        if earlier.is_empty() {
            return;
        }
        let mut records = self.records.borrow_mut();
        earlier.append(&mut records);
        *records = earlier;
    }

    pub fn pending_records(&self) -> usize {
        self.records.borrow().len()
    }

    /// 等待下一批变更
    pub async fn changed(&self) {
        self.notify.notified().await
    }

    fn record(&self, record: MutationRecord) {
        if !self.observing.get() {
            return;
        }
        self.records.borrow_mut().push(record);
        self.notify.notify_one();
    }

    // ------------------------------------------------------------------
    // 写操作
    // ------------------------------------------------------------------

    /// 追加子节点；若子节点已有父节点，先从原位置移除
    pub fn append_child(&self, parent: &Handle, child: &Handle) {
        self.detach_silently(child);
        child.parent.set(Some(Rc::downgrade(parent)));
        parent.children.borrow_mut().push(child.clone());
        self.record(MutationRecord {
            kind: MutationKind::ChildList,
            target: parent.clone(),
            added: vec![child.clone()],
            removed: Vec::new(),
        });
    }

    /// 在参考节点之前插入；参考节点为空时等同于追加
    pub fn insert_before(
        &self,
        parent: &Handle,
        child: &Handle,
        reference: Option<&Handle>,
    ) -> TranslationResult<()> {
        let Some(reference) = reference else {
            self.append_child(parent, child);
            return Ok(());
        };

        self.detach_silently(child);
        let index = parent
            .children
            .borrow()
            .iter()
            .position(|c| Rc::ptr_eq(c, reference))
            .ok_or_else(|| helpers::dom_error("参考节点不是父节点的子节点"))?;

        child.parent.set(Some(Rc::downgrade(parent)));
        parent.children.borrow_mut().insert(index, child.clone());
        self.record(MutationRecord {
            kind: MutationKind::ChildList,
            target: parent.clone(),
            added: vec![child.clone()],
            removed: Vec::new(),
        });
        Ok(())
    }

    /// 从父节点移除；返回是否真的移除了
    pub fn remove_node(&self, node: &Handle) -> bool {
        let Some(parent) = parent_of(node) else {
            return false;
        };
        if !self.detach_silently(node) {
            return false;
        }
        self.record(MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
            added: Vec::new(),
            removed: vec![node.clone()],
        });
        true
    }

    /// 用新节点替换旧节点
    pub fn replace_node(&self, old: &Handle, new: &Handle) -> TranslationResult<()> {
        let parent = parent_of(old)
            .ok_or_else(|| helpers::dom_error("被替换的节点没有父节点"))?;

        self.detach_silently(new);
        let index = parent
            .children
            .borrow()
            .iter()
            .position(|c| Rc::ptr_eq(c, old))
            .ok_or_else(|| helpers::dom_error("父子关系不一致"))?;

        new.parent.set(Some(Rc::downgrade(&parent)));
        parent.children.borrow_mut()[index] = new.clone();
        old.parent.set(None);

        self.record(MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
            added: vec![new.clone()],
            removed: vec![old.clone()],
        });
        Ok(())
    }

    /// 修改文本节点内容（characterData）
    pub fn set_text(&self, text_node: &Handle, value: &str) -> TranslationResult<()> {
        match &text_node.data {
            NodeData::Text { contents } => {
                if &**contents.borrow() == value {
                    return Ok(());
                }
                *contents.borrow_mut() = StrTendril::from_slice(value);
            }
            _ => {
                return Err(helpers::dom_error("set_text 只能作用于文本节点"));
            }
        }
        self.record(MutationRecord {
            kind: MutationKind::CharacterData,
            target: text_node.clone(),
            added: Vec::new(),
            removed: Vec::new(),
        });
        Ok(())
    }

    /// 把元素的全部子节点替换为单个文本节点（`textContent = ...`）
    pub fn replace_children_with_text(&self, element: &Handle, value: &str) {
        let children: Vec<Handle> = element.children.borrow().clone();
        for child in children.iter() {
            self.remove_node(child);
        }
        self.append_child(element, &super::dom::create_text(value));
    }

    fn detach_silently(&self, node: &Handle) -> bool {
        let Some(parent) = parent_of(node) else {
            return false;
        };
        let mut children = parent.children.borrow_mut();
        let before = children.len();
        children.retain(|c| !Rc::ptr_eq(c, node));
        node.parent.set(None);
        children.len() != before
    }
}
