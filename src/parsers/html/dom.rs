use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

use super::utils::WHITESPACES;

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let s = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.to_string(),
        None => String::from_utf8_lossy(data).to_string(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .one(s.as_bytes())
}

/// 查找指定路径的DOM节点
pub fn find_nodes(node: &Handle, node_names: &[&str]) -> Vec<Handle> {
    let mut found_nodes = Vec::new();
    let Some((&node_name, rest)) = node_names.split_first() else {
        return found_nodes;
    };

    let matches = get_node_name(node).is_some_and(|name| name == node_name);

    if matches && rest.is_empty() {
        found_nodes.push(node.clone());
    }

    let next_names = if matches && !rest.is_empty() {
        rest
    } else {
        node_names
    };

    for child_node in node.children.borrow().iter() {
        found_nodes.append(&mut find_nodes(child_node, next_names));
    }

    found_nodes
}

/// 按文档顺序收集所有名称在列表中的元素
pub fn find_elements(root: &Handle, names: &[&str]) -> Vec<Handle> {
    let mut found = Vec::new();
    walk_elements(root, &mut |node| {
        if get_node_name(node).is_some_and(|name| names.contains(&name)) {
            found.push(node.clone());
        }
    });
    found
}

/// 先序遍历元素节点
pub fn walk_elements(node: &Handle, visit: &mut dyn FnMut(&Handle)) {
    if matches!(node.data, NodeData::Element { .. }) {
        visit(node);
    }
    let children: Vec<Handle> = node.children.borrow().clone();
    for child in children.iter() {
        walk_elements(child, visit);
    }
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取父节点
///
/// `Node::parent` 是 `Cell`，读取时必须放回原值
pub fn parent_of(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// 设置节点属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr: bool = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(attr_value) = attr_value.as_deref() {
                    attrs_mut[i].value.clear();
                    attrs_mut[i].value.push_slice(attr_value);
                } else {
                    // Remove attr completely if attr_value is not defined
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            if let Some(attr_value) = attr_value {
                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                    value: format_tendril!("{}", attr_value),
                });
            }
        }
    };
}

/// 判断元素 class 列表中是否包含指定类名
pub fn has_class(node: &Handle, class_name: &str) -> bool {
    get_node_attr(node, "class")
        .map(|classes| classes.split(WHITESPACES).any(|c| c == class_name))
        .unwrap_or(false)
}

/// 追加类名（已存在时不重复添加）
///
/// 没有 class 属性时新建；已有属性（包括空值）时以一个空格接在原值之后，
/// 这样 `remove_class` 能把属性还原成原来的字节
pub fn add_class(node: &Handle, class_name: &str) {
    match get_node_attr(node, "class") {
        Some(classes) if classes.split(WHITESPACES).any(|c| c == class_name) => {}
        Some(classes) => set_node_attr(node, "class", Some(format!("{} {}", classes, class_name))),
        None => set_node_attr(node, "class", Some(class_name.to_string())),
    }
}

/// 移除类名，撤销 `add_class` 的写法
///
/// 属性只剩该类名时删除属性；类名是最后追加的一项时去掉 `" 类名"` 后缀，保留原值；
/// 其余情况按空白拆分后重新拼接
pub fn remove_class(node: &Handle, class_name: &str) {
    let Some(classes) = get_node_attr(node, "class") else {
        return;
    };
    if !classes.split(WHITESPACES).any(|c| c == class_name) {
        return;
    }

    if classes == class_name {
        set_node_attr(node, "class", None);
        return;
    }
    if let Some(original) = classes.strip_suffix(class_name).and_then(|rest| rest.strip_suffix(' ')) {
        set_node_attr(node, "class", Some(original.to_string()));
        return;
    }

    let remaining: Vec<&str> = classes
        .split(WHITESPACES)
        .filter(|c| !c.is_empty() && *c != class_name)
        .collect();

    if remaining.is_empty() {
        set_node_attr(node, "class", None);
    } else {
        set_node_attr(node, "class", Some(remaining.join(" ")));
    }
}

/// 创建一个 HTML 元素节点（尚未挂载）
pub fn create_element(tag: &str, attributes: &[(&str, &str)]) -> Handle {
    let attrs = attributes
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: StrTendril::from_slice(value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 创建文本节点
pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 文本节点内容，非文本节点返回 None
pub fn text_of(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

pub fn is_text(node: &Handle) -> bool {
    matches!(node.data, NodeData::Text { .. })
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

/// 等价于 `Node.textContent`
pub fn text_content(node: &Handle) -> String {
    let mut buf = String::new();
    collect_text(node, &mut buf);
    buf
}

fn collect_text(node: &Handle, buf: &mut String) {
    match &node.data {
        NodeData::Text { contents } => buf.push_str(&contents.borrow()),
        NodeData::Comment { .. } | NodeData::ProcessingInstruction { .. } => {}
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, buf);
            }
        }
    }
}

/// 元素的直接子文本节点
pub fn direct_text_nodes(node: &Handle) -> Vec<Handle> {
    node.children
        .borrow()
        .iter()
        .filter(|child| is_text(child))
        .cloned()
        .collect()
}

/// 元素的直接子元素
pub fn child_elements(node: &Handle) -> Vec<Handle> {
    node.children
        .borrow()
        .iter()
        .filter(|child| is_element(child))
        .cloned()
        .collect()
}

/// 前一个兄弟节点
pub fn previous_sibling(node: &Handle) -> Option<Handle> {
    let parent = parent_of(node)?;
    let children = parent.children.borrow();
    let index = children.iter().position(|c| Rc::ptr_eq(c, node))?;
    index.checked_sub(1).map(|i| children[i].clone())
}

/// 节点自身或任一祖先满足条件
pub fn closest(node: &Handle, predicate: &dyn Fn(&Handle) -> bool) -> Option<Handle> {
    let mut current = Some(node.clone());
    while let Some(candidate) = current {
        if predicate(&candidate) {
            return Some(candidate);
        }
        current = parent_of(&candidate);
    }
    None
}

/// 节点是否仍挂在某个 Document 节点之下
pub fn is_attached(node: &Handle) -> bool {
    let mut current = node.clone();
    loop {
        if matches!(current.data, NodeData::Document) {
            return true;
        }
        match parent_of(&current) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}
