//! HTML解析和处理模块
//!
//! - `utils`: 基础工具函数和常量
//! - `dom`: 基础DOM操作
//! - `document`: 可观察的活动文档与变更记录
//! - `node_map`: 以节点身份为键的弱引用映射
//! - `serializer`: 序列化功能

pub mod document;
pub mod dom;
pub mod node_map;
pub mod serializer;
pub mod utils;

pub use document::{LiveDocument, MutationKind, MutationRecord};
pub use dom::{
    add_class, child_elements, closest, create_element, create_text,
    direct_text_nodes, find_elements, find_nodes, get_node_attr,
    get_node_name, has_class, html_to_dom, is_attached, is_element, is_text, parent_of,
    previous_sibling, remove_class, set_node_attr, text_content, text_of, walk_elements,
};
pub use node_map::WeakNodeMap;
pub use serializer::{serialize_document, serialize_node};
pub use utils::{is_block_display, BLOCK_DISPLAY_TAGS, WHITESPACES};
