//! # 解析器模块
//!
//! 页面文档的解析、遍历与可观察写入。
//!
//! - `html` - HTML文档解析、DOM操作、变更记录、序列化

pub mod html;

pub use html::{html_to_dom, serialize_document, LiveDocument, MutationKind, MutationRecord};
