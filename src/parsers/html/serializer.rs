use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use markup5ever_rcdom::{Handle, SerializableHandle};

use crate::translation::error::{TranslationError, TranslationResult};

/// 序列化文档（或任意子树的子节点）
pub fn serialize_document(document: &Handle) -> TranslationResult<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = document.clone().into();
    serialize(&mut buf, &serializable, SerializeOpts::default())
        .map_err(|e| TranslationError::SerializationError(format!("DOM序列化失败: {}", e)))?;
    Ok(buf)
}

/// 序列化节点本身（outerHTML）
pub fn serialize_node(node: &Handle) -> String {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::IncludeNode,
        ..Default::default()
    };
    match serialize(&mut buf, &serializable, opts) {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(e) => {
            tracing::warn!("节点序列化失败: {}", e);
            String::new()
        }
    }
}
