//! 以节点身份为键的弱引用映射
//!
//! 不延长节点寿命；节点被释放后对应条目自动失效。

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, Node};

pub struct WeakNodeMap<V> {
    entries: HashMap<usize, (Weak<Node>, V)>,
}

fn key_of(node: &Handle) -> usize {
    Rc::as_ptr(node) as usize
}

impl<V> WeakNodeMap<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, node: &Handle, value: V) -> Option<V> {
        self.entries
            .insert(key_of(node), (Rc::downgrade(node), value))
            .and_then(|(weak, old)| weak.upgrade().map(|_| old))
    }

    pub fn get(&self, node: &Handle) -> Option<&V> {
        self.entries
            .get(&key_of(node))
            .filter(|(weak, _)| same_node(weak, node))
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, node: &Handle) -> Option<&mut V> {
        self.entries
            .get_mut(&key_of(node))
            .filter(|(weak, _)| same_node(weak, node))
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, node: &Handle) -> Option<V> {
        let key = key_of(node);
        let live = self
            .entries
            .get(&key)
            .is_some_and(|(weak, _)| same_node(weak, node));
        let removed = self.entries.remove(&key);
        if live {
            removed.map(|(_, value)| value)
        } else {
            None
        }
    }

    pub fn contains(&self, node: &Handle) -> bool {
        self.get(node).is_some()
    }

    /// 只保留节点仍存活且满足条件的条目
    pub fn retain(&mut self, mut keep: impl FnMut(&Handle, &mut V) -> bool) {
        self.entries.retain(|_, (weak, value)| match weak.upgrade() {
            Some(node) => keep(&node, value),
            None => false,
        });
    }

    /// 存活条目数
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|(weak, _)| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<V> Default for WeakNodeMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

fn same_node(weak: &Weak<Node>, node: &Handle) -> bool {
    weak.upgrade().is_some_and(|live| Rc::ptr_eq(&live, node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::create_element;

    #[test]
    fn test_entries_follow_node_lifetime() {
        let mut map = WeakNodeMap::new();
        let kept = create_element("a", &[]);
        {
            let dropped = create_element("a", &[]);
            map.insert(&dropped, "dropped");
        }
        map.insert(&kept, "kept");

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&kept), Some(&"kept"));

        map.retain(|_, _| true);
        assert_eq!(map.entries.len(), 1);
        assert_eq!(map.remove(&kept), Some("kept"));
        assert!(map.is_empty());
    }

    #[test]
    fn test_get_mut_updates_value() {
        let mut map = WeakNodeMap::new();
        let node = create_element("textarea", &[]);
        map.insert(&node, 1);
        if let Some(value) = map.get_mut(&node) {
            *value += 1;
        }
        assert_eq!(map.get(&node), Some(&2));
        assert!(map.contains(&node));
    }
}
