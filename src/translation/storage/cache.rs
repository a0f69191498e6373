//! 翻译结果缓存
//!
//! 只缓存真实译文（占位文本从不进入缓存），按语言对 + 原文做 LRU 淘汰。

use std::cell::{Cell, RefCell};
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::translation::config::constants;
use crate::translation::core::capability::LanguagePair;

/// 缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pair: LanguagePair,
    text: String,
}

impl CacheKey {
    pub fn new(pair: &LanguagePair, text: &str) -> Self {
        Self {
            pair: pair.clone(),
            text: text.to_string(),
        }
    }
}

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub sets: usize,
    pub clears: usize,
}

impl CacheStats {
    /// 命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 本地LRU缓存
pub struct TranslationCache {
    entries: RefCell<LruCache<CacheKey, String>>,
    stats: Cell<CacheStats>,
}

impl TranslationCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(constants::DEFAULT_TRANSLATION_CACHE_SIZE))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RefCell::new(LruCache::new(capacity)),
            stats: Cell::new(CacheStats::default()),
        }
    }

    /// 获取缓存项
    pub fn get(&self, pair: &LanguagePair, text: &str) -> Option<String> {
        let key = CacheKey::new(pair, text);
        let found = self.entries.borrow_mut().get(&key).cloned();
        self.update_stats(|stats| {
            if found.is_some() {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        });
        found
    }

    /// 设置缓存项
    pub fn put(&self, pair: &LanguagePair, text: &str, translated: &str) {
        self.entries
            .borrow_mut()
            .put(CacheKey::new(pair, text), translated.to_string());
        self.update_stats(|stats| stats.sets += 1);
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
        self.update_stats(|stats| stats.clears += 1);
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.get()
    }

    fn update_stats(&self, update: impl FnOnce(&mut CacheStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new(constants::DEFAULT_TRANSLATION_CACHE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_eviction_and_stats() {
        let cache = TranslationCache::new(2);
        let pair = LanguagePair::new("en", "ja");

        cache.put(&pair, "one", "一");
        cache.put(&pair, "two", "二");
        assert_eq!(cache.get(&pair, "one").as_deref(), Some("一"));
        cache.put(&pair, "three", "三");

        // "two" 最久未使用
        assert!(cache.get(&pair, "two").is_none());
        assert_eq!(cache.len(), 2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 3);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pairs_do_not_collide() {
        let cache = TranslationCache::default();
        cache.put(&LanguagePair::new("en", "ja"), "hello", "こんにちは");
        assert!(cache.get(&LanguagePair::new("en", "fr"), "hello").is_none());

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().clears, 1);
    }
}
