//! Bounded TTL-LRU cache for finished translations.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Number of leading characters of the input text used in the cache key.
const KEY_TEXT_PREFIX: usize = 64;

/// Cache key: language pair plus a prefix of the input text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    src: String,
    tgt: String,
    prefix: String,
}

impl Key {
    fn new(src: &str, tgt: &str, text: &str) -> Self {
        let prefix: String = text.chars().take(KEY_TEXT_PREFIX).collect();
        Self {
            src: src.to_string(),
            tgt: tgt.to_string(),
            prefix,
        }
    }
}

/// A bounded LRU with per-entry expiry.
pub struct TtlCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<Key, (String, Instant)>,
    order: VecDeque<Key>,
}

impl TtlCache {
    /// Creates a cache holding up to `capacity` entries for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Looks up a translation; a hit refreshes recency.
    pub fn get(&mut self, src: &str, tgt: &str, text: &str) -> Option<String> {
        let key = Key::new(src, tgt, text);
        match self.entries.get(&key) {
            Some((value, inserted_at)) if inserted_at.elapsed() < self.ttl => {
                let value = value.clone();
                self.touch(&key);
                Some(value)
            }
            Some(_) => {
                self.entries.remove(&key);
                self.order.retain(|k| k != &key);
                None
            }
            None => None,
        }
    }

    /// Stores a translation, evicting the least recently used entry when
    /// full.
    pub fn insert(&mut self, src: &str, tgt: &str, text: &str, translated: String) {
        let key = Key::new(src, tgt, text);
        if self.entries.insert(key.clone(), (translated, Instant::now())).is_none() {
            self.order.push_back(key);
        } else {
            self.touch(&key);
        }

        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Returns the number of live entries (including not-yet-swept
    /// expired ones).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, key: &Key) {
        self.order.retain(|k| k != key);
        self.order.push_back(key.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss() {
        let mut cache = TtlCache::new(4, Duration::from_secs(60));
        cache.insert("en", "es", "Hello", "Hola".to_string());

        assert_eq!(cache.get("en", "es", "Hello"), Some("Hola".to_string()));
        assert_eq!(cache.get("en", "fr", "Hello"), None);
        assert_eq!(cache.get("en", "es", "Goodbye"), None);
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let mut cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert("en", "es", "one", "uno".to_string());
        cache.insert("en", "es", "two", "dos".to_string());

        // Touch "one" so "two" is the eviction candidate.
        assert!(cache.get("en", "es", "one").is_some());
        cache.insert("en", "es", "three", "tres".to_string());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("en", "es", "one").is_some());
        assert!(cache.get("en", "es", "two").is_none());
        assert!(cache.get("en", "es", "three").is_some());
    }

    #[test]
    fn test_expiry() {
        let mut cache = TtlCache::new(4, Duration::from_millis(0));
        cache.insert("en", "es", "Hello", "Hola".to_string());
        assert_eq!(cache.get("en", "es", "Hello"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_long_texts_share_prefix_key() {
        let mut cache = TtlCache::new(4, Duration::from_secs(60));
        let long_a = format!("{}{}", "a".repeat(80), "tail one");
        let long_b = format!("{}{}", "a".repeat(80), "tail two");

        cache.insert("en", "es", &long_a, "translated".to_string());
        // Same 64-char prefix, same key.
        assert!(cache.get("en", "es", &long_b).is_some());
    }
}
