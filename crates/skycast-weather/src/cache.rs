//! In-memory lookup tables with lazy time-based expiry.
//!
//! Expiry is only checked on read; there is no background sweep.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Raw forecast series
pub const FORECAST_TTL: Duration = Duration::from_secs(30 * 60);
/// Provider-specific resolved results (location keys, query responses)
pub const RESULT_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// `None` never expires
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// String-keyed cache. Last writer for a key wins.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    default_ttl: Option<Duration>,
}

impl<V: Clone> TtlCache<V> {
    /// Cache whose entries expire `ttl` after insertion
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: Some(ttl),
        }
    }

    /// Cache whose entries never expire
    pub fn unbounded() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: None,
        }
    }

    /// Fresh value for `key`. Expired entries are dropped and read as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(Instant::now()) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let expires_at = self
            .default_ttl
            .and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries
            .lock()
            .insert(key.into(), CacheEntry { value, expires_at });
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, expired ones included until they are read
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = TtlCache::with_ttl(RESULT_TTL);
        cache.insert("paris", 21.5);
        assert_eq!(cache.get("paris"), Some(21.5));
        assert_eq!(cache.get("london"), None);
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_removed() {
        let cache = TtlCache::with_ttl(Duration::from_millis(5));
        cache.insert("k", "v".to_string());
        assert_eq!(cache.len(), 1);

        std::thread::sleep(Duration::from_millis(20));

        // still stored until read
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unbounded_never_expires() {
        let cache = TtlCache::unbounded();
        cache.insert("k", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), Some(1));
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = TtlCache::unbounded();
        cache.insert("k", 1);
        cache.insert("k", 2);
        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = TtlCache::with_ttl(FORECAST_TTL);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }
}
