//! Query cache driven by realtime events.
//!
//! Entries are addressed by a [`QueryKey`], an ordered list of segments such
//! as `["report", "42"]`. Invalidation matches by prefix and only marks
//! entries stale; the next reader decides whether to refetch.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;

/// Ordered cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// First segment, used as the metrics label.
    pub fn root(&self) -> &str {
        self.0.first().map_or("", String::as_str)
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for QueryKey {
    fn from(segments: [S; N]) -> Self {
        Self::new(segments)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Cached value with freshness.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub stale: bool,
    pub updated_at: DateTime<Utc>,
}

/// Sink for cache operations.
#[cfg_attr(test, mockall::automock)]
pub trait QueryCache: Send + Sync {
    /// Mark every entry under `prefix` stale. Returns the number of entries marked.
    fn invalidate(&self, prefix: &QueryKey) -> usize;

    /// Store a fresh value.
    fn set(&self, key: QueryKey, value: Value);

    fn get(&self, key: &QueryKey) -> Option<CacheEntry>;
}

/// Concurrent in-memory cache.
#[derive(Debug, Default)]
pub struct InMemoryQueryCache {
    entries: DashMap<QueryKey, CacheEntry>,
}

impl InMemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries currently marked stale.
    pub fn stale_count(&self) -> usize {
        self.entries.iter().filter(|e| e.stale).count()
    }
}

impl QueryCache for InMemoryQueryCache {
    fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut marked = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.key().starts_with(prefix) {
                entry.stale = true;
                marked += 1;
            }
        }
        marked
    }

    fn set(&self, key: QueryKey, value: Value) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stale: false,
                updated_at: Utc::now(),
            },
        );
    }

    fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefix_matching() {
        let key = QueryKey::from(["report", "42"]);
        assert!(key.starts_with(&QueryKey::from(["report"])));
        assert!(key.starts_with(&key.clone()));
        assert!(!key.starts_with(&QueryKey::from(["reports"])));
        assert!(!QueryKey::from(["report"]).starts_with(&key));
        assert_eq!(key.root(), "report");
        assert_eq!(key.to_string(), "[report, 42]");
    }

    #[test]
    fn test_invalidate_marks_prefix_stale() {
        let cache = InMemoryQueryCache::new();
        cache.set(QueryKey::from(["report", "1"]), json!({"id": "1"}));
        cache.set(QueryKey::from(["report", "2"]), json!({"id": "2"}));
        cache.set(QueryKey::from(["reports"]), json!([]));

        assert_eq!(cache.invalidate(&QueryKey::from(["report"])), 2);
        assert_eq!(cache.stale_count(), 2);
        assert!(!cache.get(&QueryKey::from(["reports"])).unwrap().stale);

        // Nothing cached under the prefix.
        assert_eq!(cache.invalidate(&QueryKey::from(["notifications"])), 0);
    }

    #[test]
    fn test_set_refreshes_stale_entry() {
        let cache = InMemoryQueryCache::new();
        let key = QueryKey::from(["dashboard"]);
        cache.set(key.clone(), json!({"v": 1}));
        cache.invalidate(&key);
        assert!(cache.get(&key).unwrap().stale);

        cache.set(key.clone(), json!({"v": 2}));
        let entry = cache.get(&key).unwrap();
        assert!(!entry.stale);
        assert_eq!(entry.value["v"], 2);
        assert_eq!(cache.len(), 1);
    }
}
