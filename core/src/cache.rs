//! Run-scoped response cache.
//!
//! Lives only as long as the `HttpClient` clones that share it; nothing is
//! written to disk. Disabled unless `cache.enabled` is set.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub body: Value,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    entries: Arc<Mutex<HashMap<String, CachedResponse>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let entries = self.entries.lock().ok()?;
        entries.get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, response: CachedResponse) {
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.insert(key.into(), response);
            }
            Err(_) => tracing::warn!("response cache lock poisoned, skipping insert"),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clones_share_entries() {
        let cache = ResponseCache::new();
        let clone = cache.clone();

        clone.insert(
            "https://registry.npmjs.org/left-pad",
            CachedResponse {
                body: json!({"name": "left-pad"}),
                next: None,
            },
        );

        let hit = cache.get("https://registry.npmjs.org/left-pad").unwrap();
        assert_eq!(hit.body["name"], "left-pad");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_miss_returns_none() {
        let cache = ResponseCache::new();
        assert!(cache.get("missing").is_none());
        assert!(cache.is_empty());
    }
}
