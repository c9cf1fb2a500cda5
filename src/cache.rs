use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use serde_json::Value;

/// Stable cache key for a memoized lookup: operation name plus its arguments.
pub fn fingerprint(operation: &str, args: &[&str]) -> String {
    let mut key = String::from(operation);
    for a in args {
        key.push(':');
        key.push_str(a);
    }
    key
}

/// Read-through cache contract. Owned and injected by the caller; mutation
/// paths must invalidate the keys they touch.
#[async_trait]
pub trait LookupCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn put(&self, key: String, value: Value);
    async fn invalidate(&self, key: &str);
}

/// In-memory backing with per-entry expiry.
pub struct MemoryCache {
    inner: MokaCache<String, Value>,
}

impl MemoryCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        MemoryCache {
            inner: MokaCache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl LookupCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key).await
    }

    async fn put(&self, key: String, value: Value) {
        self.inner.insert(key, value).await;
    }

    async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_is_stable_and_argument_sensitive() {
        let a = fingerprint("medication.get", &["1f"]);
        let b = fingerprint("medication.get", &["1f"]);
        let c = fingerprint("medication.get", &["2a"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, "medication.get:1f");
    }

    #[tokio::test]
    async fn put_get_invalidate_roundtrip() {
        let cache = MemoryCache::new(16, Duration::from_secs(60));
        let key = fingerprint("medication.get", &["abc"]);

        assert!(cache.get(&key).await.is_none());

        cache.put(key.clone(), json!({"stock": 10})).await;
        assert_eq!(cache.get(&key).await, Some(json!({"stock": 10})));

        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());
    }
}
