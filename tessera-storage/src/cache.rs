// Result cache: advisory key/value store with TTL
//
// A cache outage never fails a request. Every error is logged and turned
// into a miss (reads) or a no-op (writes).

use crate::error::StorageError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::{canonical_parameter_string, Parameters};
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

/// Prefix shared by every segmentation result key.
pub const SEGMENTATION_KEY_PREFIX: &str = "seg:";

/// Hex digits kept from the content hash. Collisions are an accepted
/// tradeoff; widening breaks compatibility with existing cache stores.
pub const SHORT_HASH_LEN: usize = 8;

/// Raw storage behind [`ResultCache`]. Values are serialized JSON text.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Remove every key starting with `prefix`, returning how many went.
    async fn clear_by_prefix(&self, prefix: &str) -> Result<usize, StorageError>;
}

/// First [`SHORT_HASH_LEN`] hex digits of the MD5 of `bytes`.
pub fn short_hash(bytes: &[u8]) -> String {
    let digest = format!("{:x}", md5::compute(bytes));
    digest[..SHORT_HASH_LEN].to_string()
}

/// `seg:<algorithm>:<shortHash(image)>:<shortHash(canonical params)>`
pub fn segmentation_key(algorithm: &str, image_bytes: &[u8], params: &Parameters) -> String {
    segmentation_key_with_image_hash(algorithm, &short_hash(image_bytes), params)
}

/// Same as [`segmentation_key`] with the image hash computed up front, so a
/// request hashes its pixels once for all of its units.
pub fn segmentation_key_with_image_hash(
    algorithm: &str,
    image_hash: &str,
    params: &Parameters,
) -> String {
    let params_hash = short_hash(canonical_parameter_string(params).as_bytes());
    format!(
        "{}{}:{}:{}",
        SEGMENTATION_KEY_PREFIX, algorithm, image_hash, params_hash
    )
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
    last_accessed: RwLock<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|t| now >= t).unwrap_or(false)
    }
}

/// In-process backend with per-entry TTL and least-recently-used eviction.
pub struct MemoryCacheBackend {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
}

impl MemoryCacheBackend {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    fn evict_lru(&self) {
        if self.purge_expired() > 0 {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| *entry.last_accessed.read())
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            debug!(key = %key, "Evicting least recently used cache entry");
            self.entries.remove(&key);
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                *entry.last_accessed.write() = now;
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StorageError> {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.evict_lru();
        }
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: ttl.map(|ttl| now + ttl),
                last_accessed: RwLock::new(now),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn clear_by_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

/// Typed, fault-tolerant front for a [`CacheBackend`].
#[derive(Clone)]
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
    default_ttl: Option<Duration>,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Option<Duration>) -> Self {
        Self { backend, default_ttl }
    }

    /// In-memory cache, the default when no external store is configured.
    pub fn in_memory(max_entries: usize, default_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new(max_entries)), Some(default_ttl))
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Absent on miss, on a value that no longer deserializes, or when the
    /// backend is unreachable.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache get failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value could not be decoded");
                None
            }
        }
    }

    /// Best effort. Returns whether the value was stored.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache value could not be encoded");
                return false;
            }
        };
        match self.backend.set(key, serialized, ttl.or(self.default_ttl)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache set failed");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.backend.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    pub async fn clear_by_prefix(&self, prefix: &str) -> usize {
        match self.backend.clear_by_prefix(prefix).await {
            Ok(count) => count,
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "Cache clear by prefix failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;
    use tessera_core::ParamValue;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        segments: usize,
    }

    fn params(entries: &[(&str, ParamValue)]) -> Parameters {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_short_hash_is_md5_prefix() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(short_hash(b""), "d41d8cd9");
        assert_eq!(short_hash(b"abc"), "90015098");
    }

    #[test]
    fn test_key_layout() {
        let p = params(&[("scale", ParamValue::Int(100))]);
        let key = segmentation_key("felzenszwalb", b"pixels", &p);
        let parts: Vec<&str> = key.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "seg");
        assert_eq!(parts[1], "felzenszwalb");
        assert_eq!(parts[2], short_hash(b"pixels"));
        assert_eq!(parts[3], short_hash(b"[('scale', 100)]"));
    }

    #[test]
    fn test_key_ignores_insertion_order() {
        let mut a = Parameters::new();
        a.insert("b".into(), ParamValue::Int(1));
        a.insert("a".into(), ParamValue::Int(2));
        let mut b = Parameters::new();
        b.insert("a".into(), ParamValue::Int(2));
        b.insert("b".into(), ParamValue::Int(1));
        assert_eq!(segmentation_key("slic", b"x", &a), segmentation_key("slic", b"x", &b));
    }

    #[test]
    fn test_key_distinguishes_int_and_float() {
        let int = params(&[("sigma", ParamValue::Int(1))]);
        let float = params(&[("sigma", ParamValue::Float(1.0))]);
        assert_ne!(segmentation_key("slic", b"x", &int), segmentation_key("slic", b"x", &float));
    }

    proptest! {
        #[test]
        fn prop_changing_one_parameter_changes_key(base in 0i64..10_000, delta in 1i64..10_000) {
            let a = params(&[("scale", ParamValue::Int(base)), ("min_size", ParamValue::Int(50))]);
            let b = params(&[("scale", ParamValue::Int(base + delta)), ("min_size", ParamValue::Int(50))]);
            prop_assert_ne!(
                segmentation_key("felzenszwalb", b"img", &a),
                segmentation_key("felzenszwalb", b"img", &b)
            );
        }
    }

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let cache = ResultCache::in_memory(10, Duration::from_secs(60));
        assert!(cache.set("seg:a", &Payload { segments: 3 }, None).await);
        let value: Option<Payload> = cache.get("seg:a").await;
        assert_eq!(value, Some(Payload { segments: 3 }));
        assert!(cache.get::<Payload>("seg:b").await.is_none());
    }

    #[tokio::test]
    async fn test_memory_backend_ttl_expiry() {
        let backend = MemoryCacheBackend::new(10);
        backend
            .set("k", "v".to_string(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_memory_backend_evicts_least_recently_used() {
        let backend = MemoryCacheBackend::new(2);
        backend.set("a", "1".into(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        backend.set("b", "2".into(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        // touch "a" so "b" becomes the oldest
        backend.get("a").await.unwrap();
        backend.set("c", "3".into(), None).await.unwrap();

        assert_eq!(backend.len(), 2);
        assert!(backend.get("a").await.unwrap().is_some());
        assert!(backend.get("b").await.unwrap().is_none());
        assert!(backend.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_and_clear_by_prefix() {
        let cache = ResultCache::in_memory(10, Duration::from_secs(60));
        cache.set("seg:slic:1:1", &1u32, None).await;
        cache.set("seg:slic:2:2", &2u32, None).await;
        cache.set("other:1", &3u32, None).await;

        assert!(cache.delete("seg:slic:1:1").await);
        assert!(!cache.delete("seg:slic:1:1").await);
        assert_eq!(cache.clear_by_prefix("seg:").await, 1);
        assert_eq!(cache.get::<u32>("other:1").await, Some(3));
    }

    #[tokio::test]
    async fn test_undecodable_value_is_a_miss() {
        let backend = Arc::new(MemoryCacheBackend::new(10));
        backend.set("k", "{not json".into(), None).await.unwrap();
        let cache = ResultCache::new(backend, None);
        assert!(cache.get::<Payload>("k").await.is_none());
    }

    #[tokio::test]
    async fn test_backend_outage_degrades_to_miss_and_noop() {
        let mut backend = MockCacheBackend::new();
        backend
            .expect_get()
            .returning(|_| Err(StorageError::Unavailable("connection refused".into())));
        backend
            .expect_set()
            .returning(|_, _, _| Err(StorageError::Unavailable("connection refused".into())));
        backend
            .expect_delete()
            .returning(|_| Err(StorageError::Unavailable("connection refused".into())));
        backend
            .expect_clear_by_prefix()
            .returning(|_| Err(StorageError::Unavailable("connection refused".into())));

        let cache = ResultCache::new(Arc::new(backend), Some(Duration::from_secs(1)));
        assert!(cache.get::<Payload>("k").await.is_none());
        assert!(!cache.set("k", &Payload { segments: 1 }, None).await);
        assert!(!cache.delete("k").await);
        assert_eq!(cache.clear_by_prefix("seg:").await, 0);
    }

    #[tokio::test]
    async fn test_default_ttl_is_applied() {
        let mut backend = MockCacheBackend::new();
        backend
            .expect_set()
            .withf(|key, _, ttl| key == "k" && *ttl == Some(Duration::from_secs(42)))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let cache = ResultCache::new(Arc::new(backend), Some(Duration::from_secs(42)));
        assert!(cache.set("k", &1u8, None).await);
    }
}
