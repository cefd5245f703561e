// Query Result Cache Service
//
// Cache collaborator interface, an in-process LRU + TTL backend, and the
// fingerprint that keys select results.

use crate::error::DataError;
use crate::models::{FetchShape, Filter, QueryRequest};
use crate::services::query_builder::{Params, Statement};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Key-value store the facade caches select results in
///
/// Errors are reported as `DataError::CacheUnavailable`; the facade treats
/// them as a miss.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DataError>;

    /// Store a value; `false` means the backend declined it
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, DataError>;
}

/// Everything that distinguishes one cached select from another
#[derive(Serialize)]
struct FingerprintSource<'a> {
    sql: &'a str,
    params: &'a Params,
    raw_filters: Vec<&'a str>,
    fetch_shape: FetchShape,
    single_row: bool,
}

/// Generate the cache key for a rendered select
///
/// SHA-256 over a canonical JSON encoding of the SQL text, the bound values
/// (sorted by bind name), the raw filter fragments and the result shape.
pub fn generate_key(statement: &Statement, request: &QueryRequest) -> Result<String, DataError> {
    let source = FingerprintSource {
        sql: &statement.sql,
        params: &statement.params,
        raw_filters: request
            .filters
            .iter()
            .filter_map(|filter| match filter {
                Filter::Raw(predicate) => Some(predicate.as_str()),
                Filter::Equals { .. } => None,
            })
            .collect(),
        fetch_shape: request.effective_shape(),
        single_row: request.returns_single_row(),
    };
    let canonical = serde_json::to_vec(&source)?;
    Ok(format!("query:{}", hex::encode(Sha256::digest(&canonical))))
}

/// Cached value with metadata
#[derive(Debug, Clone)]
struct CachedValue {
    value: Vec<u8>,
    /// Time when cached
    cached_at: Instant,
    /// Time-to-live duration
    ttl: Duration,
    /// Number of times this cache entry was hit
    hit_count: u64,
}

impl CachedValue {
    /// Check if cache entry is expired
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// LRU cache entry for tracking access order
#[derive(Debug, Clone)]
struct LruEntry {
    key: String,
    last_accessed: Instant,
}

/// In-process cache with LRU eviction and per-entry TTL
pub struct MemoryCache {
    cache: Arc<Mutex<HashMap<String, CachedValue>>>,
    /// LRU tracking (ordered by last access time)
    lru_list: Arc<Mutex<Vec<LruEntry>>>,
    max_size: usize,
    default_ttl: Duration,
    stats: Arc<Mutex<CacheStats>>,
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryCache {
    /// Create a new cache
    ///
    /// # Arguments
    ///
    /// * `max_size` - Maximum number of cached entries
    /// * `default_ttl_secs` - TTL used when a caller passes a zero TTL
    pub fn new(max_size: usize, default_ttl_secs: u64) -> Self {
        Self {
            cache: Arc::new(Mutex::new(HashMap::new())),
            lru_list: Arc::new(Mutex::new(Vec::new())),
            max_size: max_size.max(1),
            default_ttl: Duration::from_secs(default_ttl_secs),
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    /// Get a cached value if present and not expired
    pub fn get_value(&self, key: &str) -> Option<Vec<u8>> {
        let mut cache = lock(&self.cache);
        let mut stats = lock(&self.stats);

        if let Some(cached) = cache.get_mut(key) {
            if cached.is_expired() {
                // Expired - remove and count as miss
                cache.remove(key);
                stats.misses += 1;
                stats.expirations += 1;

                lock(&self.lru_list).retain(|entry| entry.key != key);

                tracing::debug!("Cache expired for key: {}", key);
                return None;
            }

            cached.hit_count += 1;
            stats.hits += 1;

            let mut lru = lock(&self.lru_list);
            if let Some(entry) = lru.iter_mut().find(|e| e.key == key) {
                entry.last_accessed = Instant::now();
            }

            tracing::debug!("Cache hit for key: {} (hit_count: {})", key, cached.hit_count);
            return Some(cached.value.clone());
        }

        stats.misses += 1;
        tracing::debug!("Cache miss for key: {}", key);
        None
    }

    /// Store a value, replacing any previous value under the same key
    pub fn put_value(&self, key: String, value: Vec<u8>, ttl: Option<Duration>) {
        let mut cache = lock(&self.cache);
        let mut lru = lock(&self.lru_list);

        if cache.len() >= self.max_size && !cache.contains_key(&key) {
            self.evict_lru(&mut cache, &mut lru);
        }

        let cached = CachedValue {
            value,
            cached_at: Instant::now(),
            ttl: ttl.filter(|t| !t.is_zero()).unwrap_or(self.default_ttl),
            hit_count: 0,
        };
        cache.insert(key.clone(), cached);

        lru.retain(|entry| entry.key != key);
        lru.push(LruEntry {
            key: key.clone(),
            last_accessed: Instant::now(),
        });

        tracing::debug!("Cached value for key: {} (cache size: {})", key, cache.len());
    }

    /// Evict least recently used entry
    fn evict_lru(&self, cache: &mut HashMap<String, CachedValue>, lru: &mut Vec<LruEntry>) {
        if lru.is_empty() {
            return;
        }

        // Sort by last accessed time (oldest first)
        lru.sort_by_key(|entry| entry.last_accessed);

        let oldest = lru.remove(0);
        cache.remove(&oldest.key);
        lock(&self.stats).evictions += 1;

        tracing::debug!("Evicted cache entry: {}", oldest.key);
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        let mut cache = lock(&self.cache);
        let mut lru = lock(&self.lru_list);

        let count = cache.len();
        cache.clear();
        lru.clear();

        tracing::info!("Cleared {} cache entries", count);
    }

    pub fn get_stats(&self) -> CacheStats {
        lock(&self.stats).clone()
    }

    pub fn size(&self) -> usize {
        lock(&self.cache).len()
    }

    /// Remove expired entries
    pub fn cleanup_expired(&self) {
        let mut cache = lock(&self.cache);
        let mut lru = lock(&self.lru_list);
        let mut stats = lock(&self.stats);

        let expired_keys: Vec<String> = cache
            .iter()
            .filter(|(_, cached)| cached.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            cache.remove(key);
            lru.retain(|entry| &entry.key != key);
            stats.expirations += 1;
        }

        if !expired_keys.is_empty() {
            tracing::info!("Cleaned up {} expired cache entries", expired_keys.len());
        }
    }
}

impl Default for MemoryCache {
    /// 1000 entries, 5 minute TTL
    fn default() -> Self {
        Self::new(1000, 300)
    }
}

#[async_trait::async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DataError> {
        Ok(self.get_value(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, DataError> {
        self.put_value(key.to_string(), value, Some(ttl));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::query_builder::QueryBuilder;

    fn key_for(request: &QueryRequest) -> String {
        let statement = QueryBuilder::select(request).unwrap();
        generate_key(&statement, request).unwrap()
    }

    #[test]
    fn test_cache_key_generation() {
        let request = QueryRequest::new("Users", "*").where_eq("uid", 110);
        let key1 = key_for(&request);
        let key2 = key_for(&request.clone());

        assert_eq!(key1, key2);
        assert!(key1.starts_with("query:"));
        assert_eq!(key1.len(), "query:".len() + 64);
    }

    #[test]
    fn test_cache_key_differs_by_filter_value() {
        let first = QueryRequest::new("Users", "*").where_eq("uid", 110);
        let second = QueryRequest::new("Users", "*").where_eq("uid", 396);

        // Same rendered SQL, different bound values
        assert_eq!(
            QueryBuilder::select(&first).unwrap().sql,
            QueryBuilder::select(&second).unwrap().sql
        );
        assert_ne!(key_for(&first), key_for(&second));
    }

    #[test]
    fn test_cache_key_differs_by_shape() {
        let rows = QueryRequest::new("Users", "first_name").where_eq("uid", 1);
        let single = rows.clone().single();
        let numeric = rows.clone().fetch_shape(FetchShape::Num);

        assert_ne!(key_for(&rows), key_for(&single));
        assert_ne!(key_for(&rows), key_for(&numeric));
    }

    #[test]
    fn test_cache_key_follows_sql_text() {
        let first = QueryRequest::new("Users", "*")
            .where_eq("a", 1)
            .where_eq("b", 2);

        // Swapping named filters changes the SQL text, hence the key
        let swapped = QueryRequest::new("Users", "*")
            .where_eq("b", 2)
            .where_eq("a", 1);
        assert_ne!(key_for(&first), key_for(&swapped));
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = MemoryCache::new(10, 60);

        cache.put_value("test_key".to_string(), b"rows".to_vec(), None);

        assert_eq!(cache.get_value("test_key"), Some(b"rows".to_vec()));
        assert!(cache.get_value("nonexistent").is_none());
    }

    #[test]
    fn test_cache_expiration() {
        let cache = MemoryCache::new(10, 1);
        cache.put_value(
            "test_key".to_string(),
            b"rows".to_vec(),
            Some(Duration::from_millis(100)),
        );

        // Should exist immediately
        assert!(cache.get_value("test_key").is_some());

        std::thread::sleep(Duration::from_millis(150));

        assert!(cache.get_value("test_key").is_none());
        assert_eq!(cache.get_stats().expirations, 1);
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryCache::new(10, 60);
        cache.put_value("test_key".to_string(), b"rows".to_vec(), None);

        cache.get_value("test_key"); // hit
        cache.get_value("test_key"); // hit
        cache.get_value("nonexistent"); // miss

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!(stats.hit_ratio() > 0.6);
    }

    #[test]
    fn test_cache_clear_and_cleanup() {
        let cache = MemoryCache::new(10, 60);
        cache.put_value("key1".to_string(), vec![1], None);
        cache.put_value("key2".to_string(), vec![2], Some(Duration::from_millis(10)));
        assert_eq!(cache.size(), 2);

        std::thread::sleep(Duration::from_millis(30));
        cache.cleanup_expired();
        assert_eq!(cache.size(), 1);

        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = MemoryCache::new(3, 60);

        cache.put_value("key1".to_string(), vec![1], None);
        std::thread::sleep(Duration::from_millis(10));
        cache.put_value("key2".to_string(), vec![2], None);
        std::thread::sleep(Duration::from_millis(10));
        cache.put_value("key3".to_string(), vec![3], None);

        // Touch key1 so key2 becomes the oldest
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get_value("key1").is_some());

        std::thread::sleep(Duration::from_millis(10));
        cache.put_value("key4".to_string(), vec![4], None);

        assert_eq!(cache.size(), 3);
        assert!(cache.get_value("key2").is_none());
        assert!(cache.get_value("key1").is_some());
        assert!(cache.get_value("key3").is_some());
        assert!(cache.get_value("key4").is_some());
        assert_eq!(cache.get_stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = MemoryCache::new(2, 60);
        cache.put_value("key1".to_string(), vec![1], None);
        cache.put_value("key2".to_string(), vec![2], None);
        cache.put_value("key1".to_string(), vec![9], None);

        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get_value("key1"), Some(vec![9]));
        assert_eq!(cache.get_stats().evictions, 0);
    }

    #[tokio::test]
    async fn test_backend_trait_roundtrip() {
        let cache = MemoryCache::default();
        assert!(cache.set("k", vec![7], Duration::from_secs(5)).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(vec![7]));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }
}
