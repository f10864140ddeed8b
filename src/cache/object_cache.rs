//! Bounded LRU cache for parsed PDF objects

use super::content::{ObjectContent, ObjectType};
use crate::error::CacheError;
use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Object identifier: object number plus generation number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectKey {
    pub id: u32,
    pub generation: u16,
}

impl ObjectKey {
    pub fn new(id: u32, generation: u16) -> Self {
        Self { id, generation }
    }
}

impl From<lopdf::ObjectId> for ObjectKey {
    fn from((id, generation): lopdf::ObjectId) -> Self {
        Self { id, generation }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.id, self.generation)
    }
}

/// A cached PDF object with access metadata
#[derive(Debug, Clone)]
pub struct CachedObject {
    pub key: ObjectKey,
    pub content: ObjectContent,
    pub size: u64,
    pub object_type: ObjectType,
    pub created_at: Instant,
    pub last_access: Instant,
    pub access_count: u64,
}

/// Object cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectCacheConfig {
    /// Byte budget across all cached objects (default: 50MB)
    pub max_size_bytes: u64,
    /// Maximum number of cached objects (default: 1000)
    pub max_objects: usize,
    /// Idle time after which an object expires in TTL mode (default: 30 min)
    pub ttl_ms: u64,
    /// Enable TTL expiry (default: false)
    pub enable_ttl: bool,
    /// Track hits, misses and evictions (default: true)
    pub enable_stats: bool,
    /// Period of the background expiry task (default: 1 min)
    pub maintenance_interval_ms: u64,
}

impl Default for ObjectCacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 50 * 1024 * 1024, // 50MB
            max_objects: 1000,
            ttl_ms: 30 * 60 * 1000,
            enable_ttl: false,
            enable_stats: true,
            maintenance_interval_ms: 60 * 1000,
        }
    }
}

impl ObjectCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }
}

/// Cache performance statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub object_count: usize,
    pub total_size: u64,
    /// Percentage of lookups that hit
    pub hit_rate: f64,
    pub avg_object_size: u64,
    /// Percentage of the byte budget in use
    pub memory_efficiency: f64,
}

/// Objects bucketed by how often they were touched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessFrequency {
    /// More than 10 accesses
    pub high: usize,
    /// 4 to 10 accesses
    pub medium: usize,
    /// 1 to 3 accesses
    pub low: usize,
}

/// Estimated memory footprint of the cache
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub object_bytes: u64,
    pub metadata_bytes: u64,
    pub overhead_bytes: u64,
    /// Share of the footprint spent on object payloads, as a percentage
    pub utilization_rate: f64,
}

/// Detailed cache metrics broken down by object type and access frequency
#[derive(Debug, Clone, Serialize)]
pub struct CacheMetrics {
    pub stats: CacheStats,
    pub object_types: BTreeMap<ObjectType, usize>,
    pub size_by_type: BTreeMap<ObjectType, u64>,
    pub access_frequency: AccessFrequency,
    pub memory: MemoryUsage,
}

// Rough per-entry bookkeeping estimates used by `detailed_metrics`
const METADATA_BYTES_PER_OBJECT: u64 = 200;
const LINK_BYTES_PER_OBJECT: u64 = 50;

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

struct CacheInner {
    lru: LruCache<ObjectKey, CachedObject>,
    total_size: u64,
    counters: Counters,
}

impl CacheInner {
    fn evict_lru(&mut self, track_stats: bool) -> Option<ObjectKey> {
        let (key, evicted) = self.lru.pop_lru()?;
        self.total_size = self.total_size.saturating_sub(evicted.size);
        if track_stats {
            self.counters.evictions += 1;
        }
        tracing::debug!(key = %key, size = evicted.size, "evicted cached object");
        Some(key)
    }

    /// Evict LRU entries until a new object of `needed` bytes fits within
    /// both the byte budget and the count limit.
    ///
    /// Fails with [`CacheError::EvictionExhausted`] once nothing is left to
    /// evict. `put` rejects objects larger than the whole budget before
    /// calling this, so callers going through `put` see `ObjectTooLarge`
    /// instead.
    fn ensure_space(&mut self, needed: u64, config: &ObjectCacheConfig) -> Result<(), CacheError> {
        while self.total_size + needed > config.max_size_bytes
            || self.lru.len() >= config.max_objects
        {
            if self.evict_lru(config.enable_stats).is_none() {
                return Err(CacheError::EvictionExhausted {
                    needed,
                    available: config.max_size_bytes.saturating_sub(self.total_size),
                });
            }
        }
        Ok(())
    }
}

/// Thread-safe object cache with byte and count limits and LRU eviction.
///
/// Every read that hits moves the entry to the most-recently-used position.
/// `contains` and `peek` never do.
pub struct ObjectCache {
    inner: RwLock<CacheInner>,
    config: ObjectCacheConfig,
}

impl ObjectCache {
    /// Create a cache with the given byte budget and object limit, other
    /// settings at their defaults
    pub fn new(max_size_bytes: u64, max_objects: usize) -> Self {
        Self::with_config(ObjectCacheConfig {
            max_size_bytes,
            max_objects,
            ..ObjectCacheConfig::default()
        })
    }

    pub fn with_config(config: ObjectCacheConfig) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                lru: LruCache::unbounded(),
                total_size: 0,
                counters: Counters::default(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &ObjectCacheConfig {
        &self.config
    }

    /// Insert or update an object.
    ///
    /// Updating an existing key replaces its content in place and promotes it.
    /// Inserting a new key first evicts LRU entries until it fits. Objects
    /// larger than the whole byte budget are rejected without evicting anything.
    pub fn put(
        &self,
        key: impl Into<ObjectKey>,
        content: impl Into<ObjectContent>,
    ) -> Result<(), CacheError> {
        let key = key.into();
        let content = content.into();
        let size = content.estimated_size();

        if self.config.max_objects == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        if size > self.config.max_size_bytes {
            return Err(CacheError::ObjectTooLarge {
                size,
                max_size: self.config.max_size_bytes,
            });
        }

        let now = Instant::now();
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if let Some(existing) = inner.lru.get_mut(&key) {
            let old_size = existing.size;
            existing.object_type = content.object_type();
            existing.content = content;
            existing.size = size;
            existing.last_access = now;
            existing.access_count += 1;
            inner.total_size = inner.total_size - old_size + size;

            // A grown entry is now MRU, so only other entries are evicted
            while inner.total_size > self.config.max_size_bytes {
                if inner.evict_lru(self.config.enable_stats).is_none() {
                    break;
                }
            }
            return Ok(());
        }

        inner.ensure_space(size, &self.config)?;

        let object_type = content.object_type();
        inner.lru.put(
            key,
            CachedObject {
                key,
                content,
                size,
                object_type,
                created_at: now,
                last_access: now,
                access_count: 1,
            },
        );
        inner.total_size += size;
        Ok(())
    }

    /// Look up an object, promoting it to most-recently-used on a hit
    pub fn get(&self, key: impl Into<ObjectKey>) -> Option<ObjectContent> {
        let key = key.into();
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        match inner.lru.get_mut(&key) {
            Some(obj) => {
                obj.last_access = Instant::now();
                obj.access_count += 1;
                let content = obj.content.clone();
                if self.config.enable_stats {
                    inner.counters.hits += 1;
                }
                Some(content)
            }
            None => {
                if self.config.enable_stats {
                    inner.counters.misses += 1;
                }
                None
            }
        }
    }

    /// Look up an object without touching recency or statistics
    pub fn peek(&self, key: impl Into<ObjectKey>) -> Option<ObjectContent> {
        self.inner
            .read()
            .lru
            .peek(&key.into())
            .map(|obj| obj.content.clone())
    }

    /// Check if a key exists without touching recency or statistics
    pub fn contains(&self, key: impl Into<ObjectKey>) -> bool {
        self.inner.read().lru.contains(&key.into())
    }

    /// Remove an entry from the cache
    pub fn remove(&self, key: impl Into<ObjectKey>) -> bool {
        let mut inner = self.inner.write();
        match inner.lru.pop(&key.into()) {
            Some(obj) => {
                inner.total_size = inner.total_size.saturating_sub(obj.size);
                true
            }
            None => false,
        }
    }

    /// Remove every entry and reset statistics
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.lru.clear();
        inner.total_size = 0;
        inner.counters = Counters::default();
    }

    pub fn len(&self) -> usize {
        self.inner.read().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().lru.is_empty()
    }

    /// Total estimated bytes currently stored
    pub fn total_size(&self) -> u64 {
        self.inner.read().total_size
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        self.stats_locked(&inner)
    }

    fn stats_locked(&self, inner: &CacheInner) -> CacheStats {
        let Counters {
            hits,
            misses,
            evictions,
        } = inner.counters;
        let object_count = inner.lru.len();
        let total_size = inner.total_size;

        let lookups = hits + misses;
        let hit_rate = if lookups > 0 {
            hits as f64 / lookups as f64 * 100.0
        } else {
            0.0
        };
        let avg_object_size = if object_count > 0 {
            total_size / object_count as u64
        } else {
            0
        };
        let memory_efficiency = if self.config.max_size_bytes > 0 {
            total_size as f64 / self.config.max_size_bytes as f64 * 100.0
        } else {
            0.0
        };

        CacheStats {
            hits,
            misses,
            evictions,
            object_count,
            total_size,
            hit_rate,
            avg_object_size,
            memory_efficiency,
        }
    }

    /// Keys ordered from most to least recently used
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.inner.read().lru.iter().map(|(key, _)| *key).collect()
    }

    /// Snapshot of every cached object, most recently used first
    pub fn list_objects(&self) -> Vec<CachedObject> {
        self.inner
            .read()
            .lru
            .iter()
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    /// The `limit` most frequently accessed objects (all of them if `limit` is 0)
    pub fn most_accessed(&self, limit: usize) -> Vec<CachedObject> {
        let mut objects = self.list_objects();
        objects.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        if limit > 0 {
            objects.truncate(limit);
        }
        objects
    }

    /// Remove objects idle for longer than the TTL. Returns 0 when TTL mode
    /// is disabled.
    pub fn evict_expired(&self) -> usize {
        if !self.config.enable_ttl {
            return 0;
        }

        let ttl = self.config.ttl();
        let now = Instant::now();
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let expired: Vec<ObjectKey> = inner
            .lru
            .iter()
            .filter(|(_, obj)| now.duration_since(obj.last_access) > ttl)
            .map(|(key, _)| *key)
            .collect();

        for key in &expired {
            if let Some(obj) = inner.lru.pop(key) {
                inner.total_size = inner.total_size.saturating_sub(obj.size);
                if self.config.enable_stats {
                    inner.counters.evictions += 1;
                }
            }
        }

        expired.len()
    }

    /// Statistics plus per-type, access-frequency and memory breakdowns
    pub fn detailed_metrics(&self) -> CacheMetrics {
        let inner = self.inner.read();

        let mut object_types = BTreeMap::new();
        let mut size_by_type = BTreeMap::new();
        let mut access_frequency = AccessFrequency::default();

        for (_, obj) in inner.lru.iter() {
            *object_types.entry(obj.object_type).or_insert(0) += 1;
            *size_by_type.entry(obj.object_type).or_insert(0) += obj.size;

            match obj.access_count {
                n if n > 10 => access_frequency.high += 1,
                n if n > 3 => access_frequency.medium += 1,
                _ => access_frequency.low += 1,
            }
        }

        let count = inner.lru.len() as u64;
        let object_bytes = inner.total_size;
        let metadata_bytes = count * METADATA_BYTES_PER_OBJECT;
        let overhead_bytes = count * LINK_BYTES_PER_OBJECT;
        let total_bytes = object_bytes + metadata_bytes + overhead_bytes;
        let utilization_rate = if total_bytes > 0 {
            object_bytes as f64 / total_bytes as f64 * 100.0
        } else {
            0.0
        };

        CacheMetrics {
            stats: self.stats_locked(&inner),
            object_types,
            size_by_type,
            access_frequency,
            memory: MemoryUsage {
                total_bytes,
                object_bytes,
                metadata_bytes,
                overhead_bytes,
                utilization_rate,
            },
        }
    }

    /// Start the periodic expiry task when TTL mode is enabled.
    ///
    /// The task holds only a weak reference and exits once the cache is
    /// dropped. Must be called from within a Tokio runtime.
    pub fn spawn_maintenance(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.enable_ttl {
            return None;
        }

        let weak = Arc::downgrade(self);
        let period = self
            .config
            .maintenance_interval()
            .max(Duration::from_millis(1));

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let evicted = cache.evict_expired();
                if evicted > 0 {
                    tracing::debug!(evicted, "expired cached objects");
                }
            }
        }))
    }
}
