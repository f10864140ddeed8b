//! In-memory caching of parsed PDF objects
//!
//! The cache enforces a byte budget and an object count limit at the same
//! time and evicts least-recently-used entries to stay within both.

pub mod content;
pub mod object_cache;

pub use content::{estimate_object_size, ImageGeometry, ObjectContent, ObjectType};
pub use object_cache::{
    AccessFrequency, CacheMetrics, CacheStats, CachedObject, MemoryUsage, ObjectCache,
    ObjectCacheConfig, ObjectKey,
};
