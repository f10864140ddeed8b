//! Runtime configuration

use crate::cache::ObjectCacheConfig;
use crate::error::{Error, Result};
use crate::pdf::ParseOptions;
use crate::source::ScanOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the processing service.
///
/// Every field has a default, so a JSON file only needs the values it
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-document object cache limits
    pub object_cache: ObjectCacheConfig,
    /// Parser behaviour
    pub parse: ParseOptions,
    /// Directory scan limits
    pub scan: ScanOptions,
    /// Lifetime of a cached directory listing in seconds (default: 300)
    pub directory_cache_ttl_secs: u64,
    /// Documents whose object caches are kept at once (default: 16)
    pub max_cached_documents: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            object_cache: ObjectCacheConfig::default(),
            parse: ParseOptions::default(),
            scan: ScanOptions::default(),
            directory_cache_ttl_secs: 5 * 60,
            max_cached_documents: 16,
        }
    }
}

impl Config {
    /// Load from a JSON file and validate
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn directory_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.directory_cache_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(Error::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.object_cache.max_size_bytes == 0 {
            return invalid("object_cache.max_size_bytes must be greater than 0");
        }
        if self.object_cache.max_objects == 0 {
            return invalid("object_cache.max_objects must be greater than 0");
        }
        if self.object_cache.enable_ttl && self.object_cache.maintenance_interval_ms == 0 {
            return invalid("object_cache.maintenance_interval_ms must be greater than 0");
        }
        if self.max_cached_documents == 0 {
            return invalid("max_cached_documents must be greater than 0");
        }
        if self.scan.max_files == Some(0) {
            return invalid("scan.max_files must be greater than 0");
        }
        Ok(())
    }
}
