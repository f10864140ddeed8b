//! Processing service
//!
//! Composes the robust parser, one object cache per recently parsed document
//! and the cached directory scanner behind a single handle.

use crate::cache::{CacheStats, ObjectCache};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pdf::{LopdfBackend, ParseResult, PdfBackend, RobustParser};
use crate::source::{CachedScanner, DirectoryCache, DirectoryCacheStats, ScanResult};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Entries removed by one maintenance sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub expired_objects: usize,
    pub expired_listings: usize,
}

pub struct ProcessingService {
    config: Config,
    parser: RobustParser,
    scanner: CachedScanner,
    directory_cache: Arc<DirectoryCache>,
    documents: Mutex<LruCache<PathBuf, Arc<ObjectCache>>>,
}

impl ProcessingService {
    /// Service backed by `lopdf`
    pub fn new(config: Config) -> Result<Self> {
        Self::with_backend(config, Arc::new(LopdfBackend))
    }

    pub fn with_backend(config: Config, backend: Arc<dyn PdfBackend>) -> Result<Self> {
        config.validate()?;

        let capacity =
            NonZeroUsize::new(config.max_cached_documents).ok_or_else(|| Error::InvalidConfig {
                reason: "max_cached_documents must be greater than 0".to_string(),
            })?;
        let directory_cache = Arc::new(DirectoryCache::new(config.directory_cache_ttl()));

        Ok(Self {
            parser: RobustParser::new(backend, config.parse.clone()),
            scanner: CachedScanner::new(directory_cache.clone(), config.scan.clone()),
            directory_cache,
            documents: Mutex::new(LruCache::new(capacity)),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parse a PDF, caching its page text and images for later runs
    pub async fn parse_file(&self, path: impl AsRef<Path>) -> Result<ParseResult> {
        let path = path.as_ref();
        let resolved = tokio::fs::canonicalize(path)
            .await
            .map_err(|_| Error::PdfNotFound {
                path: path.display().to_string(),
            })?;

        let cache = self.object_cache_for(&resolved);
        Ok(self.parser.parse_file_cached(&resolved, cache).await)
    }

    /// List PDFs under `dir`, from the listing cache when fresh
    pub async fn list_files(
        &self,
        dir: impl AsRef<Path>,
        cancel: CancellationToken,
    ) -> Result<ScanResult> {
        self.scanner.scan(dir.as_ref(), cancel).await
    }

    /// Object cache of a document, created on first use. The least recently
    /// used document's cache is dropped once `max_cached_documents` is hit.
    pub fn object_cache_for(&self, path: &Path) -> Arc<ObjectCache> {
        let mut documents = self.documents.lock();
        if let Some(cache) = documents.get(path) {
            return cache.clone();
        }

        let cache = Arc::new(ObjectCache::with_config(self.config.object_cache.clone()));
        if let Some((evicted, _)) = documents.push(path.to_path_buf(), cache.clone()) {
            if evicted != path {
                tracing::debug!(path = %evicted.display(), "dropped document object cache");
            }
        }
        cache
    }

    pub fn document_stats(&self, path: &Path) -> Option<CacheStats> {
        self.documents.lock().peek(path).map(|cache| cache.stats())
    }

    pub fn cached_documents(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn directory_cache_stats(&self) -> DirectoryCacheStats {
        self.directory_cache.stats()
    }

    /// Sweep expired objects from every document cache and stale listings
    /// from the directory cache
    pub fn maintenance(&self) -> MaintenanceReport {
        let caches: Vec<Arc<ObjectCache>> = self
            .documents
            .lock()
            .iter()
            .map(|(_, cache)| cache.clone())
            .collect();

        let report = MaintenanceReport {
            expired_objects: caches.iter().map(|cache| cache.evict_expired()).sum(),
            expired_listings: self.directory_cache.clear_expired(),
        };
        if report != MaintenanceReport::default() {
            tracing::debug!(
                expired_objects = report.expired_objects,
                expired_listings = report.expired_listings,
                "maintenance sweep"
            );
        }
        report
    }

    /// Run [`Self::maintenance`] periodically until the service is dropped.
    /// Must be called from within a Tokio runtime.
    pub fn spawn_maintenance(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self
            .config
            .object_cache
            .maintenance_interval()
            .max(std::time::Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(service) = weak.upgrade() else {
                    break;
                };
                service.maintenance();
            }
        })
    }
}
