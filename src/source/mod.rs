//! PDF discovery: bounded directory scanning behind a listing cache

pub mod cache;
pub mod scanner;

pub use cache::{CachedListing, DirectoryCache, DirectoryCacheStats, ScanGuard};
pub use scanner::{
    scan_directory, scan_directory_with_progress, PdfFileInfo, ScanOptions, ScanResult,
};

use crate::error::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Directory scanner that serves fresh listings from a [`DirectoryCache`]
/// and lets only one scan per directory run at a time
#[derive(Clone)]
pub struct CachedScanner {
    cache: Arc<DirectoryCache>,
    options: ScanOptions,
}

impl CachedScanner {
    pub fn new(cache: Arc<DirectoryCache>, options: ScanOptions) -> Self {
        Self { cache, options }
    }

    pub fn cache(&self) -> &Arc<DirectoryCache> {
        &self.cache
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// List the PDFs under `root`.
    ///
    /// A fresh cached listing is returned as-is. If another caller is
    /// already scanning the directory an empty `in_progress` result comes
    /// back immediately. Otherwise the directory is scanned on a blocking
    /// thread and, unless cancelled, the listing is cached. The directory
    /// stays claimed until that thread finishes, even if this future is
    /// dropped first.
    pub async fn scan(&self, root: &Path, cancel: CancellationToken) -> Result<ScanResult> {
        let key = tokio::fs::canonicalize(root).await?;

        if let Some(listing) = self.cache.get(&key) {
            tracing::debug!(dir = %key.display(), "directory listing served from cache");
            return Ok(ScanResult {
                files: listing.files,
                from_cache: true,
                cache_age_ms: Some(listing.age.as_millis() as u64),
                truncated: listing.truncated,
                ..ScanResult::default()
            });
        }

        let Some(guard) = self.cache.try_begin_scan(&key) else {
            tracing::debug!(dir = %key.display(), "directory scan already in progress");
            return Ok(ScanResult {
                in_progress: true,
                ..ScanResult::default()
            });
        };

        // Claim and cache write belong to the job, not to this future
        let options = self.options.clone();
        let cache = self.cache.clone();
        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let result = scan_directory(&key, &options, &cancel)?;
            if !result.cancelled {
                cache.set(&key, result.files.clone(), result.truncated);
            }
            Ok::<_, Error>(result)
        })
        .await
        .map_err(|e| Error::TaskJoin {
            reason: e.to_string(),
        })??;

        Ok(result)
    }
}
