//! Directory listing cache with TTL expiry and in-progress tracking

use super::scanner::PdfFileInfo;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default listing lifetime
pub const DEFAULT_DIRECTORY_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Default)]
struct DirectoryCacheEntry {
    files: Vec<PdfFileInfo>,
    truncated: bool,
    last_refresh: Option<Instant>,
    scanning: bool,
}

/// A fresh listing served from the cache
#[derive(Debug, Clone)]
pub struct CachedListing {
    pub files: Vec<PdfFileInfo>,
    pub truncated: bool,
    pub age: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectoryCacheStats {
    pub total_entries: usize,
    /// Entries still within the TTL
    pub valid_entries: usize,
    pub ttl_ms: u64,
}

/// Cache of directory listings keyed by path
pub struct DirectoryCache {
    entries: RwLock<HashMap<PathBuf, DirectoryCacheEntry>>,
    ttl: Duration,
}

impl Default for DirectoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTORY_TTL)
    }
}

impl DirectoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &DirectoryCacheEntry, now: Instant) -> bool {
        entry
            .last_refresh
            .is_some_and(|t| now.saturating_duration_since(t) <= self.ttl)
    }

    /// Listing for `path` if one was stored within the TTL
    pub fn get(&self, path: &Path) -> Option<CachedListing> {
        let now = Instant::now();
        let entries = self.entries.read();
        let entry = entries.get(path)?;
        if !self.is_fresh(entry, now) {
            return None;
        }
        let age = entry
            .last_refresh
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
        Some(CachedListing {
            files: entry.files.clone(),
            truncated: entry.truncated,
            age,
        })
    }

    /// Store a listing, stamping it with the current time
    pub fn set(&self, path: &Path, files: Vec<PdfFileInfo>, truncated: bool) {
        let mut entries = self.entries.write();
        let entry = entries.entry(path.to_path_buf()).or_default();
        entry.files = files;
        entry.truncated = truncated;
        entry.last_refresh = Some(Instant::now());
    }

    pub fn set_scanning(&self, path: &Path, scanning: bool) {
        let mut entries = self.entries.write();
        if scanning {
            entries.entry(path.to_path_buf()).or_default().scanning = true;
        } else if let Some(entry) = entries.get_mut(path) {
            entry.scanning = false;
        }
    }

    pub fn is_scanning(&self, path: &Path) -> bool {
        self.entries.read().get(path).is_some_and(|e| e.scanning)
    }

    /// Atomically mark `path` as being scanned. Returns `None` when another
    /// scan already holds it; the flag is cleared when the guard drops.
    pub fn try_begin_scan(self: &Arc<Self>, path: &Path) -> Option<ScanGuard> {
        let mut entries = self.entries.write();
        let entry = entries.entry(path.to_path_buf()).or_default();
        if entry.scanning {
            return None;
        }
        entry.scanning = true;
        Some(ScanGuard {
            cache: Arc::clone(self),
            path: path.to_path_buf(),
        })
    }

    /// Drop expired listings. Entries with a scan in flight are kept.
    pub fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.scanning || self.is_fresh(entry, now));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> DirectoryCacheStats {
        let now = Instant::now();
        let entries = self.entries.read();
        DirectoryCacheStats {
            total_entries: entries.len(),
            valid_entries: entries.values().filter(|e| self.is_fresh(e, now)).count(),
            ttl_ms: self.ttl.as_millis() as u64,
        }
    }
}

/// Clears the scanning flag of a directory on drop
pub struct ScanGuard {
    cache: Arc<DirectoryCache>,
    path: PathBuf,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.cache.set_scanning(&self.path, false);
    }
}
