//! Bounded, cycle-safe directory scanning for PDF files

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Limits and filters for a directory scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Deepest directory level read, root being 0 (default: 5, `None` = unlimited)
    pub max_depth: Option<usize>,
    /// Stop after this many files (default: 100, `None` = unlimited)
    pub max_files: Option<usize>,
    /// Stop after this much wall-clock time (default: 3s, `None` = unlimited)
    pub max_elapsed_ms: Option<u64>,
    /// Skip entries whose name starts with `.` (default: true)
    pub skip_hidden: bool,
    /// Follow symbolic links (default: false)
    pub follow_symlinks: bool,
    /// Filename glob, e.g. `report*.pdf`
    pub pattern: Option<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_depth: Some(5),
            max_files: Some(100),
            max_elapsed_ms: Some(3000),
            skip_hidden: true,
            follow_symlinks: false,
            pattern: None,
        }
    }
}

impl ScanOptions {
    /// No depth, count or time limits
    pub fn unbounded() -> Self {
        Self {
            max_depth: None,
            max_files: None,
            max_elapsed_ms: None,
            ..Self::default()
        }
    }

    fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfFileInfo {
    /// Full path to the PDF file
    pub path: String,
    /// Filename only
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// Last modified time (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

impl PdfFileInfo {
    fn from_metadata(path: &Path, name: String, metadata: &fs::Metadata) -> Self {
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .and_then(|d| chrono::DateTime::from_timestamp(d.as_secs() as i64, 0))
            .map(|dt| dt.to_rfc3339());

        Self {
            path: path.to_string_lossy().to_string(),
            name,
            size: metadata.len(),
            modified,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub files: Vec<PdfFileInfo>,
    /// Served from the directory cache
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age_ms: Option<u64>,
    /// A file-count or time limit stopped the scan. Set as soon as the file
    /// cap is reached, even when no further PDF exists, and once the time
    /// budget is used up.
    pub truncated: bool,
    pub cancelled: bool,
    /// Another scan of this directory is running; `files` is empty
    pub in_progress: bool,
    /// Directory entries examined, including skipped ones
    pub files_scanned: usize,
    pub scan_time_ms: u64,
}

fn is_pdf_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

struct Walk<'a> {
    options: &'a ScanOptions,
    pattern: Option<glob::Pattern>,
    cancel: &'a CancellationToken,
    started: Instant,
    visited: HashSet<PathBuf>,
    files: Vec<PdfFileInfo>,
    files_scanned: usize,
    truncated: bool,
    cancelled: bool,
    on_file: &'a mut dyn FnMut(&PdfFileInfo),
}

impl Walk<'_> {
    fn stopped(&self) -> bool {
        self.truncated || self.cancelled
    }

    /// Check cancellation, file cap and time budget. Returns false once the
    /// walk must stop.
    fn within_limits(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            self.cancelled = true;
        }
        if let Some(max) = self.options.max_files {
            if self.files.len() >= max {
                self.truncated = true;
            }
        }
        if let Some(limit) = self.options.max_elapsed() {
            if self.started.elapsed() >= limit {
                tracing::debug!(elapsed_ms = limit.as_millis() as u64, "scan time limit reached");
                self.truncated = true;
            }
        }
        !self.stopped()
    }

    fn visit_dir(&mut self, dir: &Path, depth: usize) {
        if !self.within_limits() {
            return;
        }
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return;
        }

        let real_path = match fs::canonicalize(dir) {
            Ok(p) => p,
            Err(_) => return,
        };
        if !self.visited.insert(real_path) {
            tracing::debug!(dir = %dir.display(), "directory already visited, skipping");
            return;
        }

        let mut entries: Vec<fs::DirEntry> = match fs::read_dir(dir) {
            Ok(iter) => iter.filter_map(|e| e.ok()).collect(),
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "unreadable directory skipped");
                return;
            }
        };
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            if !self.within_limits() {
                return;
            }
            self.files_scanned += 1;

            let name = entry.file_name().to_string_lossy().to_string();
            if self.options.skip_hidden && name.starts_with('.') {
                continue;
            }

            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            let metadata = if file_type.is_symlink() {
                if !self.options.follow_symlinks {
                    continue;
                }
                // Dangling links are skipped
                match fs::metadata(&path) {
                    Ok(m) => m,
                    Err(_) => continue,
                }
            } else {
                match entry.metadata() {
                    Ok(m) => m,
                    Err(_) => continue,
                }
            };

            if metadata.is_dir() {
                self.visit_dir(&path, depth + 1);
                if self.stopped() {
                    return;
                }
            } else if metadata.is_file() && is_pdf_file(&name) {
                if let Some(pattern) = &self.pattern {
                    if !pattern.matches(&name) {
                        continue;
                    }
                }
                let info = PdfFileInfo::from_metadata(&path, name, &metadata);
                (self.on_file)(&info);
                self.files.push(info);

                if self.options.max_files.is_some_and(|max| self.files.len() >= max) {
                    tracing::debug!(max_files = self.files.len(), "scan file limit reached");
                    self.truncated = true;
                    return;
                }
            }
        }
    }
}

/// Scan `root` depth-first for PDF files within the limits of `options`.
///
/// Blocking; run it on a blocking thread from async code. Cancellation is
/// honoured at directory and entry boundaries and yields partial results.
pub fn scan_directory(
    root: &Path,
    options: &ScanOptions,
    cancel: &CancellationToken,
) -> Result<ScanResult> {
    scan_directory_with_progress(root, options, cancel, &mut |_| {})
}

/// [`scan_directory`] that reports each PDF to `on_file` as it is found
pub fn scan_directory_with_progress(
    root: &Path,
    options: &ScanOptions,
    cancel: &CancellationToken,
    on_file: &mut dyn FnMut(&PdfFileInfo),
) -> Result<ScanResult> {
    let metadata = fs::metadata(root)?;
    if !metadata.is_dir() {
        return Err(Error::NotADirectory {
            path: root.display().to_string(),
        });
    }

    let pattern = options
        .pattern
        .as_deref()
        .map(glob::Pattern::new)
        .transpose()
        .map_err(|e| Error::InvalidConfig {
            reason: format!("invalid filename pattern: {}", e),
        })?;

    let mut walk = Walk {
        options,
        pattern,
        cancel,
        started: Instant::now(),
        visited: HashSet::new(),
        files: Vec::new(),
        files_scanned: 0,
        truncated: false,
        cancelled: false,
        on_file,
    };
    walk.visit_dir(root, 0);

    let scan_time_ms = walk.started.elapsed().as_millis() as u64;
    tracing::debug!(
        root = %root.display(),
        files = walk.files.len(),
        files_scanned = walk.files_scanned,
        truncated = walk.truncated,
        cancelled = walk.cancelled,
        "directory scan finished"
    );

    Ok(ScanResult {
        files: walk.files,
        from_cache: false,
        cache_age_ms: None,
        truncated: walk.truncated,
        cancelled: walk.cancelled,
        in_progress: false,
        files_scanned: walk.files_scanned,
        scan_time_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"%PDF-1.4\n").unwrap();
    }

    fn names(result: &ScanResult) -> Vec<&str> {
        result.files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_finds_only_pdfs_case_insensitively() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.pdf"));
        touch(&dir.path().join("B.PDF"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("pdf"));

        let result =
            scan_directory(dir.path(), &ScanOptions::default(), &CancellationToken::new()).unwrap();
        assert_eq!(names(&result), vec!["B.PDF", "a.pdf"]);
        assert_eq!(result.files_scanned, 4);
        assert!(!result.truncated);
        assert!(result.files[0].modified.is_some());
        assert_eq!(result.files[0].size, 9);
    }

    #[test]
    fn test_max_depth_excludes_deep_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("sub/sub2/file.pdf"));
        touch(&dir.path().join("sub/shallow.pdf"));

        let options = ScanOptions {
            max_depth: Some(1),
            ..ScanOptions::default()
        };
        let result = scan_directory(dir.path(), &options, &CancellationToken::new()).unwrap();
        assert_eq!(names(&result), vec!["shallow.pdf"]);

        let options = ScanOptions {
            max_depth: Some(0),
            ..ScanOptions::default()
        };
        let result = scan_directory(dir.path(), &options, &CancellationToken::new()).unwrap();
        assert!(result.files.is_empty());
    }

    #[test]
    fn test_truncation_at_exactly_n() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            touch(&dir.path().join(format!("doc{:02}.pdf", i)));
        }

        let options = ScanOptions {
            max_files: Some(4),
            ..ScanOptions::default()
        };
        let result = scan_directory(dir.path(), &options, &CancellationToken::new()).unwrap();
        assert_eq!(result.files.len(), 4);
        assert!(result.truncated);
        assert_eq!(result.files[3].name, "doc03.pdf");
    }

    #[test]
    fn test_hidden_entries_skipped() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join(".hidden.pdf"));
        touch(&dir.path().join(".cache/inner.pdf"));
        touch(&dir.path().join("visible.pdf"));

        let result =
            scan_directory(dir.path(), &ScanOptions::default(), &CancellationToken::new()).unwrap();
        assert_eq!(names(&result), vec!["visible.pdf"]);

        let options = ScanOptions {
            skip_hidden: false,
            ..ScanOptions::default()
        };
        let result = scan_directory(dir.path(), &options, &CancellationToken::new()).unwrap();
        assert_eq!(result.files.len(), 3);
    }

    #[test]
    fn test_glob_pattern_filter() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("report-2024.pdf"));
        touch(&dir.path().join("invoice.pdf"));

        let options = ScanOptions {
            pattern: Some("report*.pdf".to_string()),
            ..ScanOptions::default()
        };
        let result = scan_directory(dir.path(), &options, &CancellationToken::new()).unwrap();
        assert_eq!(names(&result), vec!["report-2024.pdf"]);

        let options = ScanOptions {
            pattern: Some("[".to_string()),
            ..ScanOptions::default()
        };
        assert!(matches!(
            scan_directory(dir.path(), &options, &CancellationToken::new()),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_cancelled_scan_returns_partial() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.pdf"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = scan_directory(dir.path(), &ScanOptions::default(), &cancel).unwrap();
        assert!(result.cancelled);
        assert!(!result.truncated);
        assert!(result.files.is_empty());
    }

    #[test]
    fn test_cancelled_mid_scan_keeps_found_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("dirA/1.pdf"));
        touch(&dir.path().join("dirA/2.pdf"));
        touch(&dir.path().join("dirB/3.pdf"));

        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let result = scan_directory_with_progress(
            dir.path(),
            &ScanOptions::default(),
            &cancel,
            &mut |file| {
                seen.push(file.name.clone());
                cancel.cancel();
            },
        )
        .unwrap();

        assert!(result.cancelled);
        assert!(!result.truncated);
        assert_eq!(names(&result), vec!["1.pdf"]);
        assert_eq!(seen, vec!["1.pdf"]);
    }

    #[test]
    fn test_time_limit_truncates() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("dirA/1.pdf"));
        touch(&dir.path().join("dirA/2.pdf"));
        touch(&dir.path().join("dirB/3.pdf"));

        let options = ScanOptions {
            max_elapsed_ms: Some(0),
            ..ScanOptions::default()
        };
        let result = scan_directory(dir.path(), &options, &CancellationToken::new()).unwrap();
        assert!(result.truncated);
        assert!(!result.cancelled);
        assert!(result.files.is_empty());

        // Files found before the budget ran out are kept
        let options = ScanOptions {
            max_elapsed_ms: Some(200),
            ..ScanOptions::default()
        };
        let result = scan_directory_with_progress(
            dir.path(),
            &options,
            &CancellationToken::new(),
            &mut |_| std::thread::sleep(Duration::from_millis(250)),
        )
        .unwrap();
        assert!(result.truncated);
        assert_eq!(names(&result), vec!["1.pdf"]);
    }

    #[test]
    fn test_exactly_n_files_is_truncated() {
        let dir = TempDir::new().unwrap();
        for i in 0..3 {
            touch(&dir.path().join(format!("doc{}.pdf", i)));
        }

        let options = ScanOptions {
            max_files: Some(3),
            ..ScanOptions::default()
        };
        let result = scan_directory(dir.path(), &options, &CancellationToken::new()).unwrap();
        assert_eq!(result.files.len(), 3);
        assert!(result.truncated);

        let options = ScanOptions {
            max_files: Some(4),
            ..ScanOptions::default()
        };
        let result = scan_directory(dir.path(), &options, &CancellationToken::new()).unwrap();
        assert_eq!(result.files.len(), 3);
        assert!(!result.truncated);
    }

    #[test]
    fn test_not_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.pdf");
        touch(&file);

        assert!(matches!(
            scan_directory(&file, &ScanOptions::default(), &CancellationToken::new()),
            Err(Error::NotADirectory { .. })
        ));
        assert!(matches!(
            scan_directory(
                &dir.path().join("missing"),
                &ScanOptions::default(),
                &CancellationToken::new()
            ),
            Err(Error::Io(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_terminates() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("sub/doc.pdf"));
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub/loop")).unwrap();

        let options = ScanOptions {
            follow_symlinks: true,
            ..ScanOptions::unbounded()
        };
        let result = scan_directory(dir.path(), &options, &CancellationToken::new()).unwrap();
        assert_eq!(names(&result), vec!["doc.pdf"]);
        assert!(!result.truncated);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed_by_default() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        touch(&outside.path().join("elsewhere.pdf"));
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("elsewhere.pdf"),
            dir.path().join("linked.pdf"),
        )
        .unwrap();

        let result =
            scan_directory(dir.path(), &ScanOptions::default(), &CancellationToken::new()).unwrap();
        assert!(result.files.is_empty());
        assert_eq!(result.files_scanned, 2);

        let options = ScanOptions {
            follow_symlinks: true,
            ..ScanOptions::default()
        };
        let result = scan_directory(dir.path(), &options, &CancellationToken::new()).unwrap();
        assert_eq!(names(&result), vec!["elsewhere.pdf", "linked.pdf"]);
    }
}
