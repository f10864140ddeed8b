//! Fault-tolerant parse orchestration
//!
//! A parse run opens the document, validates every page and consults the
//! [`RecoveryManager`] for each problem it finds. Panics raised by the PDF
//! library are contained per page and again at the top of the run, and the
//! whole run is raced against a wall-clock timeout.

use super::backend::{PdfBackend, PdfDocument, PdfPage};
use super::errors::{ErrorCollection, ErrorKind, PdfError};
use super::recovery::{ParseContext, ParseOptions, Recovered, RecoveryManager};
use crate::cache::{ImageGeometry, ObjectCache, ObjectContent, ObjectKey};
use lopdf::{Dictionary, Object};
use serde::Serialize;
use std::any::Any;
use std::fs::File;
use std::io::BufReader;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Final state of a parse run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// Every page validated without needing recovery
    Success,
    /// The document was usable but had to be repaired, or some pages were
    /// recovered or left unrecovered
    Partial,
    /// The document could not be processed
    Failed,
    /// The run exceeded its timeout
    TimedOut,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Outcome of one parse run
#[derive(Debug, Serialize)]
pub struct ParseResult {
    pub status: ParseStatus,
    /// True for [`ParseStatus::Success`] and [`ParseStatus::Partial`]
    pub success: bool,
    pub total_pages: u32,
    pub pages_processed: u32,
    pub errors: ErrorCollection,
    /// Informational notes: recoveries performed and pages skipped
    pub warnings: Vec<String>,
    pub recovery_attempts: usize,
    #[serde(rename = "processing_time_ms", serialize_with = "serialize_millis")]
    pub processing_time: Duration,
}

impl ParseResult {
    fn new(status: ParseStatus, errors: ErrorCollection) -> Self {
        Self {
            status,
            success: matches!(status, ParseStatus::Success | ParseStatus::Partial),
            total_pages: 0,
            pages_processed: 0,
            errors,
            warnings: Vec::new(),
            recovery_attempts: 0,
            processing_time: Duration::ZERO,
        }
    }

    /// Human-readable error report, partitioned into recoverable and fatal
    pub fn error_summary(&self) -> String {
        self.errors.summary()
    }
}

/// Parser that keeps going through malformed input
pub struct RobustParser {
    backend: Arc<dyn PdfBackend>,
    recovery: Arc<RecoveryManager>,
    options: ParseOptions,
}

impl RobustParser {
    /// Parser with the built-in recovery strategies
    pub fn new(backend: Arc<dyn PdfBackend>, options: ParseOptions) -> Self {
        Self::with_recovery(backend, Arc::new(RecoveryManager::with_defaults()), options)
    }

    pub fn with_recovery(
        backend: Arc<dyn PdfBackend>,
        recovery: Arc<RecoveryManager>,
        options: ParseOptions,
    ) -> Self {
        Self {
            backend,
            recovery,
            options,
        }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub async fn parse_file(&self, path: impl AsRef<Path>) -> ParseResult {
        self.parse(path.as_ref(), None).await
    }

    /// Parse with extracted page text and image objects kept in `cache`
    pub async fn parse_file_cached(
        &self,
        path: impl AsRef<Path>,
        cache: Arc<ObjectCache>,
    ) -> ParseResult {
        self.parse(path.as_ref(), Some(cache)).await
    }

    async fn parse(&self, path: &Path, cache: Option<Arc<ObjectCache>>) -> ParseResult {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("parse_file", %run_id, path = %path.display());

        let job = Job {
            backend: self.backend.clone(),
            recovery: self.recovery.clone(),
            options: self.options.clone(),
            cache,
            path: path.to_path_buf(),
            cancel: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(Progress::default()),
        };
        let cancel = job.cancel.clone();
        let progress = job.progress.clone();

        let blocking_span = span.clone();
        let handle = tokio::task::spawn_blocking(move || blocking_span.in_scope(|| job.run()));

        let joined = match self.options.timeout() {
            Some(limit) => {
                match tokio::time::timeout(limit, handle)
                    .instrument(span.clone())
                    .await
                {
                    Ok(joined) => joined,
                    Err(_) => {
                        // The worker stops at its next page boundary
                        cancel.store(true, Ordering::Relaxed);
                        span.in_scope(|| {
                            tracing::warn!(timeout_ms = limit.as_millis() as u64, "parse timed out")
                        });
                        let mut result = timed_out(path, limit, &progress);
                        result.processing_time = started.elapsed();
                        return result;
                    }
                }
            }
            None => handle.instrument(span.clone()).await,
        };

        let mut result = joined.unwrap_or_else(|e| {
            span.in_scope(|| tracing::warn!(error = %e, "parse task failed"));
            let mut errors = ErrorCollection::new(path.display().to_string());
            errors.add(PdfError::new(
                ErrorKind::CorruptedData,
                format!("parser task failed: {}", e),
            ));
            ParseResult::new(ParseStatus::Failed, errors)
        });
        result.processing_time = started.elapsed();

        span.in_scope(|| {
            let (errors, warnings) = result.errors.count();
            tracing::info!(
                status = ?result.status,
                total_pages = result.total_pages,
                pages_processed = result.pages_processed,
                errors,
                warnings,
                elapsed_ms = result.processing_time.as_millis() as u64,
                "parse finished"
            );
        });
        result
    }
}

fn timed_out(path: &Path, limit: Duration, progress: &Progress) -> ParseResult {
    let mut errors = ErrorCollection::new(path.display().to_string());
    errors.add(PdfError::new(
        ErrorKind::Timeout,
        format!("PDF parsing timed out after {} ms", limit.as_millis()),
    ));
    let mut result = ParseResult::new(ParseStatus::TimedOut, errors);
    result.total_pages = progress.total_pages.load(Ordering::Relaxed);
    result.pages_processed = progress.pages_processed.load(Ordering::Relaxed);
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Blocking run
// ============================================================================

/// Counters visible to the async side after a timeout
#[derive(Default)]
struct Progress {
    total_pages: AtomicU32,
    pages_processed: AtomicU32,
}

struct RunState {
    ctx: ParseContext,
    total_pages: u32,
    pages_processed: u32,
    recovery_attempts: usize,
    notes: Vec<String>,
    degraded: bool,
}

enum PageOutcome {
    Valid,
    Recovered,
    Unrecovered,
}

struct Job {
    backend: Arc<dyn PdfBackend>,
    recovery: Arc<RecoveryManager>,
    options: ParseOptions,
    cache: Option<Arc<ObjectCache>>,
    path: PathBuf,
    cancel: Arc<AtomicBool>,
    progress: Arc<Progress>,
}

impl Job {
    fn run(self) -> ParseResult {
        let mut ctx = ParseContext::new(self.path.display().to_string(), self.options.clone());
        if let Ok(file) = File::open(&self.path) {
            ctx = ctx.with_source(BufReader::new(file));
        }
        let mut state = RunState {
            ctx,
            total_pages: 0,
            pages_processed: 0,
            recovery_attempts: 0,
            notes: Vec::new(),
            degraded: false,
        };

        let status = match catch_unwind(AssertUnwindSafe(|| self.run_pages(&mut state))) {
            Ok(status) => status,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(panic = %message, "parser panicked");
                let trace = std::backtrace::Backtrace::force_capture().to_string();
                state.ctx.errors.add(
                    PdfError::new(ErrorKind::CorruptedData, format!("Parser panic: {}", message))
                        .with_stack_trace(trace),
                );
                ParseStatus::Failed
            }
        };

        let mut result = ParseResult::new(status, state.ctx.errors);
        result.total_pages = state.total_pages;
        result.pages_processed = state.pages_processed;
        result.warnings = state.notes;
        result.recovery_attempts = state.recovery_attempts;
        result
    }

    fn run_pages(&self, state: &mut RunState) -> ParseStatus {
        let Some(doc) = self.open(state) else {
            return ParseStatus::Failed;
        };

        let total = doc.page_count();
        state.total_pages = total;
        self.progress.total_pages.store(total, Ordering::Relaxed);
        tracing::debug!(total_pages = total, "document opened");

        for number in 1..=total {
            if self.cancel.load(Ordering::Relaxed) {
                tracing::debug!(page = number, "parse cancelled");
                return ParseStatus::TimedOut;
            }
            state.ctx.current_page = number;

            let outcome =
                catch_unwind(AssertUnwindSafe(|| self.validate_page(doc.as_ref(), number, state)));
            let unrecovered = match outcome {
                Ok(PageOutcome::Valid) => {
                    state.pages_processed += 1;
                    false
                }
                Ok(PageOutcome::Recovered) => {
                    state.pages_processed += 1;
                    state.degraded = true;
                    false
                }
                Ok(PageOutcome::Unrecovered) => {
                    if !self.options.skip_corrupted_pages && !self.options.strict_mode {
                        state.pages_processed += 1;
                    }
                    true
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(page = number, panic = %message, "page validation panicked");
                    state.ctx.errors.add(
                        PdfError::new(
                            ErrorKind::MalformedPage,
                            format!("Page {} validation panic: {}", number, message),
                        )
                        .with_page(number),
                    );
                    true
                }
            };

            if unrecovered {
                state.degraded = true;
                if self.options.strict_mode {
                    tracing::warn!(page = number, "unrecovered page error in strict mode");
                    return ParseStatus::Failed;
                }
                if self.options.skip_corrupted_pages {
                    state.notes.push(format!("Skipped corrupted page {}", number));
                }
            }
            self.progress
                .pages_processed
                .store(state.pages_processed, Ordering::Relaxed);
        }

        if state.degraded {
            ParseStatus::Partial
        } else {
            ParseStatus::Success
        }
    }

    /// Open the document, falling back to file-level recovery
    fn open(&self, state: &mut RunState) -> Option<Box<dyn PdfDocument>> {
        let err = match self.backend.open(&self.path) {
            Ok(doc) => return Some(doc),
            Err(err) => err,
        };

        tracing::warn!(error = %err, "initial PDF open failed");
        let message = err.message.clone();
        state.ctx.errors.add(err);
        if !self.options.enable_fallbacks {
            return None;
        }

        let corrupted = PdfError::new(ErrorKind::CorruptedData, message);
        let outcome = match self.recovery.attempt(&corrupted, &mut state.ctx) {
            Ok(outcome) => outcome,
            Err(failure) => {
                state.recovery_attempts += failure.attempts();
                tracing::warn!(error = %failure, "file recovery failed");
                state.notes.push(format!("File recovery failed: {}", failure));
                return None;
            }
        };
        state.recovery_attempts += outcome.attempts;

        let Recovered::Repaired(rebuilt) = &outcome.value else {
            state
                .notes
                .push("File recovery did not produce a usable document".to_string());
            return None;
        };

        match self.backend.open_bytes(&rebuilt.data) {
            Ok(doc) => {
                state.degraded = true;
                state.notes.push(format!(
                    "Recovered document structure: {}",
                    outcome.value.describe()
                ));
                Some(doc)
            }
            Err(err) => {
                tracing::warn!(error = %err, "repaired document still unreadable");
                state
                    .ctx
                    .errors
                    .add(err.with_context("after xref rebuild"));
                None
            }
        }
    }

    fn validate_page(
        &self,
        doc: &dyn PdfDocument,
        number: u32,
        state: &mut RunState,
    ) -> PageOutcome {
        let Some(page) = doc.page(number) else {
            let err = PdfError::new(
                ErrorKind::MalformedPage,
                format!("Page {} is null or invalid", number),
            );
            return self.resolve_issues(vec![err], number, state);
        };

        let mut issues = Vec::new();
        if page.attribute("MediaBox").is_none() {
            issues.push(PdfError::new(
                ErrorKind::MalformedPage,
                format!("page {} missing MediaBox", number),
            ));
        }

        match page.attribute("Resources") {
            Some(Object::Dictionary(resources)) => {
                issues.extend(self.check_resources(page.as_ref(), &resources, number));
            }
            Some(_) => issues.push(PdfError::new(
                ErrorKind::ResourceNotFound,
                format!("page {} Resources is not a dictionary", number),
            )),
            None => issues.push(PdfError::new(
                ErrorKind::ResourceNotFound,
                format!("page {} has no Resources", number),
            )),
        }

        if let Err(err) = self.page_text(page.as_ref()) {
            issues.push(err);
        }

        self.resolve_issues(issues, number, state)
    }

    fn resolve_issues(
        &self,
        issues: Vec<PdfError>,
        number: u32,
        state: &mut RunState,
    ) -> PageOutcome {
        if issues.is_empty() {
            return PageOutcome::Valid;
        }

        let mut all_recovered = true;
        for issue in issues {
            let issue = issue.with_page(number);
            match self.recovery.attempt(&issue, &mut state.ctx) {
                Ok(outcome) => {
                    state.recovery_attempts += outcome.attempts;
                    state.notes.push(format!(
                        "Recovered page {}: {} ({} via {})",
                        number,
                        issue.message,
                        outcome.value.describe(),
                        outcome.strategy
                    ));
                }
                Err(failure) => {
                    state.recovery_attempts += failure.attempts();
                    tracing::debug!(page = number, error = %issue, reason = %failure, "page error not recovered");
                    state.notes.push(format!(
                        "Page {} not recovered: {} ({})",
                        number, issue.message, failure
                    ));
                    all_recovered = false;
                }
            }
            state.ctx.errors.add(issue);
        }

        if all_recovered {
            PageOutcome::Recovered
        } else {
            PageOutcome::Unrecovered
        }
    }

    fn check_resources(
        &self,
        page: &dyn PdfPage,
        resources: &Dictionary,
        number: u32,
    ) -> Vec<PdfError> {
        let mut issues = Vec::new();

        let fonts = resources.get(b"Font").ok().and_then(|o| page.resolve(o));
        if let Some(Object::Dictionary(fonts)) = fonts {
            for (name, value) in fonts.iter() {
                if !matches!(page.resolve(value), Some(Object::Dictionary(_))) {
                    let name = String::from_utf8_lossy(name);
                    issues.push(
                        PdfError::new(
                            ErrorKind::InvalidFont,
                            format!("font {} on page {} is not a dictionary", name, number),
                        )
                        .with_context(name),
                    );
                }
            }
        }

        let xobjects = resources.get(b"XObject").ok().and_then(|o| page.resolve(o));
        if let Some(Object::Dictionary(xobjects)) = xobjects {
            for (name, value) in xobjects.iter() {
                let Some(Object::Stream(stream)) = page.resolve(value) else {
                    continue;
                };
                if !matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image") {
                    continue;
                }

                if ImageGeometry::from_dict(&stream.dict).is_none() {
                    let name = String::from_utf8_lossy(name);
                    issues.push(
                        PdfError::new(
                            ErrorKind::InvalidImage,
                            format!("image {} on page {} has no usable dimensions", name, number),
                        )
                        .with_context(name),
                    );
                    continue;
                }

                if let (Some(cache), Object::Reference(id)) = (&self.cache, value) {
                    let key = ObjectKey::from(*id);
                    if !cache.contains(key) {
                        if let Err(e) = cache.put(key, Object::Stream(stream)) {
                            tracing::debug!(key = %key, error = %e, "image not cached");
                        }
                    }
                }
            }
        }

        issues
    }

    /// Page text, served from the object cache when available
    fn page_text(&self, page: &dyn PdfPage) -> Result<String, PdfError> {
        let cached = self.cache.as_ref().zip(page.object_key());

        if let Some((cache, key)) = cached {
            if let Some(ObjectContent::Text(text)) = cache.get(key) {
                return Ok(text);
            }
        }

        let text = page.plain_text()?;

        if let Some((cache, key)) = cached {
            if let Err(e) = cache.put(key, text.clone()) {
                tracing::debug!(key = %key, error = %e, "page text not cached");
            }
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::backend::fixtures;
    use crate::pdf::recovery::RecoveryFailure;
    use crate::pdf::LopdfBackend;
    use pretty_assertions::assert_eq;

    #[derive(Clone, Default)]
    struct MockBackend {
        pages: u32,
        panic_on_page: Option<u32>,
        panic_on_count: bool,
        missing_media_box: Vec<u32>,
        null_pages: Vec<u32>,
        page_delay: Duration,
    }

    impl MockBackend {
        fn with_pages(pages: u32) -> Self {
            Self {
                pages,
                ..Self::default()
            }
        }
    }

    impl PdfBackend for MockBackend {
        fn open(&self, _path: &Path) -> Result<Box<dyn PdfDocument>, PdfError> {
            Ok(Box::new(self.clone()))
        }

        fn open_bytes(&self, _data: &[u8]) -> Result<Box<dyn PdfDocument>, PdfError> {
            Ok(Box::new(self.clone()))
        }
    }

    impl PdfDocument for MockBackend {
        fn page_count(&self) -> u32 {
            if self.panic_on_count {
                panic!("corrupt page tree");
            }
            self.pages
        }

        fn page(&self, number: u32) -> Option<Box<dyn PdfPage + '_>> {
            if self.null_pages.contains(&number) {
                return None;
            }
            Some(Box::new(MockPage {
                number,
                backend: self,
            }))
        }
    }

    struct MockPage<'a> {
        number: u32,
        backend: &'a MockBackend,
    }

    impl PdfPage for MockPage<'_> {
        fn object_key(&self) -> Option<ObjectKey> {
            Some(ObjectKey::new(self.number + 100, 0))
        }

        fn attribute(&self, name: &str) -> Option<Object> {
            match name {
                "MediaBox" if self.backend.missing_media_box.contains(&self.number) => None,
                "MediaBox" => Some(Object::Array(vec![
                    0.into(),
                    0.into(),
                    612.into(),
                    792.into(),
                ])),
                "Resources" => Some(Object::Dictionary(Dictionary::new())),
                _ => None,
            }
        }

        fn resolve(&self, obj: &Object) -> Option<Object> {
            Some(obj.clone())
        }

        fn plain_text(&self) -> Result<String, PdfError> {
            if self.backend.panic_on_page == Some(self.number) {
                panic!("corrupt content stream on page {}", self.number);
            }
            std::thread::sleep(self.backend.page_delay);
            Ok(format!("text of page {}", self.number))
        }
    }

    fn parser(backend: MockBackend, options: ParseOptions) -> RobustParser {
        RobustParser::new(Arc::new(backend), options)
    }

    fn page_errors(result: &ParseResult, page: u32) -> Vec<&PdfError> {
        result
            .errors
            .all()
            .filter(|e| e.page == Some(page))
            .collect()
    }

    #[tokio::test]
    async fn test_clean_document() {
        let result = parser(MockBackend::with_pages(4), ParseOptions::default())
            .parse_file("clean.pdf")
            .await;

        assert_eq!(result.status, ParseStatus::Success);
        assert!(result.success);
        assert_eq!(result.total_pages, 4);
        assert_eq!(result.pages_processed, 4);
        assert!(result.errors.is_empty());
        assert_eq!(result.error_summary(), "No errors or warnings");
    }

    #[tokio::test]
    async fn test_page_panic_is_contained() {
        let backend = MockBackend {
            panic_on_page: Some(3),
            ..MockBackend::with_pages(5)
        };
        let result = parser(backend, ParseOptions::default())
            .parse_file("panicky.pdf")
            .await;

        assert_eq!(result.status, ParseStatus::Partial);
        assert!(result.success);
        assert_eq!(result.total_pages, 5);
        assert_eq!(result.pages_processed, 4);

        let errors = page_errors(&result, 3);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::MalformedPage);
        assert!(errors[0].message.contains("corrupt content stream on page 3"));
        assert_eq!(result.errors.all().count(), 1);
    }

    #[tokio::test]
    async fn test_top_level_panic_fails_run() {
        let backend = MockBackend {
            panic_on_count: true,
            ..MockBackend::with_pages(2)
        };
        let result = parser(backend, ParseOptions::default())
            .parse_file("broken.pdf")
            .await;

        assert_eq!(result.status, ParseStatus::Failed);
        assert!(!result.success);
        let err = &result.errors.errors[0];
        assert_eq!(err.kind, ErrorKind::CorruptedData);
        assert!(err.message.contains("corrupt page tree"));
        assert!(err.stack_trace.is_some());
        assert!(result.errors.has_critical_errors());
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_from_failure() {
        let backend = MockBackend {
            page_delay: Duration::from_millis(50),
            ..MockBackend::with_pages(40)
        };
        let options = ParseOptions::default().with_timeout(Duration::from_millis(120));
        let result = parser(backend, options).parse_file("slow.pdf").await;

        assert_eq!(result.status, ParseStatus::TimedOut);
        assert_ne!(result.status, ParseStatus::Failed);
        assert!(!result.success);
        assert_eq!(result.errors.errors[0].kind, ErrorKind::Timeout);
        assert!(result.pages_processed < 40);
        assert!(result.processing_time < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_media_box_is_recovered() {
        let backend = MockBackend {
            missing_media_box: vec![2],
            ..MockBackend::with_pages(3)
        };
        let result = parser(backend, ParseOptions::default())
            .parse_file("nobox.pdf")
            .await;

        assert_eq!(result.status, ParseStatus::Partial);
        assert!(result.success);
        assert_eq!(result.pages_processed, 3);
        assert_eq!(result.recovery_attempts, 1);
        assert_eq!(page_errors(&result, 2).len(), 1);
        assert!(result.warnings[0].starts_with("Recovered page 2"));
    }

    #[tokio::test]
    async fn test_strict_mode_fails_on_unrecovered_page() {
        let backend = MockBackend {
            missing_media_box: vec![2],
            ..MockBackend::with_pages(3)
        };
        let options = ParseOptions {
            strict_mode: true,
            skip_corrupted_pages: false,
            ..ParseOptions::default()
        };
        let result = parser(backend, options).parse_file("strict.pdf").await;

        assert_eq!(result.status, ParseStatus::Failed);
        assert_eq!(result.pages_processed, 1);
    }

    #[tokio::test]
    async fn test_unrecovered_page_counted_without_skip() {
        let backend = MockBackend {
            null_pages: vec![1],
            ..MockBackend::with_pages(2)
        };
        let options = ParseOptions {
            skip_corrupted_pages: false,
            ..ParseOptions::default()
        };
        let result = parser(backend, options).parse_file("lenient.pdf").await;

        assert_eq!(result.status, ParseStatus::Partial);
        assert_eq!(result.pages_processed, 2);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("Page 1 not recovered: Page 1 is null or invalid"));
    }

    #[tokio::test]
    async fn test_disabled_recovery_is_reported() {
        let backend = MockBackend {
            missing_media_box: vec![2],
            ..MockBackend::with_pages(3)
        };
        let options = ParseOptions {
            recovery_enabled: Default::default(),
            ..ParseOptions::default()
        };
        let result = parser(backend, options).parse_file("norecovery.pdf").await;

        assert_eq!(result.status, ParseStatus::Partial);
        assert_eq!(result.pages_processed, 2);
        assert_eq!(
            result.warnings,
            vec![
                format!(
                    "Page 2 not recovered: page 2 missing MediaBox ({})",
                    RecoveryFailure::Disabled(ErrorKind::MalformedPage)
                ),
                "Skipped corrupted page 2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_recovery_is_idempotent() {
        let backend = MockBackend {
            panic_on_page: Some(2),
            missing_media_box: vec![4],
            ..MockBackend::with_pages(5)
        };
        let parser = parser(backend, ParseOptions::default());

        let first = parser.parse_file("same.pdf").await;
        let second = parser.parse_file("same.pdf").await;

        assert_eq!(first.status, second.status);
        assert_eq!(first.pages_processed, second.pages_processed);
        assert_eq!(first.errors.count(), second.errors.count());
        assert_eq!(first.warnings, second.warnings);
    }

    #[tokio::test]
    async fn test_page_text_is_cached() {
        let cache = Arc::new(ObjectCache::new(1024 * 1024, 100));
        let parser = parser(MockBackend::with_pages(3), ParseOptions::default());

        parser.parse_file_cached("cached.pdf", cache.clone()).await;
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().misses, 3);

        parser.parse_file_cached("cached.pdf", cache.clone()).await;
        assert_eq!(cache.stats().hits, 3);
    }

    #[tokio::test]
    async fn test_unreadable_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let parser = RobustParser::new(Arc::new(LopdfBackend), ParseOptions::default());
        let result = parser.parse_file(&path).await;

        assert_eq!(result.status, ParseStatus::Failed);
        assert_eq!(result.errors.errors[0].kind, ErrorKind::InvalidHeader);
        assert!(result.warnings[0].starts_with("File recovery failed"));
    }

    #[tokio::test]
    async fn test_truncated_file_recovered_by_xref_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.pdf");
        std::fs::write(&path, fixtures::truncated_pdf_bytes(2)).unwrap();

        let parser = RobustParser::new(Arc::new(LopdfBackend), ParseOptions::default());
        let result = parser.parse_file(&path).await;

        assert_eq!(result.status, ParseStatus::Partial);
        assert!(result.success);
        assert_eq!(result.total_pages, 2);
        assert_eq!(result.pages_processed, 2);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.starts_with("Recovered document structure")));
        assert!(result.recovery_attempts >= 1);
    }

    #[tokio::test]
    async fn test_truncated_file_fails_without_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.pdf");
        std::fs::write(&path, fixtures::truncated_pdf_bytes(2)).unwrap();

        let options = ParseOptions {
            enable_fallbacks: false,
            ..ParseOptions::default()
        };
        let result = RobustParser::new(Arc::new(LopdfBackend), options)
            .parse_file(&path)
            .await;

        assert_eq!(result.status, ParseStatus::Failed);
        assert_eq!(result.errors.errors[0].kind, ErrorKind::InvalidHeader);
    }

    #[test]
    fn test_parse_from_sync_context() {
        let parser = parser(MockBackend::with_pages(1), ParseOptions::default());
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(parser.parse_file("sync.pdf"));
        assert_eq!(result.status, ParseStatus::Success);
    }

    #[test]
    fn test_result_serializes() {
        let result = ParseResult::new(ParseStatus::TimedOut, ErrorCollection::default());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "timed_out");
        assert_eq!(json["processing_time_ms"], 0);
    }
}
