//! Strategy-based recovery from parsing errors
//!
//! A [`RecoveryManager`] maps each [`ErrorKind`] to an ordered list of
//! [`RecoveryStrategy`] objects. Strategies are tried in registration order
//! and the first one that succeeds wins.

use super::errors::{ErrorCollection, ErrorKind, PdfError};
use super::xref::{self, RebuiltXref, XrefError};
use lopdf::{dictionary, Dictionary, Object};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Seek, SeekFrom};
use std::time::{Duration, Instant};
use thiserror::Error;

// ============================================================================
// Options & Context
// ============================================================================

/// Parsing behaviour and recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Treat any unrecovered page error as fatal (default: false)
    pub strict_mode: bool,
    /// Maximum strategies tried per error (default: 3)
    pub max_recovery_attempts: usize,
    /// Allow substitute values and file-level recovery (default: true)
    pub enable_fallbacks: bool,
    /// Exclude unrecoverable pages instead of counting them (default: true)
    pub skip_corrupted_pages: bool,
    /// Allow xref reconstruction (default: true)
    pub repair_xref: bool,
    /// Filters whose failure may be ignored
    pub ignore_filters: Vec<String>,
    /// Filters that may be passed through undecoded
    pub fallback_filters: Vec<String>,
    /// Whole-run timeout in milliseconds, 0 disables it (default: 30s)
    pub timeout_ms: u64,
    /// Error kinds for which recovery is attempted
    pub recovery_enabled: BTreeSet<ErrorKind>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict_mode: false,
            max_recovery_attempts: 3,
            enable_fallbacks: true,
            skip_corrupted_pages: true,
            repair_xref: true,
            ignore_filters: Vec::new(),
            fallback_filters: vec![
                "FlateDecode".to_string(),
                "ASCIIHexDecode".to_string(),
                "ASCII85Decode".to_string(),
            ],
            timeout_ms: 30_000,
            recovery_enabled: [
                ErrorKind::CorruptedXref,
                ErrorKind::CorruptedData,
                ErrorKind::MalformedObject,
                ErrorKind::InvalidStream,
                ErrorKind::MissingObject,
                ErrorKind::InvalidFilter,
                ErrorKind::ResourceNotFound,
                ErrorKind::InvalidFont,
                ErrorKind::InvalidImage,
                ErrorKind::MalformedPage,
                ErrorKind::InvalidAnnotation,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl ParseOptions {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }
}

trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

/// Per-run parsing state, owned by exactly one parse
pub struct ParseContext {
    source: Option<Box<dyn ReadSeek>>,
    /// Substitute values already produced during this run
    pub object_cache: HashMap<String, Recovered>,
    pub options: ParseOptions,
    pub file_path: String,
    pub current_page: u32,
    pub errors: ErrorCollection,
    pub started_at: Instant,
}

impl ParseContext {
    pub fn new(file_path: impl Into<String>, options: ParseOptions) -> Self {
        let file_path = file_path.into();
        Self {
            source: None,
            object_cache: HashMap::new(),
            options,
            errors: ErrorCollection::new(file_path.clone()),
            file_path,
            current_page: 0,
            started_at: Instant::now(),
        }
    }

    /// Attach the raw input so byte-level strategies can rescan it
    pub fn with_source(mut self, source: impl Read + Seek + Send + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Read the whole input from the beginning
    pub fn read_source(&mut self) -> Result<Vec<u8>, StrategyError> {
        let source = self.source.as_mut().ok_or(StrategyError::NoSource)?;
        source.seek(SeekFrom::Start(0))?;
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl std::fmt::Debug for ParseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseContext")
            .field("file_path", &self.file_path)
            .field("current_page", &self.current_page)
            .field("has_source", &self.source.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// Value produced by a successful recovery
#[derive(Debug, Clone)]
pub enum Recovered {
    /// Substitute a null object
    Null,
    /// Substitute a stream with no content
    EmptyStream,
    /// Keep the stream data undecoded
    PassThrough { filter: String },
    /// Substitute an empty resource dictionary
    EmptyResources,
    /// Substitute font dictionary
    Font(Dictionary),
    /// Minimal page dictionary
    Page(Dictionary),
    /// File image with a rebuilt cross-reference table
    Repaired(RebuiltXref),
    /// Drop the offending element
    Omitted,
}

impl Recovered {
    pub fn describe(&self) -> String {
        match self {
            Recovered::Null => "null substitute".to_string(),
            Recovered::EmptyStream => "empty stream".to_string(),
            Recovered::PassThrough { filter } => format!("{} passed through", filter),
            Recovered::EmptyResources => "empty resources".to_string(),
            Recovered::Font(_) => "Helvetica substitute".to_string(),
            Recovered::Page(_) => "minimal US Letter page".to_string(),
            Recovered::Repaired(rebuilt) => {
                format!("xref rebuilt with {} objects", rebuilt.objects.len())
            }
            Recovered::Omitted => "omitted".to_string(),
        }
    }
}

/// Why a single strategy could not recover
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("{0} disabled")]
    Disabled(&'static str),

    #[error("no input source available")]
    NoSource,

    #[error("not applicable: {0}")]
    NotApplicable(String),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("xref rebuild failed: {0}")]
    Xref(#[from] XrefError),
}

/// A way of working around one class of parsing error
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn can_recover(&self, err: &PdfError) -> bool;

    fn recover(&self, err: &PdfError, ctx: &mut ParseContext) -> Result<Recovered, StrategyError>;
}

fn require_fallbacks(ctx: &ParseContext) -> Result<(), StrategyError> {
    if ctx.options.enable_fallbacks {
        Ok(())
    } else {
        Err(StrategyError::Disabled("fallbacks"))
    }
}

pub struct StreamRecovery;

impl RecoveryStrategy for StreamRecovery {
    fn name(&self) -> &'static str {
        "StreamRecovery"
    }

    fn description(&self) -> &'static str {
        "Substitutes an empty stream for an unreadable one"
    }

    fn can_recover(&self, err: &PdfError) -> bool {
        err.kind == ErrorKind::InvalidStream
    }

    fn recover(&self, _err: &PdfError, ctx: &mut ParseContext) -> Result<Recovered, StrategyError> {
        require_fallbacks(ctx)?;
        Ok(Recovered::EmptyStream)
    }
}

/// Expects the filter name in the error context
pub struct FilterRecovery;

impl RecoveryStrategy for FilterRecovery {
    fn name(&self) -> &'static str {
        "FilterRecovery"
    }

    fn description(&self) -> &'static str {
        "Passes data through when its filter is ignorable"
    }

    fn can_recover(&self, err: &PdfError) -> bool {
        err.kind == ErrorKind::InvalidFilter
    }

    fn recover(&self, err: &PdfError, ctx: &mut ParseContext) -> Result<Recovered, StrategyError> {
        let filter = err
            .context
            .as_deref()
            .map(|f| f.trim_start_matches('/'))
            .ok_or_else(|| StrategyError::NotApplicable("filter name unknown".to_string()))?;

        let options = &ctx.options;
        let ignorable = options.ignore_filters.iter().any(|f| f == filter)
            || (options.enable_fallbacks && options.fallback_filters.iter().any(|f| f == filter));

        if ignorable {
            Ok(Recovered::PassThrough {
                filter: filter.to_string(),
            })
        } else {
            Err(StrategyError::NotApplicable(format!(
                "{} is not an ignorable filter",
                filter
            )))
        }
    }
}

pub struct ObjectRecovery;

impl RecoveryStrategy for ObjectRecovery {
    fn name(&self) -> &'static str {
        "ObjectRecovery"
    }

    fn description(&self) -> &'static str {
        "Substitutes null for a malformed object"
    }

    fn can_recover(&self, err: &PdfError) -> bool {
        err.kind == ErrorKind::MalformedObject
    }

    fn recover(&self, _err: &PdfError, ctx: &mut ParseContext) -> Result<Recovered, StrategyError> {
        require_fallbacks(ctx)?;
        Ok(Recovered::Null)
    }
}

/// A reference to a missing object is equivalent to null
pub struct MissingObjectRecovery;

impl RecoveryStrategy for MissingObjectRecovery {
    fn name(&self) -> &'static str {
        "MissingObjectRecovery"
    }

    fn description(&self) -> &'static str {
        "Resolves missing object references to null"
    }

    fn can_recover(&self, err: &PdfError) -> bool {
        err.kind == ErrorKind::MissingObject
    }

    fn recover(&self, _err: &PdfError, _ctx: &mut ParseContext) -> Result<Recovered, StrategyError> {
        Ok(Recovered::Null)
    }
}

const XREF_CACHE_KEY: &str = "xref";

pub struct XrefRebuild;

impl RecoveryStrategy for XrefRebuild {
    fn name(&self) -> &'static str {
        "XRefRecovery"
    }

    fn description(&self) -> &'static str {
        "Rebuilds the cross-reference table by scanning for object headers"
    }

    fn can_recover(&self, err: &PdfError) -> bool {
        matches!(err.kind, ErrorKind::CorruptedXref | ErrorKind::CorruptedData)
    }

    fn recover(&self, _err: &PdfError, ctx: &mut ParseContext) -> Result<Recovered, StrategyError> {
        if !ctx.options.repair_xref {
            return Err(StrategyError::Disabled("xref repair"));
        }
        if let Some(cached) = ctx.object_cache.get(XREF_CACHE_KEY) {
            return Ok(cached.clone());
        }

        let data = ctx.read_source()?;
        let rebuilt = xref::rebuild(&data)?;
        tracing::debug!(
            objects = rebuilt.objects.len(),
            root = rebuilt.root.0,
            "rebuilt cross-reference table"
        );

        let recovered = Recovered::Repaired(rebuilt);
        ctx.object_cache
            .insert(XREF_CACHE_KEY.to_string(), recovered.clone());
        Ok(recovered)
    }
}

pub struct ResourceRecovery;

impl RecoveryStrategy for ResourceRecovery {
    fn name(&self) -> &'static str {
        "ResourceRecovery"
    }

    fn description(&self) -> &'static str {
        "Substitutes an empty resource dictionary"
    }

    fn can_recover(&self, err: &PdfError) -> bool {
        err.kind == ErrorKind::ResourceNotFound
    }

    fn recover(&self, _err: &PdfError, _ctx: &mut ParseContext) -> Result<Recovered, StrategyError> {
        Ok(Recovered::EmptyResources)
    }
}

pub struct FontRecovery;

impl RecoveryStrategy for FontRecovery {
    fn name(&self) -> &'static str {
        "FontRecovery"
    }

    fn description(&self) -> &'static str {
        "Substitutes a standard Helvetica font"
    }

    fn can_recover(&self, err: &PdfError) -> bool {
        err.kind == ErrorKind::InvalidFont
    }

    fn recover(&self, _err: &PdfError, _ctx: &mut ParseContext) -> Result<Recovered, StrategyError> {
        Ok(Recovered::Font(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        }))
    }
}

pub struct ImageRecovery;

impl RecoveryStrategy for ImageRecovery {
    fn name(&self) -> &'static str {
        "ImageRecovery"
    }

    fn description(&self) -> &'static str {
        "Skips a corrupted image"
    }

    fn can_recover(&self, err: &PdfError) -> bool {
        err.kind == ErrorKind::InvalidImage
    }

    fn recover(&self, _err: &PdfError, _ctx: &mut ParseContext) -> Result<Recovered, StrategyError> {
        Ok(Recovered::Omitted)
    }
}

pub struct PageRecovery;

impl RecoveryStrategy for PageRecovery {
    fn name(&self) -> &'static str {
        "PageRecovery"
    }

    fn description(&self) -> &'static str {
        "Substitutes a minimal US Letter page"
    }

    fn can_recover(&self, err: &PdfError) -> bool {
        err.kind == ErrorKind::MalformedPage
    }

    fn recover(&self, _err: &PdfError, ctx: &mut ParseContext) -> Result<Recovered, StrategyError> {
        if !ctx.options.skip_corrupted_pages {
            return Err(StrategyError::Disabled("page recovery"));
        }
        let media_box: Vec<Object> = vec![0.into(), 0.into(), 612.into(), 792.into()];
        Ok(Recovered::Page(dictionary! {
            "Type" => "Page",
            "MediaBox" => media_box,
        }))
    }
}

pub struct AnnotationRecovery;

impl RecoveryStrategy for AnnotationRecovery {
    fn name(&self) -> &'static str {
        "AnnotationRecovery"
    }

    fn description(&self) -> &'static str {
        "Skips a malformed annotation"
    }

    fn can_recover(&self, err: &PdfError) -> bool {
        err.kind == ErrorKind::InvalidAnnotation
    }

    fn recover(&self, _err: &PdfError, _ctx: &mut ParseContext) -> Result<Recovered, StrategyError> {
        Ok(Recovered::Omitted)
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Result of a successful recovery
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub strategy: &'static str,
    pub value: Recovered,
    /// Strategies tried, including the successful one
    pub attempts: usize,
}

/// Why no strategy recovered an error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecoveryFailure {
    #[error("no recovery strategies available for error type: {0}")]
    NoStrategy(ErrorKind),

    #[error("recovery disabled for error type: {0}")]
    Disabled(ErrorKind),

    #[error("no strategy recovered this error ({kind}, {attempts} attempted)")]
    Exhausted { kind: ErrorKind, attempts: usize },
}

impl RecoveryFailure {
    pub fn attempts(&self) -> usize {
        match self {
            RecoveryFailure::Exhausted { attempts, .. } => *attempts,
            _ => 0,
        }
    }
}

/// Registry of recovery strategies keyed by error kind
#[derive(Default)]
pub struct RecoveryManager {
    strategies: HashMap<ErrorKind, Vec<Box<dyn RecoveryStrategy>>>,
}

impl RecoveryManager {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in strategies
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        manager.register(ErrorKind::InvalidStream, StreamRecovery);
        manager.register(ErrorKind::InvalidFilter, FilterRecovery);
        manager.register(ErrorKind::MalformedObject, ObjectRecovery);
        manager.register(ErrorKind::MissingObject, MissingObjectRecovery);
        manager.register(ErrorKind::CorruptedXref, XrefRebuild);
        manager.register(ErrorKind::CorruptedData, XrefRebuild);
        manager.register(ErrorKind::ResourceNotFound, ResourceRecovery);
        manager.register(ErrorKind::InvalidFont, FontRecovery);
        manager.register(ErrorKind::InvalidImage, ImageRecovery);
        manager.register(ErrorKind::MalformedPage, PageRecovery);
        manager.register(ErrorKind::InvalidAnnotation, AnnotationRecovery);
        manager
    }

    /// Append a strategy to the list for `kind`
    pub fn register(&mut self, kind: ErrorKind, strategy: impl RecoveryStrategy + 'static) {
        self.strategies
            .entry(kind)
            .or_default()
            .push(Box::new(strategy));
    }

    /// Names of the strategies registered for `kind`, in order
    pub fn strategy_names(&self, kind: ErrorKind) -> Vec<&'static str> {
        self.strategies
            .get(&kind)
            .map(|list| list.iter().map(|s| s.name()).collect())
            .unwrap_or_default()
    }

    /// Try the strategies for `err.kind` in order; the first success wins
    pub fn attempt(
        &self,
        err: &PdfError,
        ctx: &mut ParseContext,
    ) -> Result<RecoveryOutcome, RecoveryFailure> {
        let strategies = match self.strategies.get(&err.kind) {
            Some(list) if !list.is_empty() => list,
            _ => return Err(RecoveryFailure::NoStrategy(err.kind)),
        };
        if !ctx.options.recovery_enabled.contains(&err.kind) {
            return Err(RecoveryFailure::Disabled(err.kind));
        }

        let limit = ctx.options.max_recovery_attempts;
        let mut attempts = 0;
        for strategy in strategies.iter().filter(|s| s.can_recover(err)) {
            if attempts >= limit {
                break;
            }
            attempts += 1;
            tracing::debug!(
                strategy = strategy.name(),
                kind = %err.kind,
                attempt = attempts,
                "attempting recovery"
            );

            match strategy.recover(err, ctx) {
                Ok(value) => {
                    tracing::debug!(strategy = strategy.name(), "recovery succeeded");
                    return Ok(RecoveryOutcome {
                        strategy: strategy.name(),
                        value,
                        attempts,
                    });
                }
                Err(e) => {
                    tracing::debug!(strategy = strategy.name(), error = %e, "recovery failed");
                }
            }
        }

        Err(RecoveryFailure::Exhausted {
            kind: err.kind,
            attempts,
        })
    }
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.strategies.keys().collect();
        kinds.sort();
        f.debug_struct("RecoveryManager")
            .field("kinds", &kinds)
            .finish()
    }
}
