//! Typed parsing errors and per-run error collection

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Category of a PDF parsing failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unknown,
    InvalidHeader,
    CorruptedXref,
    MalformedObject,
    InvalidStream,
    MissingObject,
    CircularReference,
    InvalidEncoding,
    CorruptedData,
    UnsupportedFeature,
    SecurityRestriction,
    InvalidFilter,
    InvalidFont,
    InvalidImage,
    InvalidForm,
    MalformedPage,
    InvalidAnnotation,
    InvalidMetadata,
    InvalidStructure,
    ResourceNotFound,
    MemoryExhausted,
    Timeout,
}

/// How serious an error is, from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
    Fatal,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 22] = [
        ErrorKind::Unknown,
        ErrorKind::InvalidHeader,
        ErrorKind::CorruptedXref,
        ErrorKind::MalformedObject,
        ErrorKind::InvalidStream,
        ErrorKind::MissingObject,
        ErrorKind::CircularReference,
        ErrorKind::InvalidEncoding,
        ErrorKind::CorruptedData,
        ErrorKind::UnsupportedFeature,
        ErrorKind::SecurityRestriction,
        ErrorKind::InvalidFilter,
        ErrorKind::InvalidFont,
        ErrorKind::InvalidImage,
        ErrorKind::InvalidForm,
        ErrorKind::MalformedPage,
        ErrorKind::InvalidAnnotation,
        ErrorKind::InvalidMetadata,
        ErrorKind::InvalidStructure,
        ErrorKind::ResourceNotFound,
        ErrorKind::MemoryExhausted,
        ErrorKind::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unknown => "UNKNOWN",
            ErrorKind::InvalidHeader => "INVALID_HEADER",
            ErrorKind::CorruptedXref => "CORRUPTED_XREF",
            ErrorKind::MalformedObject => "MALFORMED_OBJECT",
            ErrorKind::InvalidStream => "INVALID_STREAM",
            ErrorKind::MissingObject => "MISSING_OBJECT",
            ErrorKind::CircularReference => "CIRCULAR_REFERENCE",
            ErrorKind::InvalidEncoding => "INVALID_ENCODING",
            ErrorKind::CorruptedData => "CORRUPTED_DATA",
            ErrorKind::UnsupportedFeature => "UNSUPPORTED_FEATURE",
            ErrorKind::SecurityRestriction => "SECURITY_RESTRICTION",
            ErrorKind::InvalidFilter => "INVALID_FILTER",
            ErrorKind::InvalidFont => "INVALID_FONT",
            ErrorKind::InvalidImage => "INVALID_IMAGE",
            ErrorKind::InvalidForm => "INVALID_FORM",
            ErrorKind::MalformedPage => "MALFORMED_PAGE",
            ErrorKind::InvalidAnnotation => "INVALID_ANNOTATION",
            ErrorKind::InvalidMetadata => "INVALID_METADATA",
            ErrorKind::InvalidStructure => "INVALID_STRUCTURE",
            ErrorKind::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorKind::MemoryExhausted => "MEMORY_EXHAUSTED",
            ErrorKind::Timeout => "TIMEOUT",
        }
    }

    pub fn severity(&self) -> Severity {
        use ErrorKind::*;
        match self {
            InvalidHeader | CorruptedXref | CorruptedData => Severity::Critical,
            MalformedObject | InvalidStream | MissingObject => Severity::Error,
            CircularReference | InvalidEncoding | InvalidFilter => Severity::Error,
            UnsupportedFeature | SecurityRestriction => Severity::Warning,
            InvalidFont | InvalidImage | InvalidForm => Severity::Warning,
            MalformedPage | InvalidAnnotation | InvalidMetadata => Severity::Warning,
            ResourceNotFound => Severity::Warning,
            MemoryExhausted | Timeout => Severity::Fatal,
            InvalidStructure | Unknown => Severity::Error,
        }
    }

    /// Whether errors of this kind can usually be worked around
    pub fn is_recoverable(&self) -> bool {
        use ErrorKind::*;
        match self {
            InvalidHeader | CorruptedXref | CorruptedData | MemoryExhausted | Timeout => false,
            MalformedObject | InvalidStream | MissingObject => true,
            CircularReference | InvalidEncoding | InvalidFilter => true,
            UnsupportedFeature | SecurityRestriction => true,
            InvalidFont | InvalidImage | InvalidForm => true,
            MalformedPage | InvalidAnnotation | InvalidMetadata => true,
            ResourceNotFound => true,
            InvalidStructure | Unknown => false,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

fn context_suffix(context: &Option<String>) -> String {
    context
        .as_deref()
        .map(|c| format!(": {}", c))
        .unwrap_or_default()
}

/// A parsing error with location, context and recovery information
#[derive(Debug, Error, Serialize)]
#[error("[{}] {}{}", .kind, .message, context_suffix(.context))]
pub struct PdfError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Captured diagnostic trace (panics only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// RFC 3339 creation time
    pub timestamp: String,
    pub recoverable: bool,
    #[serde(skip)]
    #[source]
    pub source: Option<BoxedSource>,
}

impl PdfError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
            offset: None,
            object_number: None,
            generation: None,
            file_path: None,
            page: None,
            stack_trace: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            recoverable: kind.is_recoverable(),
            source: None,
        }
    }

    /// Wrap a lower-level error, using its message as this error's message
    pub fn wrap<E>(kind: ErrorKind, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut pdf_err = Self::new(kind, err.to_string());
        pdf_err.source = Some(Box::new(err));
        pdf_err
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_location(mut self, offset: u64, object_number: u32, generation: u16) -> Self {
        self.offset = Some(offset);
        self.object_number = Some(object_number);
        self.generation = Some(generation);
        self
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    /// True for critical and fatal errors
    pub fn is_critical(&self) -> bool {
        self.severity() >= Severity::Critical
    }
}

/// Errors and warnings accumulated during one parse run
#[derive(Debug, Default, Serialize)]
pub struct ErrorCollection {
    pub errors: Vec<PdfError>,
    pub warnings: Vec<PdfError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl ErrorCollection {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: Some(file_path.into()),
            ..Self::default()
        }
    }

    /// File an error under `warnings` (info/warning severity) or `errors`
    pub fn add(&mut self, mut err: PdfError) {
        if err.file_path.is_none() {
            err.file_path = self.file_path.clone();
        }

        if err.severity() <= Severity::Warning {
            self.warnings.push(err);
        } else {
            self.errors.push(err);
        }
    }

    /// (errors, warnings)
    pub fn count(&self) -> (usize, usize) {
        (self.errors.len(), self.warnings.len())
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn has_critical_errors(&self) -> bool {
        self.errors.iter().any(PdfError::is_critical)
    }

    /// Every recorded entry, errors first
    pub fn all(&self) -> impl Iterator<Item = &PdfError> {
        self.errors.iter().chain(self.warnings.iter())
    }

    pub fn recoverable(&self) -> Vec<&PdfError> {
        self.all().filter(|e| e.recoverable).collect()
    }

    pub fn fatal(&self) -> Vec<&PdfError> {
        self.all().filter(|e| !e.recoverable).collect()
    }

    /// Human-readable report, partitioned into recoverable and fatal entries
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "No errors or warnings".to_string();
        }

        let (errors, warnings) = self.count();
        let mut summary = format!("Found {} error(s) and {} warning(s)", errors, warnings);
        if self.has_critical_errors() {
            summary.push_str(" (including critical errors)");
        }

        for (label, group) in [("Recoverable", self.recoverable()), ("Fatal", self.fatal())] {
            if group.is_empty() {
                continue;
            }
            summary.push_str(&format!("\n{} ({}):", label, group.len()));
            for err in group {
                match err.page {
                    Some(page) => summary.push_str(&format!("\n  - page {}: {}", page, err)),
                    None => summary.push_str(&format!("\n  - {}", err)),
                }
            }
        }

        summary
    }
}
