//! PDF parsing layer
//!
//! Fault-tolerant parsing on top of the `lopdf` object model: a typed error
//! taxonomy, strategy-based recovery and a parser that contains library
//! panics and enforces a timeout.

pub mod backend;
pub mod errors;
pub mod parser;
pub mod recovery;
pub mod xref;

pub use backend::{LopdfBackend, PdfBackend, PdfDocument, PdfPage};
pub use errors::{ErrorCollection, ErrorKind, PdfError, Severity};
pub use parser::{ParseResult, ParseStatus, RobustParser};
pub use recovery::{
    ParseContext, ParseOptions, Recovered, RecoveryFailure, RecoveryManager, RecoveryOutcome,
    RecoveryStrategy, StrategyError,
};
