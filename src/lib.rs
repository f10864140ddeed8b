//! Resilient PDF processing core
//!
//! This crate provides the building blocks for processing untrusted PDFs:
//! - `cache`: a byte- and count-bounded LRU cache of parsed PDF objects
//! - `pdf`: a parser that recovers from malformed input, contains library
//!   panics and enforces a timeout
//! - `source`: a bounded, cycle-safe directory scanner behind a TTL cache
//! - `service`: the three composed behind one handle

pub mod cache;
pub mod config;
pub mod error;
pub mod pdf;
pub mod service;
pub mod source;

pub use cache::{CacheStats, ObjectCache, ObjectCacheConfig, ObjectContent, ObjectKey};
pub use config::Config;
pub use error::{CacheError, Error, Result};
pub use pdf::{ErrorKind, ParseOptions, ParseResult, ParseStatus, PdfError, RobustParser};
pub use service::{MaintenanceReport, ProcessingService};
pub use source::{CachedScanner, DirectoryCache, PdfFileInfo, ScanOptions, ScanResult};
