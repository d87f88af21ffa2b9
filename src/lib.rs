//! Shelf-Scout: a catalog ingestion pipeline for retail sites
//!
//! This crate walks the category trees of supported retailers, streams the
//! discovered products through in-run deduplication, persists them in bounded
//! batches and reports per-source outcomes through a single-flight coordinator.

pub mod config;
pub mod coordinator;
pub mod ingest;
pub mod model;
pub mod output;
pub mod source;
pub mod storage;

use thiserror::Error;

/// Main error type for Shelf-Scout operations
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("A scraping run is already in progress")]
    AlreadyRunning,

    #[error("No scraper registered for source '{0}'")]
    UnknownSource(String),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised by a source while acquiring its session or producing items
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Source has not been set up")]
    NotReady,

    #[error("Item stream was already consumed; create a new source instance")]
    AlreadyConsumed,

    #[error("Giving up after {failures} failed category fetches")]
    TooManyFailures { failures: usize },

    #[error("Source panicked: {0}")]
    Panicked(String),
}

/// Per-record errors; these are logged and the record is dropped
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordParseError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Field '{field}' is too long ({len} > {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Unparsable price '{0}'")]
    InvalidPrice(String),

    #[error("Negative price '{0}'")]
    NegativePrice(String),
}

/// Errors raised by a persistence sink; a failed batch is never partially applied
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink connection lock was poisoned")]
    Poisoned,

    #[error("Sink rejected batch: {0}")]
    Rejected(String),
}

/// Result type alias for Shelf-Scout operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for source operations
pub type SourceResult<T> = std::result::Result<T, SourceError>;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::Coordinator;
pub use model::{Item, RunResult, RunStatus, SourceTag};
pub use source::{Source, SourceRegistry};
pub use storage::{ProductSink, SqliteSink};

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
