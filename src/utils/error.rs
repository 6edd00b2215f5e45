// src/utils/error.rs
use thiserror::Error;

// Error types for each part of the engine. Everything that can be logged carries
// the URL, selector or field name needed to reproduce it.

/// A page could not be loaded through either leg of the proxy chain.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to load {url}: proxy: {primary}; relay: {fallback}")]
    Exhausted {
        url: String,
        primary: String,
        fallback: String,
    },
}

impl LoadError {
    pub fn url(&self) -> &str {
        match self {
            LoadError::InvalidUrl { url, .. } | LoadError::Exhausted { url, .. } => url,
        }
    }
}

/// Why a single proxy-chain attempt failed. Only ever surfaces inside a `LoadError`.
#[derive(Error, Debug)]
pub enum FetchAttemptError {
    #[error("request timed out")]
    Timeout,

    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchAttemptError {
    /// Keeps timeouts apart from other transport failures.
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchAttemptError::Timeout
        } else {
            FetchAttemptError::Network(err)
        }
    }
}

/// A selector that cannot be registered or used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectorSyntaxError {
    #[error("Invalid CSS selector '{selector}': {reason}")]
    InvalidCss { selector: String, reason: String },

    #[error("Selector '{selector}' extracts an attribute but names none")]
    MissingAttributeName { selector: String },

    #[error("Unknown extraction type '{0}'")]
    UnknownType(String),

    #[error("Empty selector")]
    Empty,
}

/// A single field could not be extracted. Never fatal to the record.
#[derive(Error, Debug)]
pub enum ExtractionFieldError {
    #[error("Field '{field}': {source}")]
    Syntax {
        field: String,
        #[source]
        source: SelectorSyntaxError,
    },

    #[error("Field '{field}': selector '{selector}' matched nothing")]
    NoMatch { field: String, selector: String },

    #[error("Field '{field}': element matched by '{selector}' has no '{attribute}' attribute")]
    MissingAttribute {
        field: String,
        selector: String,
        attribute: String,
    },
}

/// One URL in a batch failed. Isolated into that URL's `ScrapeResult`.
#[derive(Error, Debug)]
pub enum BatchItemError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Remote extraction failed for {url}: {reason}")]
    Remote { url: String, reason: String },
}

/// Errors that prevent a batch from starting at all.
#[derive(Error, Debug, PartialEq)]
pub enum BatchError {
    #[error("A batch job is already running")]
    AlreadyRunning,

    #[error("No URLs to process")]
    EmptyQueue,

    #[error("No selectors configured")]
    NoSelectors,
}

#[derive(Error, Debug, PartialEq)]
pub enum CaptureError {
    #[error("Event targets document generation {event} but generation {active} is loaded")]
    StaleDocument { event: u64, active: u64 },

    #[error("No element with handle {0} in the loaded document")]
    UnknownElement(usize),

    #[error("No document is loaded")]
    NoDocument,

    #[error(transparent)]
    Selector(#[from] SelectorSyntaxError),
}

/// Fatal only to the export attempt that raised it.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Invalid SQL table name '{0}'")]
    InvalidTableName(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed {format} input: {reason}")]
    Parse { format: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Selector group not found: {0}")]
    GroupNotFound(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Load failed: {0}")]
    Load(#[from] LoadError),

    #[error(transparent)]
    Selector(#[from] SelectorSyntaxError),

    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Batch failed: {0}")]
    Batch(#[from] BatchError),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
