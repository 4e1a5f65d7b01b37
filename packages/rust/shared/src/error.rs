//! Error types for lexenrich.
//!
//! Library crates use [`LexError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::RecordStage;

/// Classification of a relational store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The statement could not be prepared (bad SQL, unknown table/column).
    Syntax,
    /// A constraint was violated.
    Integrity,
    /// The store was unreachable, busy, locked, read-only, or out of space.
    Operational,
    /// Anything the driver reported that does not fit the other kinds.
    Generic,
}

impl std::fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Syntax => "syntax",
            Self::Integrity => "integrity",
            Self::Operational => "operational",
            Self::Generic => "generic",
        };
        f.write_str(s)
    }
}

/// Top-level error type for all lexenrich operations.
#[derive(Debug, thiserror::Error)]
pub enum LexError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A stored document is not well-formed XML.
    #[error("malformed document: {message}")]
    MalformedDocument { message: String },

    /// A canonical section is missing from a document that must have it.
    #[error("document is missing its <{section}> section")]
    MissingSection { section: &'static str },

    /// Text-generation service call failed (transport, auth, or response).
    #[error("service error: {0}")]
    Service(String),

    /// Relational store error.
    #[error("{kind} store error: {message}")]
    Store {
        kind: StoreErrorKind,
        message: String,
    },

    /// A record failed fatally and the batch was stopped.
    #[error("batch aborted at record {id} during {stage}: {source}")]
    BatchAborted {
        id: i64,
        stage: RecordStage,
        #[source]
        source: Box<LexError>,
    },

    /// A worker task panicked while it held a record.
    #[error("worker {worker} panicked: {message}")]
    WorkerPanic { worker: usize, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad identifier, zero workers, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LexError>;

impl LexError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a malformed-document error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDocument {
            message: msg.into(),
        }
    }

    /// Create a store error of the given kind.
    pub fn store(kind: StoreErrorKind, msg: impl Into<String>) -> Self {
        Self::Store {
            kind,
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this failure should stop the whole batch when a record hits it.
    ///
    /// Only malformed documents are isolated to their record.
    pub fn is_batch_fatal(&self) -> bool {
        !matches!(self, Self::MalformedDocument { .. })
    }
}
