//! Error types for data loading and batch production.

use std::path::PathBuf;

use duotower_core::RecError;
use duotower_layers::LayerError;
use thiserror::Error;

/// Errors raised while loading records or producing batches.
#[derive(Debug, Error)]
pub enum DataError {
    /// A recommender error from record validation or side-feature lookup.
    #[error(transparent)]
    Rec(#[from] RecError),

    /// A layer error from gathering side-feature rows.
    #[error(transparent)]
    Layer(#[from] LayerError),

    /// A file could not be opened or read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A line of an input file could not be parsed.
    #[error("Malformed input at line {line}: {reason}")]
    Malformed {
        /// One-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// The batch producer stopped before the epoch was complete.
    #[error("Batch producer failed: {0}")]
    Producer(String),
}

impl DataError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        DataError::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

/// A specialized Result type for data operations.
pub type DataResult<T> = std::result::Result<T, DataError>;
