//! Error types shared by every duotower crate.
//!
//! [`RecError`] is the recommender's error taxonomy. Higher-level crates wrap
//! it in their own error enums via `#[from]`, but the variants below are the
//! ones a caller ultimately matches on.

use std::fmt;

use thiserror::Error;

/// The kind of entity an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A user identifier or user index.
    User,
    /// An item identifier or item index.
    Item,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::User => write!(f, "user"),
            EntityKind::Item => write!(f, "item"),
        }
    }
}

/// The main error type for recommender operations.
#[derive(Debug, Error)]
pub enum RecError {
    /// Invalid configuration or input set, rejected before computation starts.
    #[error("Configuration error: {message}")]
    Configuration {
        /// A description of the offending setting and its value.
        message: String,
    },

    /// An identifier (or dense index) that the registry has never assigned.
    #[error("Unknown {kind} identifier: {id}")]
    UnknownIdentifier {
        /// Whether the identifier names a user or an item.
        kind: EntityKind,
        /// The offending identifier, rendered as text.
        id: String,
    },

    /// A loss or score became NaN or infinite.
    #[error("Numeric divergence at epoch {epoch}, batch {batch}: {quantity} = {value}")]
    NumericDivergence {
        /// Epoch in which the divergence was detected.
        epoch: usize,
        /// Batch index within the epoch.
        batch: usize,
        /// Which quantity diverged (e.g. "loss", "score").
        quantity: String,
        /// The non-finite value.
        value: f32,
    },

    /// Not enough data to run the requested computation.
    #[error("Insufficient data: {message}")]
    InsufficientData {
        /// A description of what was missing.
        message: String,
    },

    /// An externally imposed budget was exhausted.
    #[error("Resource exhausted after {chunks_scored} chunks: {message}")]
    ResourceExhausted {
        /// Number of catalog chunks fully scored before the budget tripped.
        chunks_scored: usize,
        /// Which budget tripped.
        message: String,
    },

    /// Batch arrays whose lengths disagree with each other or the model.
    #[error("Shape mismatch at epoch {epoch}, batch {batch}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Epoch in which the mismatch was detected.
        epoch: usize,
        /// Batch index within the epoch.
        batch: usize,
        /// The expected length or width.
        expected: usize,
        /// The actual length or width.
        actual: usize,
    },
}

impl RecError {
    /// Shorthand for a [`RecError::Configuration`] error.
    pub fn configuration(message: impl Into<String>) -> Self {
        RecError::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for a [`RecError::InsufficientData`] error.
    pub fn insufficient_data(message: impl Into<String>) -> Self {
        RecError::InsufficientData {
            message: message.into(),
        }
    }

    /// Shorthand for a [`RecError::UnknownIdentifier`] error.
    pub fn unknown(kind: EntityKind, id: impl fmt::Display) -> Self {
        RecError::UnknownIdentifier {
            kind,
            id: id.to_string(),
        }
    }

    /// Returns `true` for errors that must halt a training run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecError::NumericDivergence { .. } | RecError::ShapeMismatch { .. }
        )
    }
}

/// A specialized Result type for duotower core operations.
pub type Result<T> = std::result::Result<T, RecError>;
