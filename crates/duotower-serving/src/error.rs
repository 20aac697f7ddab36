//! Error types for serving.

use duotower_core::RecError;
use duotower_layers::LayerError;
use duotower_training::TrainingError;
use thiserror::Error;

/// Errors returned by retrieval, projection, evaluation and queries.
///
/// Recommender errors from lower layers are flattened into
/// [`ServingError::Rec`].
#[derive(Debug, Error)]
pub enum ServingError {
    /// A recommender error.
    #[error(transparent)]
    Rec(#[from] RecError),

    /// A layer error that is not a recommender error.
    #[error("Layer error: {0}")]
    Layer(LayerError),

    /// A session error that is not a recommender error.
    #[error("Session error: {0}")]
    Session(TrainingError),

    /// A scored item came out NaN or infinite.
    #[error("Non-finite score {score} for item index {item_index}")]
    NonFiniteScore {
        /// The offending item.
        item_index: usize,
        /// The score.
        score: f32,
    },
}

impl From<LayerError> for ServingError {
    fn from(err: LayerError) -> Self {
        match err {
            LayerError::Rec(e) => ServingError::Rec(e),
            other => ServingError::Layer(other),
        }
    }
}

impl From<TrainingError> for ServingError {
    fn from(err: TrainingError) -> Self {
        match err {
            TrainingError::Rec(e) => ServingError::Rec(e),
            TrainingError::Layer(e) => e.into(),
            other => ServingError::Session(other),
        }
    }
}

impl ServingError {
    /// The underlying recommender error, if any.
    pub fn as_rec(&self) -> Option<&RecError> {
        match self {
            ServingError::Rec(e) => Some(e),
            _ => None,
        }
    }
}

/// A specialized Result type for serving operations.
pub type Result<T> = std::result::Result<T, ServingError>;
