//! Error types for training.

use duotower_core::RecError;
use duotower_data::DataError;
use duotower_layers::LayerError;
use duotower_optimizer::OptimizerError;
use thiserror::Error;

use crate::hooks::HookError;

/// Errors that can end a training run or reject a session.
///
/// Recommender errors raised anywhere below (layers, data) surface as
/// [`TrainingError::Rec`], so callers match on one taxonomy.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// A recommender error.
    #[error(transparent)]
    Rec(#[from] RecError),

    /// An optimizer could not be built.
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// A layer error that is not a recommender error.
    #[error("Layer error: {0}")]
    Layer(LayerError),

    /// A data error that is not a recommender error.
    #[error("Data error: {0}")]
    Data(DataError),

    /// A hook failed.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// The run was cancelled at a suspension point.
    #[error("Training cancelled at epoch {epoch}, batch {batch}")]
    Cancelled {
        /// Epoch in progress.
        epoch: usize,
        /// Next batch that would have run.
        batch: usize,
    },
}

impl From<LayerError> for TrainingError {
    fn from(err: LayerError) -> Self {
        match err {
            LayerError::Rec(e) => TrainingError::Rec(e),
            LayerError::Optimizer(e) => TrainingError::Optimizer(e),
            other => TrainingError::Layer(other),
        }
    }
}

impl From<DataError> for TrainingError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Rec(e) => TrainingError::Rec(e),
            DataError::Layer(e) => e.into(),
            other => TrainingError::Data(other),
        }
    }
}

impl TrainingError {
    /// The underlying recommender error, if any.
    pub fn as_rec(&self) -> Option<&RecError> {
        match self {
            TrainingError::Rec(e) => Some(e),
            _ => None,
        }
    }
}

/// A specialized Result type for training operations.
pub type Result<T> = std::result::Result<T, TrainingError>;
