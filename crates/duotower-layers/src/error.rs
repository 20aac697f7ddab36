//! Error types for the duotower-layers crate.

use duotower_core::RecError;
use duotower_optimizer::OptimizerError;
use thiserror::Error;

/// Error type for layer operations.
#[derive(Debug, Error)]
pub enum LayerError {
    /// A recommender-level error (unknown index, divergence, degenerate batch).
    #[error(transparent)]
    Rec(#[from] RecError),

    /// The optimizer configuration was rejected.
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// Arrays could not be reshaped or joined.
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Invalid input dimension for the layer.
    #[error("Invalid input dimension: expected {expected}, got {actual}")]
    InvalidInputDimension {
        /// The expected input dimension
        expected: usize,
        /// The actual input dimension
        actual: usize,
    },

    /// Layer has not been run forward in training mode.
    #[error("Layer not initialized: forward pass must be called before backward pass")]
    NotInitialized,
}

/// Result type alias for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use duotower_core::EntityKind;

    #[test]
    fn test_error_display() {
        let err = LayerError::InvalidInputDimension {
            expected: 51,
            actual: 32,
        };
        assert!(err.to_string().contains("Invalid input dimension"));

        let err: LayerError = RecError::unknown(EntityKind::Item, 9).into();
        assert_eq!(err.to_string(), "Unknown item identifier: 9");

        assert!(LayerError::NotInitialized.to_string().contains("not initialized"));
    }
}
