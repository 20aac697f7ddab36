//! Model-level parameters shared by the layers and training crates.

use serde::{Deserialize, Serialize};

use crate::error::{RecError, Result};

/// Training objective used by the scoring engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossMode {
    /// Softmax over the `B x B` logits of one batch; the diagonal is positive.
    #[default]
    InBatchSoftmax,
    /// Pairwise ranking against one sampled negative per positive.
    Bpr,
}

impl LossMode {
    /// Whether batches for this loss need explicit negative items.
    pub fn needs_negatives(self) -> bool {
        matches!(self, LossMode::Bpr)
    }

    /// Short display name.
    pub fn name(self) -> &'static str {
        match self {
            LossMode::InBatchSoftmax => "in_batch_softmax",
            LossMode::Bpr => "bpr",
        }
    }
}

/// Distribution used to fill freshly created parameter tensors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InitializerConfig {
    /// All zeros.
    Zeros,
    /// Uniform in `[min, max)`.
    RandomUniform {
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },
    /// Normal with the given mean and standard deviation.
    RandomNormal {
        /// Mean.
        mean: f32,
        /// Standard deviation.
        stddev: f32,
    },
    /// Normal, re-drawn until within two standard deviations of the mean.
    TruncatedNormal {
        /// Mean.
        mean: f32,
        /// Standard deviation.
        stddev: f32,
    },
}

impl Default for InitializerConfig {
    fn default() -> Self {
        InitializerConfig::RandomNormal {
            mean: 0.0,
            stddev: 0.05,
        }
    }
}

impl InitializerConfig {
    /// Checks that the distribution parameters are usable.
    pub fn validate(&self) -> Result<()> {
        match *self {
            InitializerConfig::Zeros => Ok(()),
            InitializerConfig::RandomUniform { min, max } => {
                if !(min.is_finite() && max.is_finite() && min < max) {
                    return Err(RecError::configuration(format!(
                        "uniform initializer needs finite min < max, got [{}, {})",
                        min, max
                    )));
                }
                Ok(())
            }
            InitializerConfig::RandomNormal { mean, stddev }
            | InitializerConfig::TruncatedNormal { mean, stddev } => {
                if !mean.is_finite() || !(stddev.is_finite() && stddev > 0.0) {
                    return Err(RecError::configuration(format!(
                        "normal initializer needs finite mean and stddev > 0, got mean={} stddev={}",
                        mean, stddev
                    )));
                }
                Ok(())
            }
        }
    }
}
