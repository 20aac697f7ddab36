//! Arguments shared by every subcommand: where the data lives and how to
//! train on it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use duotower_core::LossMode;
use duotower_data::MovieLensDataset;
use duotower_training::{RecommenderSession, TrainingConfig};
use serde::Serialize;
use tracing::{info, warn};

/// Training objective as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LossArg {
    /// In-batch softmax
    Softmax,
    /// Bayesian personalized ranking
    Bpr,
}

impl From<LossArg> for LossMode {
    fn from(arg: LossArg) -> Self {
        match arg {
            LossArg::Softmax => LossMode::InBatchSoftmax,
            LossArg::Bpr => LossMode::Bpr,
        }
    }
}

/// Dataset location and training overrides.
///
/// Settings are layered: defaults, then the JSON file given by `--config`,
/// then any flag or `DUOTOWER_*` variable that is set.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Directory containing `u.data` and `u.item`
    #[arg(long, short = 'd', env = "DUOTOWER_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Training configuration file (JSON, missing fields take defaults)
    #[arg(long, short = 'c', env = "DUOTOWER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Embedding dimension
    #[arg(long, env = "DUOTOWER_EMBEDDING_DIM")]
    pub embedding_dim: Option<usize>,

    /// Number of epochs
    #[arg(long, env = "DUOTOWER_EPOCHS")]
    pub epochs: Option<usize>,

    /// Batch size
    #[arg(long, short = 'b', env = "DUOTOWER_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Learning rate of the configured optimizer
    #[arg(long, env = "DUOTOWER_LEARNING_RATE")]
    pub learning_rate: Option<f32>,

    /// Training objective
    #[arg(long, value_enum, env = "DUOTOWER_LOSS")]
    pub loss: Option<LossArg>,

    /// Train on at most this many interactions
    #[arg(long, env = "DUOTOWER_MAX_INTERACTIONS")]
    pub max_interactions: Option<usize>,

    /// Fuse genre flags into item vectors
    #[arg(long, env = "DUOTOWER_SIDE_FEATURES")]
    pub side_features: bool,

    /// Random seed
    #[arg(long, env = "DUOTOWER_SEED")]
    pub seed: Option<u64>,
}

impl SessionArgs {
    /// The effective training configuration.
    pub fn training_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!(path = %path.display(), "Loading config");
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                serde_json::from_str::<TrainingConfig>(&raw)
                    .with_context(|| format!("Failed to parse config JSON {}", path.display()))?
            }
            None => TrainingConfig::default(),
        };

        if let Some(dim) = self.embedding_dim {
            config = config.with_embedding_dim(dim);
        }
        if let Some(epochs) = self.epochs {
            config = config.with_epochs(epochs);
        }
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if let Some(lr) = self.learning_rate {
            config = config.with_learning_rate(lr);
        }
        if let Some(loss) = self.loss {
            config = config.with_loss_mode(loss.into());
        }
        if let Some(max) = self.max_interactions {
            config = config.with_max_interactions(max);
        }
        if self.side_features {
            config = config.with_side_features(true);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config.validate().context("Invalid training configuration")?;
        Ok(config)
    }

    /// Loads the dataset and builds an untrained session.
    pub fn session(&self) -> Result<RecommenderSession> {
        let config = self.training_config()?;
        let dataset = MovieLensDataset::load_dir(&self.data_dir).with_context(|| {
            format!("Failed to load MovieLens data from {}", self.data_dir.display())
        })?;
        if dataset.items.is_empty() {
            warn!("u.item is empty, titles fall back to item ids");
        }
        RecommenderSession::new(config, dataset.interactions, dataset.items)
            .context("Failed to build session")
    }

    /// Loads the dataset and trains a session on it.
    pub async fn trained_session(&self) -> Result<RecommenderSession> {
        let mut session = self.session()?;
        let trajectory = session.train().await.context("Training failed")?;
        info!(
            steps = trajectory.len(),
            final_loss = ?trajectory.last_loss(),
            "Training completed"
        );
        Ok(session)
    }
}

/// Writes `value` to stdout as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", out);
    Ok(())
}
