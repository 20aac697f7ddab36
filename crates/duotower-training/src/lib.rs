//! Training for the duotower recommender.
//!
//! - [`TrainingConfig`] - run settings with serde defaults and builders
//! - [`RecommenderSession`] - registries, log, catalog and model of one run
//! - [`Trainer`] - the epoch/batch loop with progress, hooks and cancellation
//! - [`LossTrajectory`] - recorded step losses and per-epoch means
//!
//! # Example
//!
//! ```
//! use duotower_core::RawInteraction;
//! use duotower_training::{RecommenderSession, TrainingConfig};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let log = vec![
//!     RawInteraction::new(1, 10, 5.0, 0).unwrap(),
//!     RawInteraction::new(2, 20, 4.0, 0).unwrap(),
//!     RawInteraction::new(1, 30, 3.0, 0).unwrap(),
//!     RawInteraction::new(2, 40, 2.0, 0).unwrap(),
//! ];
//! let config = TrainingConfig::default().with_embedding_dim(8).with_epochs(2).with_batch_size(2);
//! let mut session = RecommenderSession::new(config, log, Vec::new()).unwrap();
//! let trajectory = session.train().await.unwrap();
//! assert_eq!(trajectory.epoch_means().len(), 2);
//! # });
//! ```

pub mod config;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod session;
pub mod trainer;

pub use config::TrainingConfig;
pub use error::{Result, TrainingError};
pub use hooks::{EarlyStoppingHook, Hook, HookAction, HookError, HookList, LoggingHook};
pub use metrics::{LossPoint, LossTrajectory, TrajectorySummary};
pub use session::RecommenderSession;
pub use trainer::{Trainer, TrainingProgress, TrainingState};
