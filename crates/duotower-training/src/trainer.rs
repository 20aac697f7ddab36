//! The training loop.
//!
//! [`Trainer`] drives epochs of batches through [`TwoTowerModel::train_step`]
//! and moves through `Idle -> Preparing -> Running -> Completed | Failed`.
//! Between batches, and at the end of every epoch, it publishes a
//! [`TrainingProgress`] on a watch channel, checks for cancellation and yields
//! to the runtime. There are no retries: the first failing step ends the run
//! with its epoch and batch.

use duotower_core::{LossMode, RecError};
use duotower_data::{Batch, BatchSampler, PrefetchedEpoch};
use duotower_layers::{StepContext, TwoTowerModel};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::TrainingConfig;
use crate::error::{Result, TrainingError};
use crate::hooks::{Hook, HookAction, HookList, LoggingHook};
use crate::metrics::LossTrajectory;

/// Where a training run is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrainingState {
    /// Nothing has run yet.
    Idle,
    /// Building samplers and the first epoch's batches.
    Preparing,
    /// About to run, or running, the given step.
    Running {
        /// Zero-based epoch.
        epoch: usize,
        /// Zero-based batch within the epoch.
        batch: usize,
    },
    /// The run finished (all epochs, or stopped early by a hook).
    Completed,
    /// The run ended with an error.
    Failed {
        /// The error, rendered.
        reason: String,
    },
}

impl TrainingState {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainingState::Completed | TrainingState::Failed { .. })
    }
}

/// Snapshot published after every state change and step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingProgress {
    /// Current state.
    pub state: TrainingState,
    /// Steps completed so far.
    pub global_step: u64,
    /// Fractional epochs completed.
    pub progress: f32,
    /// Loss of the latest step.
    pub last_loss: Option<f32>,
}

impl Default for TrainingProgress {
    fn default() -> Self {
        Self {
            state: TrainingState::Idle,
            global_step: 0,
            progress: 0.0,
            last_loss: None,
        }
    }
}

/// Runs epochs of mini-batch gradient steps against a model.
#[derive(Debug)]
pub struct Trainer {
    config: TrainingConfig,
    hooks: HookList,
    progress_tx: watch::Sender<TrainingProgress>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Trainer {
    /// Creates a trainer with a [`LoggingHook`] at the configured interval.
    pub fn new(config: TrainingConfig) -> Self {
        let mut hooks = HookList::new();
        hooks.add(LoggingHook::new(config.log_every_n_steps));
        let (progress_tx, _) = watch::channel(TrainingProgress::default());
        Self {
            config,
            hooks,
            progress_tx,
            cancel_rx: None,
        }
    }

    /// Adds a hook.
    pub fn with_hook<H: Hook + 'static>(mut self, hook: H) -> Self {
        self.hooks.add(hook);
        self
    }

    /// Cancels the run at the next suspension point once `true` is sent.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel);
        self
    }

    /// Subscribes to progress snapshots.
    pub fn subscribe(&self) -> watch::Receiver<TrainingProgress> {
        self.progress_tx.subscribe()
    }

    /// The latest published progress.
    pub fn progress(&self) -> TrainingProgress {
        self.progress_tx.borrow().clone()
    }

    /// The current state.
    pub fn state(&self) -> TrainingState {
        self.progress_tx.borrow().state.clone()
    }

    /// The run configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Trains `model` on batches from `sampler` for the configured epochs.
    ///
    /// # Errors
    ///
    /// - [`TrainingError::Rec`] with `NumericDivergence`, `ShapeMismatch` or
    ///   `InsufficientData` from the failing step
    /// - [`TrainingError::Cancelled`] if cancellation was requested
    pub async fn train(
        &mut self,
        model: &mut TwoTowerModel,
        sampler: BatchSampler,
    ) -> Result<LossTrajectory> {
        let result = self.run(model, sampler).await;
        match &result {
            Ok(trajectory) => {
                self.publish(TrainingState::Completed, trajectory);
                info!(
                    steps = trajectory.len(),
                    final_loss = ?trajectory.last_loss(),
                    "Training completed"
                );
            }
            Err(e) => {
                warn!(error = %e, "Training failed");
                self.progress_tx.send_modify(|p| {
                    p.state = TrainingState::Failed {
                        reason: e.to_string(),
                    }
                });
            }
        }
        result
    }

    async fn run(
        &mut self,
        model: &mut TwoTowerModel,
        sampler: BatchSampler,
    ) -> Result<LossTrajectory> {
        self.config.validate()?;
        let mut trajectory = LossTrajectory::new(sampler.batches_per_epoch());
        self.publish(TrainingState::Preparing, &trajectory);
        info!(
            epochs = self.config.epochs,
            batches_per_epoch = sampler.batches_per_epoch(),
            examples = sampler.epoch_len(),
            loss_mode = model.loss_mode().name(),
            scorer = model.scorer().name(),
            "Starting training"
        );

        let mut sampler = sampler;
        for epoch in 0..self.config.epochs {
            let steps_before = trajectory.len();
            let action = if self.config.prefetch_capacity > 0 {
                let mut prefetched = PrefetchedEpoch::spawn(sampler, self.config.prefetch_capacity);
                let mut action = HookAction::Continue;
                while let Some(batch) = prefetched.next().await {
                    action = self.step(model, batch?, epoch, &mut trajectory).await?;
                    if action == HookAction::Stop {
                        break;
                    }
                }
                sampler = prefetched.finish().await?;
                action
            } else {
                let mut action = HookAction::Continue;
                for batch in sampler.stream() {
                    action = self.step(model, batch?, epoch, &mut trajectory).await?;
                    if action == HookAction::Stop {
                        break;
                    }
                }
                action
            };

            if trajectory.len() == steps_before {
                return Err(RecError::configuration(format!(
                    "epoch {} produced no trainable batch from {} interactions with batch_size {}",
                    epoch,
                    sampler.epoch_len(),
                    self.config.batch_size
                ))
                .into());
            }
            if action == HookAction::Stop {
                info!(epoch, "Stopping early at hook request");
                break;
            }

            if let Some(mean) = trajectory.epoch_mean(epoch) {
                info!(epoch, mean_loss = mean, "Epoch complete");
                if self.hooks.after_epoch(epoch, mean)? == HookAction::Stop {
                    break;
                }
            }
            if epoch + 1 < self.config.epochs {
                self.check_cancelled(epoch + 1, 0)?;
            }
            tokio::task::yield_now().await;
        }

        self.hooks.end(&trajectory)?;
        Ok(trajectory)
    }

    async fn step(
        &mut self,
        model: &mut TwoTowerModel,
        batch: Batch,
        epoch: usize,
        trajectory: &mut LossTrajectory,
    ) -> Result<HookAction> {
        self.check_cancelled(epoch, batch.index)?;
        if model.loss_mode() == LossMode::InBatchSoftmax && batch.len() < 2 {
            warn!(
                epoch,
                batch = batch.index,
                "Skipping single-example batch: in-batch softmax has no negatives"
            );
            tokio::task::yield_now().await;
            return Ok(HookAction::Continue);
        }

        self.progress_tx.send_modify(|p| {
            p.state = TrainingState::Running {
                epoch,
                batch: batch.index,
            }
        });
        let loss = model.train_step(&batch.as_step_input(), StepContext::new(epoch, batch.index))?;
        let point = trajectory.record(epoch, batch.index, loss);
        debug!(epoch, batch = batch.index, loss, "Batch done");

        self.progress_tx.send_modify(|p| {
            p.global_step = point.global_step + 1;
            p.progress = point.progress;
            p.last_loss = Some(loss);
        });
        let action = self.hooks.after_step(&point)?;
        tokio::task::yield_now().await;
        Ok(action)
    }

    fn check_cancelled(&self, epoch: usize, batch: usize) -> Result<()> {
        match &self.cancel_rx {
            Some(rx) if *rx.borrow() => Err(TrainingError::Cancelled { epoch, batch }),
            _ => Ok(()),
        }
    }

    fn publish(&self, state: TrainingState, trajectory: &LossTrajectory) {
        self.progress_tx.send_replace(TrainingProgress {
            state,
            global_step: trajectory.len() as u64,
            progress: trajectory.points().last().map_or(0.0, |p| p.progress),
            last_loss: trajectory.last_loss(),
        });
    }
}
