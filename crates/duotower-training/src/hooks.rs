//! Training hooks for observing and steering the training loop.
//!
//! Hooks run on the training task after every step and after every epoch.
//! Returning [`HookAction::Stop`] ends the run early; the run still counts as
//! completed.

use thiserror::Error;
use tracing::{debug, info};

use crate::metrics::{LossPoint, LossTrajectory};

/// Errors that can occur during hook execution.
#[derive(Debug, Error)]
pub enum HookError {
    /// A custom hook error.
    #[error("Hook error: {0}")]
    Custom(String),
}

/// Result type for hook operations.
pub type HookResult<T> = Result<T, HookError>;

/// Action to take after a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// Continue training normally.
    Continue,
    /// Stop training early.
    Stop,
}

/// Trait for training hooks.
///
/// # Examples
///
/// ```
/// use duotower_training::hooks::{Hook, HookAction, HookResult};
/// use duotower_training::LossPoint;
///
/// struct CountSteps(u64);
///
/// impl Hook for CountSteps {
///     fn name(&self) -> &str {
///         "count_steps"
///     }
///
///     fn after_step(&mut self, _point: &LossPoint) -> HookResult<HookAction> {
///         self.0 += 1;
///         Ok(HookAction::Continue)
///     }
/// }
/// ```
pub trait Hook: Send + Sync {
    /// Returns the name of this hook for logging purposes.
    fn name(&self) -> &str;

    /// Called after each optimizer step.
    fn after_step(&mut self, _point: &LossPoint) -> HookResult<HookAction> {
        Ok(HookAction::Continue)
    }

    /// Called after each epoch with its mean loss.
    fn after_epoch(&mut self, _epoch: usize, _mean_loss: f32) -> HookResult<HookAction> {
        Ok(HookAction::Continue)
    }

    /// Called once when the run completes.
    fn end(&mut self, _trajectory: &LossTrajectory) -> HookResult<()> {
        Ok(())
    }
}

/// Logs the step loss at regular intervals.
#[derive(Debug)]
pub struct LoggingHook {
    every_n_steps: u64,
    log_first_step: bool,
}

impl LoggingHook {
    /// Logs every `every_n_steps` steps (at least 1).
    pub fn new(every_n_steps: u64) -> Self {
        Self {
            every_n_steps: every_n_steps.max(1),
            log_first_step: true,
        }
    }

    /// Sets whether to log on the first step.
    pub fn with_log_first_step(mut self, log_first: bool) -> Self {
        self.log_first_step = log_first;
        self
    }

    fn should_log(&self, step: u64) -> bool {
        (step == 0 && self.log_first_step) || (step > 0 && step % self.every_n_steps == 0)
    }
}

impl Hook for LoggingHook {
    fn name(&self) -> &str {
        "logging_hook"
    }

    fn after_step(&mut self, point: &LossPoint) -> HookResult<HookAction> {
        if self.should_log(point.global_step) {
            info!(
                step = point.global_step,
                epoch = point.epoch,
                batch = point.batch,
                "Step {}: loss = {:.6}",
                point.global_step,
                point.loss
            );
        }
        Ok(HookAction::Continue)
    }

    fn end(&mut self, trajectory: &LossTrajectory) -> HookResult<()> {
        match trajectory.last_loss() {
            Some(loss) => info!(
                "Training finished after {} steps: final loss = {:.6}",
                trajectory.len(),
                loss
            ),
            None => info!("Training finished without any step"),
        }
        Ok(())
    }
}

/// Stops the run when the epoch mean loss stops improving.
///
/// # Examples
///
/// ```
/// use duotower_training::hooks::EarlyStoppingHook;
///
/// // Stop after 2 epochs without a 0.001 improvement.
/// let hook = EarlyStoppingHook::new(2, 0.001);
/// ```
#[derive(Debug)]
pub struct EarlyStoppingHook {
    patience: usize,
    min_delta: f32,
    best: Option<f32>,
    best_epoch: usize,
    epochs_without_improvement: usize,
}

impl EarlyStoppingHook {
    /// Creates a hook with the given patience (in epochs) and minimum improvement.
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience: patience.max(1),
            min_delta,
            best: None,
            best_epoch: 0,
            epochs_without_improvement: 0,
        }
    }

    /// Best epoch mean seen so far.
    pub fn best(&self) -> Option<f32> {
        self.best
    }
}

impl Hook for EarlyStoppingHook {
    fn name(&self) -> &str {
        "early_stopping_hook"
    }

    fn after_epoch(&mut self, epoch: usize, mean_loss: f32) -> HookResult<HookAction> {
        let improved = match self.best {
            None => true,
            Some(best) => mean_loss < best - self.min_delta,
        };
        if improved {
            debug!(
                "EarlyStoppingHook: loss improved from {:?} to {} at epoch {}",
                self.best, mean_loss, epoch
            );
            self.best = Some(mean_loss);
            self.best_epoch = epoch;
            self.epochs_without_improvement = 0;
            return Ok(HookAction::Continue);
        }

        self.epochs_without_improvement += 1;
        if self.epochs_without_improvement >= self.patience {
            info!(
                "EarlyStoppingHook: stopping at epoch {} (no improvement since epoch {})",
                epoch, self.best_epoch
            );
            return Ok(HookAction::Stop);
        }
        Ok(HookAction::Continue)
    }
}

/// A collection of hooks that are run together.
#[derive(Default)]
pub struct HookList {
    hooks: Vec<Box<dyn Hook>>,
}

impl HookList {
    /// Creates a new empty hook list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hook to the list.
    pub fn add<H: Hook + 'static>(&mut self, hook: H) {
        self.hooks.push(Box::new(hook));
    }

    /// Number of hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook's `after_step`; stops if any hook asks to.
    pub fn after_step(&mut self, point: &LossPoint) -> HookResult<HookAction> {
        let mut action = HookAction::Continue;
        for hook in &mut self.hooks {
            if hook.after_step(point)? == HookAction::Stop {
                debug!(hook = hook.name(), "Hook requested stop");
                action = HookAction::Stop;
            }
        }
        Ok(action)
    }

    /// Runs every hook's `after_epoch`; stops if any hook asks to.
    pub fn after_epoch(&mut self, epoch: usize, mean_loss: f32) -> HookResult<HookAction> {
        let mut action = HookAction::Continue;
        for hook in &mut self.hooks {
            if hook.after_epoch(epoch, mean_loss)? == HookAction::Stop {
                debug!(hook = hook.name(), "Hook requested stop");
                action = HookAction::Stop;
            }
        }
        Ok(action)
    }

    /// Runs every hook's `end`.
    pub fn end(&mut self, trajectory: &LossTrajectory) -> HookResult<()> {
        for hook in &mut self.hooks {
            hook.end(trajectory)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for HookList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(step: u64) -> LossPoint {
        LossPoint {
            epoch: 0,
            batch: step as usize,
            global_step: step,
            loss: 1.0,
            progress: 0.0,
        }
    }

    #[test]
    fn test_logging_hook_interval() {
        let hook = LoggingHook::new(10);
        assert!(hook.should_log(0));
        assert!(!hook.should_log(5));
        assert!(hook.should_log(20));
        let hook = LoggingHook::new(10).with_log_first_step(false);
        assert!(!hook.should_log(0));
    }

    #[test]
    fn test_early_stopping_patience() {
        let mut hook = EarlyStoppingHook::new(2, 0.01);
        assert_eq!(hook.after_epoch(0, 1.0).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(1, 0.5).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(2, 0.499).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(3, 0.6).unwrap(), HookAction::Stop);
        assert_eq!(hook.best(), Some(0.5));
    }

    struct StopAt(u64);

    impl Hook for StopAt {
        fn name(&self) -> &str {
            "stop_at"
        }

        fn after_step(&mut self, point: &LossPoint) -> HookResult<HookAction> {
            Ok(if point.global_step >= self.0 {
                HookAction::Stop
            } else {
                HookAction::Continue
            })
        }
    }

    #[test]
    fn test_hook_list_combines_actions() {
        let mut hooks = HookList::new();
        hooks.add(LoggingHook::new(1));
        hooks.add(StopAt(3));
        assert_eq!(hooks.len(), 2);
        assert_eq!(hooks.after_step(&point(1)).unwrap(), HookAction::Continue);
        assert_eq!(hooks.after_step(&point(3)).unwrap(), HookAction::Stop);
        assert!(hooks.end(&LossTrajectory::new(1)).is_ok());
    }
}
