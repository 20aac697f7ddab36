//! Loss trajectory recorded during training.

use serde::{Deserialize, Serialize};

/// Loss of one optimizer step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossPoint {
    /// Zero-based epoch.
    pub epoch: usize,
    /// Zero-based batch within the epoch.
    pub batch: usize,
    /// Steps taken before this one, across epochs.
    pub global_step: u64,
    /// Batch loss.
    pub loss: f32,
    /// `epoch + batch / batches_per_epoch`, for plotting.
    pub progress: f32,
}

/// Every recorded step loss of a run, in order.
///
/// # Example
///
/// ```
/// use duotower_training::LossTrajectory;
///
/// let mut trajectory = LossTrajectory::new(2);
/// trajectory.record(0, 0, 1.0);
/// trajectory.record(0, 1, 0.5);
/// trajectory.record(1, 0, 0.25);
/// assert_eq!(trajectory.epoch_means(), vec![0.75, 0.25]);
/// assert_eq!(trajectory.points()[1].progress, 0.5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossTrajectory {
    batches_per_epoch: usize,
    points: Vec<LossPoint>,
}

impl LossTrajectory {
    /// Creates an empty trajectory for epochs of `batches_per_epoch` batches.
    pub fn new(batches_per_epoch: usize) -> Self {
        Self {
            batches_per_epoch: batches_per_epoch.max(1),
            points: Vec::new(),
        }
    }

    /// Appends a step and returns the recorded point.
    pub fn record(&mut self, epoch: usize, batch: usize, loss: f32) -> LossPoint {
        let point = LossPoint {
            epoch,
            batch,
            global_step: self.points.len() as u64,
            loss,
            progress: epoch as f32 + batch as f32 / self.batches_per_epoch as f32,
        };
        self.points.push(point);
        point
    }

    /// All points in step order.
    pub fn points(&self) -> &[LossPoint] {
        &self.points
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if no step was recorded.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Batches per full epoch.
    pub fn batches_per_epoch(&self) -> usize {
        self.batches_per_epoch
    }

    /// Loss of the latest step.
    pub fn last_loss(&self) -> Option<f32> {
        self.points.last().map(|p| p.loss)
    }

    /// Mean loss of one epoch, if any step of it was recorded.
    pub fn epoch_mean(&self, epoch: usize) -> Option<f32> {
        let (sum, count) = self
            .points
            .iter()
            .filter(|p| p.epoch == epoch)
            .fold((0.0f64, 0usize), |(s, c), p| (s + f64::from(p.loss), c + 1));
        (count > 0).then(|| (sum / count as f64) as f32)
    }

    /// Mean loss of every epoch that recorded at least one step, in epoch order.
    pub fn epoch_means(&self) -> Vec<f32> {
        let mut epochs: Vec<usize> = self.points.iter().map(|p| p.epoch).collect();
        epochs.dedup();
        epochs
            .into_iter()
            .filter_map(|e| self.epoch_mean(e))
            .collect()
    }

    /// Condensed view for reports.
    pub fn summary(&self) -> TrajectorySummary {
        let means = self.epoch_means();
        TrajectorySummary {
            steps: self.points.len(),
            epochs: means.len(),
            first_epoch_mean: means.first().copied(),
            last_epoch_mean: means.last().copied(),
            final_loss: self.last_loss(),
            epoch_means: means,
        }
    }
}

/// Per-epoch view of a [`LossTrajectory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    /// Number of optimizer steps.
    pub steps: usize,
    /// Number of epochs with at least one step.
    pub epochs: usize,
    /// Mean loss of the first epoch.
    pub first_epoch_mean: Option<f32>,
    /// Mean loss of the last epoch.
    pub last_epoch_mean: Option<f32>,
    /// Loss of the final step.
    pub final_loss: Option<f32>,
    /// Mean loss per epoch.
    pub epoch_means: Vec<f32>,
}
