//! Background batch production.
//!
//! [`PrefetchedEpoch::spawn`] moves a [`BatchSampler`] onto a blocking worker
//! that shuffles and assembles one epoch's batches into a bounded channel.
//! The training task pulls batches with [`PrefetchedEpoch::next`] and is the
//! only party touching model parameters. When the epoch is drained (or the
//! consumer gives up), [`PrefetchedEpoch::finish`] hands the sampler back so
//! its RNG state carries over to the next epoch.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::batch::{Batch, BatchSampler};
use crate::error::{DataError, DataResult};

/// One epoch of batches being produced on a blocking worker.
#[derive(Debug)]
pub struct PrefetchedEpoch {
    receiver: mpsc::Receiver<DataResult<Batch>>,
    producer: JoinHandle<BatchSampler>,
    expected_batches: usize,
}

impl PrefetchedEpoch {
    /// Starts producing one epoch into a channel holding at most `capacity`
    /// batches. Must be called from within a tokio runtime.
    pub fn spawn(mut sampler: BatchSampler, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let expected_batches = sampler.batches_per_epoch();
        let producer = tokio::task::spawn_blocking(move || {
            let mut produced = 0usize;
            for batch in sampler.stream() {
                if sender.blocking_send(batch).is_err() {
                    debug!(produced, "Batch consumer went away, stopping producer");
                    break;
                }
                produced += 1;
            }
            sampler
        });
        Self {
            receiver,
            producer,
            expected_batches,
        }
    }

    /// Number of batches the epoch will yield if fully drained.
    pub fn expected_batches(&self) -> usize {
        self.expected_batches
    }

    /// Waits for the next batch; `None` once the epoch is exhausted.
    pub async fn next(&mut self) -> Option<DataResult<Batch>> {
        self.receiver.recv().await
    }

    /// Stops consuming and returns the sampler once the producer has exited.
    ///
    /// # Errors
    ///
    /// [`DataError::Producer`] if the worker panicked or was cancelled.
    pub async fn finish(self) -> DataResult<BatchSampler> {
        // Dropping the receiver unblocks a producer waiting on a full channel.
        drop(self.receiver);
        self.producer
            .await
            .map_err(|e| DataError::Producer(e.to_string()))
    }
}
