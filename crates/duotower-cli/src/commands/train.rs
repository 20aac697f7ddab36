//! Train Command Implementation

use anyhow::{Context, Result};
use clap::Args;
use duotower_training::Trainer;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use super::common::{print_json, SessionArgs};

/// Train a model and print its loss trajectory summary
///
/// # Example
///
/// ```bash
/// duotower train --data-dir ml-100k --epochs 10 --loss bpr
/// ```
#[derive(Args, Debug, Clone)]
pub struct TrainCommand {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Also print every recorded step
    #[arg(long)]
    pub full: bool,
}

#[derive(Serialize)]
struct TrainOutput<T: Serialize> {
    users: usize,
    items: usize,
    interactions: usize,
    scorer: &'static str,
    trajectory: T,
}

impl TrainCommand {
    /// Execute the train command
    pub async fn run(&self) -> Result<()> {
        let mut session = self.session.session()?;
        let config = session.config().clone();
        info!(
            epochs = config.epochs,
            batch_size = config.batch_size,
            loss = config.loss_mode.name(),
            "Starting training"
        );

        // Ctrl-C stops the run between batches instead of killing the process.
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut trainer = Trainer::new(config).with_cancellation(cancel_rx);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling training");
                let _ = cancel_tx.send(true);
            }
        });

        let trajectory = session
            .train_with(&mut trainer)
            .await
            .context("Training failed")?;

        let users = session.users().len();
        let items = session.items().len();
        let interactions = session.interactions().len();
        let scorer = session.model().scorer().name();
        if self.full {
            print_json(&TrainOutput {
                users,
                items,
                interactions,
                scorer,
                trajectory,
            })
        } else {
            print_json(&TrainOutput {
                users,
                items,
                interactions,
                scorer,
                trajectory: trajectory.summary(),
            })
        }
    }
}
