//! End-to-end training runs on small synthetic logs.

use duotower_core::{ItemRecord, LossMode, RawInteraction, RecError};
use duotower_optimizer::OptimizerConfig;
use duotower_training::{
    EarlyStoppingHook, RecommenderSession, Trainer, TrainingConfig, TrainingError, TrainingState,
};
use tokio::sync::watch;

/// 5 users, 8 items, 40 interactions; each user keeps returning to two items.
fn synthetic_log() -> Vec<RawInteraction> {
    let mut log = Vec::new();
    for user in 0..5i64 {
        for k in 0..8i64 {
            let item = (2 * user + k % 2) % 8;
            let rating = if k % 2 == 0 { 5.0 } else { 4.0 };
            log.push(RawInteraction::new(user, item, rating, user * 100 + k).unwrap());
        }
    }
    log
}

fn genre_catalog() -> Vec<ItemRecord> {
    (0..8i64)
        .map(|item| {
            let flags = if item % 2 == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] };
            ItemRecord::new(item, format!("Item {}", item))
                .with_side_features(flags)
                .unwrap()
        })
        .collect()
}

fn base_config() -> TrainingConfig {
    TrainingConfig::default()
        .with_embedding_dim(16)
        .with_epochs(10)
        .with_batch_size(8)
        .with_learning_rate(0.05)
        .with_seed(7)
}

#[tokio::test]
async fn test_softmax_loss_improves_over_ten_epochs() {
    let mut session = RecommenderSession::new(base_config(), synthetic_log(), Vec::new()).unwrap();
    let trajectory = session.train().await.unwrap();

    let means = trajectory.epoch_means();
    assert_eq!(means.len(), 10);
    assert_eq!(trajectory.len(), 50);
    assert!(means[9] < means[0], "epoch means: {:?}", means);
    assert!(session.is_trained());
}

#[tokio::test]
async fn test_bpr_loss_improves_without_prefetch() {
    let config = base_config()
        .with_loss_mode(LossMode::Bpr)
        .with_prefetch_capacity(0);
    let mut session = RecommenderSession::new(config, synthetic_log(), Vec::new()).unwrap();
    let means = session.train().await.unwrap().epoch_means();
    assert!(means[9] < means[0], "epoch means: {:?}", means);
}

#[tokio::test]
async fn test_fused_scorer_trains() {
    let config = base_config().with_side_features(true).with_hidden_dim(16);
    let mut session = RecommenderSession::new(config, synthetic_log(), genre_catalog()).unwrap();
    assert!(session.model().scorer().is_fused());
    let means = session.train().await.unwrap().epoch_means();
    assert!(means[9] < means[0], "epoch means: {:?}", means);
}

#[tokio::test]
async fn test_prefetch_and_inline_runs_are_identical() {
    let mut prefetched =
        RecommenderSession::new(base_config().with_epochs(3), synthetic_log(), Vec::new()).unwrap();
    let mut inline = RecommenderSession::new(
        base_config().with_epochs(3).with_prefetch_capacity(0),
        synthetic_log(),
        Vec::new(),
    )
    .unwrap();
    let a = prefetched.train().await.unwrap();
    let b = inline.train().await.unwrap();
    assert_eq!(a.points(), b.points());
}

#[tokio::test]
async fn test_single_distinct_positive_is_insufficient_data() {
    let log = vec![
        RawInteraction::new(1, 42, 5.0, 0).unwrap(),
        RawInteraction::new(2, 42, 3.0, 1).unwrap(),
    ];
    let config = TrainingConfig::default().with_embedding_dim(4).with_batch_size(2);
    let mut session = RecommenderSession::new(config.clone(), log, Vec::new()).unwrap();
    let mut trainer = Trainer::new(config);
    let progress = trainer.subscribe();

    let err = session.train_with(&mut trainer).await.unwrap_err();
    match err {
        TrainingError::Rec(RecError::InsufficientData { message }) => {
            assert!(message.contains("epoch 0, batch 0"), "{}", message);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        progress.borrow().state,
        TrainingState::Failed { .. }
    ));
    assert!(!session.is_trained());
}

#[tokio::test]
async fn test_divergence_is_fatal() {
    let config = base_config()
        .with_epochs(3)
        .with_optimizer(OptimizerConfig::Sgd {
            learning_rate: 1e30,
        });
    let mut session = RecommenderSession::new(config, synthetic_log(), Vec::new()).unwrap();
    let err = session.train().await.unwrap_err();
    let rec = err.as_rec().unwrap();
    assert!(matches!(rec, RecError::NumericDivergence { .. }), "{:?}", rec);
    assert!(rec.is_fatal());
}

#[tokio::test]
async fn test_progress_channel_reports_completion() {
    let config = base_config().with_epochs(2);
    let mut session = RecommenderSession::new(config.clone(), synthetic_log(), Vec::new()).unwrap();
    let mut trainer = Trainer::new(config);
    let progress = trainer.subscribe();
    assert_eq!(trainer.state(), TrainingState::Idle);

    let trajectory = session.train_with(&mut trainer).await.unwrap();
    let last = progress.borrow().clone();
    assert_eq!(last.state, TrainingState::Completed);
    assert_eq!(last.global_step, trajectory.len() as u64);
    assert_eq!(last.last_loss, trajectory.last_loss());
    assert!(last.state.is_terminal());
}

#[tokio::test]
async fn test_cancellation_is_honoured() {
    let config = base_config();
    let mut session = RecommenderSession::new(config.clone(), synthetic_log(), Vec::new()).unwrap();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut trainer = Trainer::new(config).with_cancellation(cancel_rx);
    cancel_tx.send(true).unwrap();

    let err = session.train_with(&mut trainer).await.unwrap_err();
    assert!(matches!(
        err,
        TrainingError::Cancelled { epoch: 0, batch: 0 }
    ));
}

#[tokio::test]
async fn test_early_stopping_hook_ends_run() {
    let config = base_config();
    let mut session = RecommenderSession::new(config.clone(), synthetic_log(), Vec::new()).unwrap();
    let mut trainer = Trainer::new(config).with_hook(EarlyStoppingHook::new(1, 1e9));
    let trajectory = session.train_with(&mut trainer).await.unwrap();
    assert_eq!(trajectory.epoch_means().len(), 2);
    assert_eq!(trainer.state(), TrainingState::Completed);
}

#[tokio::test]
async fn test_trainer_with_other_batching_is_rejected() {
    let config = base_config().with_epochs(2);
    let mut session = RecommenderSession::new(config.clone(), synthetic_log(), Vec::new()).unwrap();

    for other in [
        config.clone().with_batch_size(4),
        config.clone().with_loss_mode(LossMode::Bpr),
    ] {
        let mut trainer = Trainer::new(other);
        let err = session.train_with(&mut trainer).await.unwrap_err();
        let rec = err.as_rec().unwrap();
        assert!(matches!(rec, RecError::Configuration { .. }), "{:?}", rec);
        assert_eq!(trainer.state(), TrainingState::Idle);
    }
    assert!(!session.is_trained());

    // Epochs are the trainer's to choose.
    let mut trainer = Trainer::new(config.with_epochs(1));
    let trajectory = session.train_with(&mut trainer).await.unwrap();
    assert_eq!(trajectory.epoch_means().len(), 1);
}
