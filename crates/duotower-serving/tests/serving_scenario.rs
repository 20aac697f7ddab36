//! Serving against small trained sessions.

use duotower_core::{ItemRecord, RawId, RawInteraction, RecError};
use duotower_serving::{
    popularity, EvaluationConfig, ProjectorConfig, QueryOutcome, RecommenderService,
};
use duotower_training::{RecommenderSession, TrainingConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

const A: RawId = 1;
const B: RawId = 2;
const C: RawId = 3;

// Ids are chosen so that y sorts before x and wins their tie on mean rating.
const W: RawId = 10;
const Y: RawId = 20;
const Z: RawId = 30;
const X: RawId = 40;

fn scenario_log() -> Vec<RawInteraction> {
    [
        (A, W, 5.0),
        (A, X, 2.0),
        (B, X, 4.0),
        (B, Y, 5.0),
        (C, Y, 1.0),
        (C, Z, 5.0),
    ]
    .iter()
    .enumerate()
    .map(|(ts, &(u, i, r))| RawInteraction::new(u, i, r, ts as i64).unwrap())
    .collect()
}

fn scenario_catalog() -> Vec<ItemRecord> {
    vec![
        ItemRecord::new(W, "Wings (1927)")
            .with_genres(["Drama", "War"])
            .with_side_features(vec![1.0, 1.0, 0.0])
            .unwrap(),
        ItemRecord::new(X, "Xanadu (1980)")
            .with_genres(["Musical", "Comedy"])
            .with_side_features(vec![0.0, 0.0, 1.0])
            .unwrap(),
        ItemRecord::new(Y, "Young Frankenstein (1974)")
            .with_genres(["Comedy", "Horror"])
            .with_side_features(vec![0.0, 0.0, 1.0])
            .unwrap(),
        ItemRecord::new(Z, "Zulu (1964)")
            .with_genres(["Drama", "War"])
            .with_side_features(vec![1.0, 1.0, 0.0])
            .unwrap(),
    ]
}

fn config() -> TrainingConfig {
    TrainingConfig::default()
        .with_embedding_dim(8)
        .with_epochs(3)
        .with_batch_size(6)
        .with_seed(11)
}

async fn trained(config: TrainingConfig) -> RecommenderSession {
    let mut session = RecommenderSession::new(config, scenario_log(), scenario_catalog()).unwrap();
    session.train().await.unwrap();
    session
}

fn ids(session: &RecommenderSession, indices: impl Iterator<Item = usize>) -> Vec<RawId> {
    indices.map(|i| session.item_id(i).unwrap()).collect()
}

#[tokio::test]
async fn test_popularity_ranks_x_last() {
    let session = trained(config()).await;
    let ranked = popularity(session.interactions(), session.items().len());
    assert_eq!(ids(&session, ranked.iter().map(|p| p.item_index)), vec![W, Z, Y, X]);
}

#[tokio::test]
async fn test_harness_excludes_rated_items() {
    let session = trained(config()).await;
    let service = RecommenderService::new(&session).unwrap();
    let harness = service.harness(EvaluationConfig {
        min_interactions: 2,
        ..EvaluationConfig::default()
    });
    assert_eq!(harness.qualifying_users().len(), 3);

    let report = harness.evaluate_user(A).unwrap();
    assert_eq!(report.interactions, 2);
    assert_eq!(ids(&session, report.history.iter().map(|h| h.item_index)), vec![W, X]);

    let mut offered = ids(&session, report.model.iter().map(|s| s.item_index));
    offered.sort_unstable();
    assert_eq!(offered, vec![Y, Z]);
    assert_eq!(ids(&session, report.popularity.iter().map(|p| p.item_index)), vec![Z, Y]);
    assert!(report.dot_only.is_none());

    let mut rng = StdRng::seed_from_u64(5);
    let sampled = harness.evaluate_random(&mut rng).unwrap();
    assert!(sampled.user_index < 3);
}

#[tokio::test]
async fn test_no_qualifying_user() {
    let session = trained(config()).await;
    let service = RecommenderService::new(&session).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let err = service
        .evaluate(EvaluationConfig::default(), &mut rng)
        .unwrap_err();
    assert!(matches!(err.as_rec(), Some(RecError::InsufficientData { .. })));
}

#[tokio::test]
async fn test_recommendations_are_deterministic_and_match_scoring() {
    let session = trained(config()).await;
    let service = RecommenderService::new(&session).unwrap().with_chunk_size(1);

    let first = service.recommend(B, 10).unwrap();
    let second = service.recommend(B, 10).unwrap();
    assert_eq!(first, second);

    let mut offered: Vec<RawId> = first.iter().map(|r| r.item_id).collect();
    offered.sort_unstable();
    assert_eq!(offered, vec![W, Z]);
    assert!(first[0].score >= first[1].score);
    assert!(!first[0].title.is_empty());

    let item_ids: Vec<RawId> = first.iter().map(|r| r.item_id).collect();
    let direct = service.score(B, &item_ids).unwrap();
    let served: Vec<f32> = first.iter().map(|r| r.score).collect();
    assert_eq!(direct, served);
}

#[tokio::test]
async fn test_boundary_errors() {
    let session = trained(config()).await;
    let service = RecommenderService::new(&session).unwrap();
    assert!(matches!(
        service.recommend(99, 5).unwrap_err().as_rec(),
        Some(RecError::UnknownIdentifier { .. })
    ));
    assert!(matches!(
        service.recommend(A, 0).unwrap_err().as_rec(),
        Some(RecError::Configuration { .. })
    ));

    let untrained = RecommenderSession::new(config(), scenario_log(), Vec::new()).unwrap();
    assert!(matches!(
        RecommenderService::new(&untrained).unwrap_err().as_rec(),
        Some(RecError::Configuration { .. })
    ));
}

#[tokio::test]
async fn test_projection_keyed_by_item_id() {
    let session = trained(config()).await;
    let service = RecommenderService::new(&session).unwrap();
    let points = service.project(10, ProjectorConfig::default()).unwrap();
    assert_eq!(points.len(), 4);
    assert_eq!(
        points.iter().map(|p| p.item_id).collect::<Vec<_>>(),
        vec![W, Y, Z, X]
    );
    assert_eq!(points[0].title, "Wings (1927)");
    assert!(points.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
}

#[tokio::test]
async fn test_text_query() {
    let session = trained(config()).await;
    let service = RecommenderService::new(&session).unwrap();

    let outcome = service.query("war drama", 10).unwrap();
    assert!(matches!(outcome, QueryOutcome::Genre(_)));
    assert_eq!(ids(&session, outcome.hits().iter().map(|h| h.item_index)), vec![W, Z]);

    let outcome = service.query("frankenstein", 10).unwrap();
    assert!(matches!(outcome, QueryOutcome::Title(_)));
    assert_eq!(ids(&session, outcome.hits().iter().map(|h| h.item_index)), vec![Y]);

    assert_eq!(service.query("western", 10).unwrap(), QueryOutcome::NoMatch);
}

#[tokio::test]
async fn test_fused_session_reports_dot_only_list() {
    let session = trained(config().with_side_features(true).with_hidden_dim(8)).await;
    assert!(session.model().scorer().is_fused());
    let service = RecommenderService::new(&session).unwrap();
    let report = service
        .harness(EvaluationConfig {
            min_interactions: 2,
            ..EvaluationConfig::default()
        })
        .evaluate_user(C)
        .unwrap();

    let dot_only = report.dot_only.unwrap();
    let mut offered = ids(&session, dot_only.iter().map(|s| s.item_index));
    offered.sort_unstable();
    assert_eq!(offered, vec![W, X]);
}
