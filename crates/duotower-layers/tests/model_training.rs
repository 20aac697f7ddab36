//! Whole-model training steps across optimizers and scorers.

use duotower_core::{InitializerConfig, LossMode, RecError};
use duotower_layers::{
    logits, EmbeddingStore, FeatureFusionTower, FusedFeatureScorer, LayerError, PlainEmbeddingScorer,
    Scorer, SideFeatureTable, StepContext, StepInput, TwoTowerModel,
};
use duotower_optimizer::OptimizerConfig;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

const USERS: [usize; 4] = [0, 1, 2, 3];
const POSITIVES: [usize; 4] = [0, 2, 4, 5];
const NEGATIVES: [usize; 4] = [1, 3, 5, 0];

fn side_table(num_items: usize) -> SideFeatureTable {
    let rows: Vec<Vec<f32>> = (0..num_items)
        .map(|i| if i % 2 == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
        .collect();
    SideFeatureTable::from_rows(
        num_items,
        2,
        rows.iter().enumerate().map(|(i, r)| (i, r.as_slice())),
    )
    .unwrap()
}

fn build(optimizer: &OptimizerConfig, loss: LossMode, fused: bool) -> TwoTowerModel {
    let mut rng = StdRng::seed_from_u64(3);
    let init = InitializerConfig::default();
    let store = EmbeddingStore::initialize(4, 6, 8, &init, true, optimizer, &mut rng).unwrap();
    let scorer: Box<dyn Scorer> = if fused {
        let tower = FeatureFusionTower::new(8, 2, 12, &init, optimizer, &mut rng).unwrap();
        Box::new(FusedFeatureScorer::new(tower, side_table(6)).unwrap())
    } else {
        Box::new(PlainEmbeddingScorer)
    };
    TwoTowerModel::new(store, scorer, loss)
}

fn input(loss: LossMode) -> StepInput<'static> {
    StepInput {
        users: &USERS,
        positives: &POSITIVES,
        negatives: match loss {
            LossMode::Bpr => Some(&NEGATIVES[..]),
            LossMode::InBatchSoftmax => None,
        },
        positive_side: None,
        negative_side: None,
    }
}

fn optimizers() -> Vec<OptimizerConfig> {
    vec![
        OptimizerConfig::Sgd { learning_rate: 0.5 },
        OptimizerConfig::Adagrad {
            learning_rate: 0.1,
            initial_accumulator: 0.1,
        },
        OptimizerConfig::adam(0.02),
    ]
}

#[test]
fn test_every_optimizer_lowers_loss() {
    for optimizer in optimizers() {
        for loss in [LossMode::InBatchSoftmax, LossMode::Bpr] {
            for fused in [false, true] {
                let mut model = build(&optimizer, loss, fused);
                let batch = input(loss);
                let first = model.train_step(&batch, StepContext::new(0, 0)).unwrap();
                let mut last = first;
                for step in 1..40 {
                    last = model.train_step(&batch, StepContext::new(0, step)).unwrap();
                }
                assert!(
                    last < first,
                    "{} {:?} fused={}: {} !< {}",
                    optimizer.name(),
                    loss,
                    fused,
                    last,
                    first
                );
            }
        }
    }
}

#[test]
fn test_trained_scores_agree_with_vectors() {
    let optimizer = OptimizerConfig::adam(0.02);
    let mut model = build(&optimizer, LossMode::InBatchSoftmax, true);
    let batch = input(LossMode::InBatchSoftmax);
    for step in 0..10 {
        model.train_step(&batch, StepContext::new(0, step)).unwrap();
    }

    let items: Vec<usize> = (0..6).collect();
    let vectors: Array2<f32> = model.item_vectors(&items).unwrap();
    let user = model.store().users().row(2).unwrap();
    let user_bias = model.store().users().bias(2).unwrap();
    let scores = model.score_items(2, &items).unwrap();
    for (i, score) in scores.iter().enumerate() {
        let expected = user.dot(&vectors.row(i)) + user_bias + model.store().items().bias(i).unwrap();
        assert!((expected - score).abs() < 1e-5, "item {}: {} vs {}", i, expected, score);
    }
    assert_eq!(scores, model.score_items(2, &items).unwrap());

    // The fused vectors differ from the raw rows they were built from.
    let plain = model
        .score_items_with(&PlainEmbeddingScorer, 2, &items)
        .unwrap();
    assert_ne!(plain, scores);
}

#[test]
fn test_duplicate_positives_leave_model_unchanged() {
    let optimizer = OptimizerConfig::adam(0.02);
    let mut model = build(&optimizer, LossMode::InBatchSoftmax, true);
    let items: Vec<usize> = (0..6).collect();
    let before = model.score_items(0, &items).unwrap();

    let batch = StepInput {
        users: &[0, 1],
        positives: &[4, 4],
        negatives: None,
        positive_side: None,
        negative_side: None,
    };
    let err = model.train_step(&batch, StepContext::new(3, 7)).unwrap_err();
    match err {
        LayerError::Rec(RecError::InsufficientData { message }) => {
            assert!(message.contains("epoch 3, batch 7"), "{}", message)
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(before, model.score_items(0, &items).unwrap());

    // The scorer recovers for the next valid step.
    model
        .train_step(&input(LossMode::InBatchSoftmax), StepContext::new(3, 8))
        .unwrap();
}

#[test]
fn test_softmax_logits_match_retrieval_scores_exactly() {
    let optimizer = OptimizerConfig::adam(0.02);
    for fused in [false, true] {
        let mut model = build(&optimizer, LossMode::InBatchSoftmax, fused);
        let batch = input(LossMode::InBatchSoftmax);
        for step in 0..5 {
            model.train_step(&batch, StepContext::new(0, step)).unwrap();
        }

        let users: Vec<usize> = (0..4).collect();
        let items: Vec<usize> = (0..6).collect();
        let matrix = logits(
            model.store().users().gather(&users).unwrap().view(),
            model.item_vectors(&items).unwrap().view(),
            model.store().users().bias_gather(&users).unwrap().view(),
            model.store().items().bias_gather(&items).unwrap().view(),
        );
        for &user in &users {
            let scores = model.score_items(user, &items).unwrap();
            for (c, score) in scores.iter().enumerate() {
                assert_eq!(
                    matrix[[user, c]].to_bits(),
                    score.to_bits(),
                    "fused={} user {} item {}",
                    fused,
                    user,
                    c
                );
            }
        }
    }
}
