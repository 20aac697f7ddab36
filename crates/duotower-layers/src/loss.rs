//! Training objectives and their analytic gradients.
//!
//! Both losses take gathered user vectors, item vectors and biases for one
//! batch and return the scalar loss together with gradients for every input.
//! Nothing here mutates parameters; a step only applies the gradients once
//! the loss is known to be finite.

use duotower_core::RecError;
use hashbrown::HashSet;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::LayerResult;
use crate::scorer::pair_score;

/// Added inside the BPR logarithm.
pub const BPR_EPSILON: f32 = 1e-8;

/// Where in a training run a step happens. Carried into every error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepContext {
    /// Zero-based epoch.
    pub epoch: usize,
    /// Zero-based batch within the epoch.
    pub batch: usize,
}

impl StepContext {
    /// Creates a context.
    pub fn new(epoch: usize, batch: usize) -> Self {
        Self { epoch, batch }
    }

    /// A [`RecError::NumericDivergence`] at this step.
    pub fn divergence(&self, quantity: &str, value: f32) -> RecError {
        RecError::NumericDivergence {
            epoch: self.epoch,
            batch: self.batch,
            quantity: quantity.to_string(),
            value,
        }
    }

    /// A [`RecError::ShapeMismatch`] at this step.
    pub fn shape_mismatch(&self, expected: usize, actual: usize) -> RecError {
        RecError::ShapeMismatch {
            epoch: self.epoch,
            batch: self.batch,
            expected,
            actual,
        }
    }
}

/// Loss value and gradients for one batch.
#[derive(Debug, Clone)]
pub struct LossGradients {
    /// Mean loss over the batch.
    pub loss: f32,
    /// Gradient w.r.t. each user vector, `[B, d]`.
    pub users: Array2<f32>,
    /// Gradient w.r.t. each item vector passed in, same shape as the items.
    pub items: Array2<f32>,
    /// Gradient w.r.t. each user bias, `[B]`.
    pub user_bias: Array1<f32>,
    /// Gradient w.r.t. each item bias, one per item row.
    pub item_bias: Array1<f32>,
}

fn check_finite(values: impl IntoIterator<Item = f32>, ctx: StepContext, quantity: &str) -> LayerResult<()> {
    if let Some(bad) = values.into_iter().find(|v| !v.is_finite()) {
        return Err(ctx.divergence(quantity, bad).into());
    }
    Ok(())
}

/// Numerically stable logistic function.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Score matrix `L[r][c]` of every user row against every item row.
///
/// Each entry goes through [`pair_score`], so it is bit-identical to the
/// score retrieval computes for the same pair.
pub fn logits(
    users: ArrayView2<'_, f32>,
    items: ArrayView2<'_, f32>,
    user_bias: ArrayView1<'_, f32>,
    item_bias: ArrayView1<'_, f32>,
) -> Array2<f32> {
    Array2::from_shape_fn((users.nrows(), items.nrows()), |(r, c)| {
        pair_score(users.row(r), items.row(c), user_bias[r], item_bias[c])
    })
}

/// In-batch sampled softmax.
///
/// Logits are `L[r][c] = users[r] . items[c] + user_bias[r] + item_bias[c]`
/// and row `r`'s label is column `r`. The loss is the mean cross-entropy.
/// `positives` are the item indices behind the item rows; fewer than two
/// distinct values leave nothing to contrast against.
pub fn in_batch_softmax(
    users: ArrayView2<'_, f32>,
    items: ArrayView2<'_, f32>,
    user_bias: ArrayView1<'_, f32>,
    item_bias: ArrayView1<'_, f32>,
    positives: &[usize],
    ctx: StepContext,
) -> LayerResult<LossGradients> {
    let b = users.nrows();
    for actual in [items.nrows(), user_bias.len(), item_bias.len(), positives.len()] {
        if actual != b {
            return Err(ctx.shape_mismatch(b, actual).into());
        }
    }
    let distinct = positives.iter().collect::<HashSet<_>>().len();
    if distinct < 2 {
        return Err(RecError::insufficient_data(format!(
            "in-batch softmax at epoch {}, batch {} needs at least 2 distinct positive items, got {}",
            ctx.epoch, ctx.batch, distinct
        ))
        .into());
    }

    let mut logits = logits(users, items, user_bias, item_bias);
    check_finite(logits.iter().copied(), ctx, "score")?;

    let n = b as f32;
    let mut total = 0.0f32;
    // Turned into dL/dlogits in place: (softmax - onehot) / B.
    for (r, mut row) in logits.rows_mut().into_iter().enumerate() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        let sum_exp: f32 = row.iter().map(|&v| (v - max).exp()).sum();
        let lse = max + sum_exp.ln();
        total += lse - row[r];
        row.mapv_inplace(|v| (v - lse).exp() / n);
        row[r] -= 1.0 / n;
    }
    let loss = total / n;
    check_finite(std::iter::once(loss), ctx, "loss")?;

    let grad = logits;
    Ok(LossGradients {
        loss,
        users: grad.dot(&items),
        items: grad.t().dot(&users),
        user_bias: grad.sum_axis(Axis(1)),
        item_bias: grad.sum_axis(Axis(0)),
    })
}

/// Bayesian personalized ranking with one negative per positive.
///
/// `items` and `item_bias` hold the `B` positive rows followed by the `B`
/// negative rows. The loss is the mean of `-ln(sigmoid(s_pos - s_neg) + 1e-8)`.
pub fn bpr(
    users: ArrayView2<'_, f32>,
    items: ArrayView2<'_, f32>,
    user_bias: ArrayView1<'_, f32>,
    item_bias: ArrayView1<'_, f32>,
    ctx: StepContext,
) -> LayerResult<LossGradients> {
    let b = users.nrows();
    for actual in [items.nrows(), item_bias.len()] {
        if actual != 2 * b {
            return Err(ctx.shape_mismatch(2 * b, actual).into());
        }
    }
    if user_bias.len() != b {
        return Err(ctx.shape_mismatch(b, user_bias.len()).into());
    }
    if b == 0 {
        return Err(RecError::insufficient_data(format!(
            "empty batch at epoch {}, batch {}",
            ctx.epoch, ctx.batch
        ))
        .into());
    }

    let pos = items.slice(s![..b, ..]);
    let neg = items.slice(s![b.., ..]);
    let n = b as f32;

    let mut grad_users = Array2::zeros(users.raw_dim());
    let mut grad_items = Array2::zeros(items.raw_dim());
    let mut grad_user_bias = Array1::zeros(b);
    let mut grad_item_bias = Array1::zeros(2 * b);
    let mut total = 0.0f32;

    for r in 0..b {
        let u = users.row(r);
        let s_pos = pair_score(u, pos.row(r), user_bias[r], item_bias[r]);
        let s_neg = pair_score(u, neg.row(r), user_bias[r], item_bias[b + r]);
        check_finite([s_pos, s_neg], ctx, "score")?;

        let sig = sigmoid(s_pos - s_neg);
        total += -(sig + BPR_EPSILON).ln();
        // d/dx of -ln(sigmoid(x) + eps), scaled by 1/B.
        let g = -sig * (1.0 - sig) / (sig + BPR_EPSILON) / n;

        let diff = &pos.row(r) - &neg.row(r);
        grad_users.row_mut(r).assign(&(&diff * g));
        grad_items.row_mut(r).assign(&(&u * g));
        grad_items.row_mut(b + r).assign(&(&u * -g));
        grad_item_bias[r] = g;
        grad_item_bias[b + r] = -g;
        grad_user_bias[r] = 0.0;
    }
    let loss = total / n;
    check_finite(std::iter::once(loss), ctx, "loss")?;

    Ok(LossGradients {
        loss,
        users: grad_users,
        items: grad_items,
        user_bias: grad_user_bias,
        item_bias: grad_item_bias,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LayerError;
    use ndarray::array;

    fn softmax_loss(u: &Array2<f32>, i: &Array2<f32>, ib: &Array1<f32>) -> f32 {
        let ub = Array1::zeros(u.nrows());
        in_batch_softmax(u.view(), i.view(), ub.view(), ib.view(), &[0, 1, 2], StepContext::default())
            .unwrap()
            .loss
    }

    #[test]
    fn test_softmax_uniform_logits() {
        let u = Array2::<f32>::zeros((3, 2));
        let i = Array2::<f32>::zeros((3, 2));
        let ib = Array1::zeros(3);
        // All logits equal: loss = ln(B).
        assert!((softmax_loss(&u, &i, &ib) - 3.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_gradients_match_finite_difference() {
        let u = array![[0.3f32, -0.1], [0.2, 0.4], [-0.5, 0.1]];
        let i = array![[0.1f32, 0.2], [-0.3, 0.5], [0.4, -0.2]];
        let ib = array![0.05f32, -0.1, 0.2];
        let ub = Array1::zeros(3);
        let grads =
            in_batch_softmax(u.view(), i.view(), ub.view(), ib.view(), &[0, 1, 2], StepContext::default())
                .unwrap();

        let eps = 1e-2f32;
        for r in 0..3 {
            for c in 0..2 {
                let mut plus = u.clone();
                plus[[r, c]] += eps;
                let mut minus = u.clone();
                minus[[r, c]] -= eps;
                let numeric = (softmax_loss(&plus, &i, &ib) - softmax_loss(&minus, &i, &ib)) / (2.0 * eps);
                assert!((numeric - grads.users[[r, c]]).abs() < 1e-3);

                let mut plus = i.clone();
                plus[[r, c]] += eps;
                let mut minus = i.clone();
                minus[[r, c]] -= eps;
                let numeric = (softmax_loss(&u, &plus, &ib) - softmax_loss(&u, &minus, &ib)) / (2.0 * eps);
                assert!((numeric - grads.items[[r, c]]).abs() < 1e-3);
            }
            let mut plus = ib.clone();
            plus[r] += eps;
            let mut minus = ib.clone();
            minus[r] -= eps;
            let numeric = (softmax_loss(&u, &i, &plus) - softmax_loss(&u, &i, &minus)) / (2.0 * eps);
            assert!((numeric - grads.item_bias[r]).abs() < 1e-3);
        }
        // A per-row constant does not change a softmax.
        assert!(grads.user_bias.iter().all(|g| g.abs() < 1e-6));
    }

    #[test]
    fn test_softmax_duplicate_positives() {
        let u = Array2::<f32>::zeros((2, 2));
        let i = Array2::<f32>::zeros((2, 2));
        let z = Array1::<f32>::zeros(2);
        let err = in_batch_softmax(u.view(), i.view(), z.view(), z.view(), &[5, 5], StepContext::new(1, 3))
            .unwrap_err();
        match err {
            LayerError::Rec(RecError::InsufficientData { message }) => {
                assert!(message.contains("batch 3"));
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_softmax_non_finite() {
        let u = array![[f32::NAN, 0.0], [0.0, 0.0]];
        let i = Array2::<f32>::zeros((2, 2));
        let z = Array1::<f32>::zeros(2);
        let err = in_batch_softmax(u.view(), i.view(), z.view(), z.view(), &[0, 1], StepContext::new(2, 4))
            .unwrap_err();
        assert!(matches!(
            err,
            LayerError::Rec(RecError::NumericDivergence { epoch: 2, batch: 4, .. })
        ));
    }

    #[test]
    fn test_softmax_shape_mismatch() {
        let u = Array2::<f32>::zeros((2, 2));
        let i = Array2::<f32>::zeros((3, 2));
        let z2 = Array1::<f32>::zeros(2);
        let z3 = Array1::<f32>::zeros(3);
        let err = in_batch_softmax(u.view(), i.view(), z2.view(), z3.view(), &[0, 1], StepContext::default())
            .unwrap_err();
        assert!(matches!(
            err,
            LayerError::Rec(RecError::ShapeMismatch { expected: 2, actual: 3, .. })
        ));
    }

    fn bpr_loss(u: &Array2<f32>, i: &Array2<f32>) -> f32 {
        let ub = Array1::zeros(u.nrows());
        let ib = Array1::zeros(i.nrows());
        bpr(u.view(), i.view(), ub.view(), ib.view(), StepContext::default())
            .unwrap()
            .loss
    }

    #[test]
    fn test_bpr_zero_margin() {
        let u = array![[1.0f32, 0.0]];
        let i = array![[0.5f32, 0.5], [0.5, 0.5]];
        let expected = -(0.5f32 + BPR_EPSILON).ln();
        assert!((bpr_loss(&u, &i) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_bpr_gradients_match_finite_difference() {
        let u = array![[0.3f32, -0.1], [0.2, 0.4]];
        let i = array![[0.1f32, 0.2], [-0.3, 0.5], [0.4, -0.2], [0.0, 0.3]];
        let ub = Array1::zeros(2);
        let ib = Array1::zeros(4);
        let grads = bpr(u.view(), i.view(), ub.view(), ib.view(), StepContext::default()).unwrap();

        let eps = 1e-2f32;
        for r in 0..2 {
            for c in 0..2 {
                let mut plus = u.clone();
                plus[[r, c]] += eps;
                let mut minus = u.clone();
                minus[[r, c]] -= eps;
                let numeric = (bpr_loss(&plus, &i) - bpr_loss(&minus, &i)) / (2.0 * eps);
                assert!((numeric - grads.users[[r, c]]).abs() < 1e-3);
            }
        }
        for r in 0..4 {
            for c in 0..2 {
                let mut plus = i.clone();
                plus[[r, c]] += eps;
                let mut minus = i.clone();
                minus[[r, c]] -= eps;
                let numeric = (bpr_loss(&u, &plus) - bpr_loss(&u, &minus)) / (2.0 * eps);
                assert!((numeric - grads.items[[r, c]]).abs() < 1e-3);
            }
        }
        assert!((grads.item_bias[0] + grads.item_bias[2]).abs() < 1e-7);
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert_eq!(sigmoid(1000.0), 1.0);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-7);
    }
}
