//! Two-dimensional projection of item vectors for inspection.
//!
//! Power-iteration PCA: center the sampled rows, find the dominant direction
//! of their covariance by repeated multiplication, deflate it out, and find
//! the next one the same way. The result is approximate (a fixed iteration
//! count, no convergence test) and is meant for plotting only.

use duotower_layers::TwoTowerModel;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Settings for [`EmbeddingProjector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorConfig {
    /// Power iterations per component.
    pub iterations: usize,
    /// Seed of the random start vectors.
    pub seed: u64,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            iterations: 40,
            seed: 42,
        }
    }
}

/// One projected item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    /// Dense item index.
    pub item_index: usize,
    /// Coordinate along the first principal direction.
    pub x: f32,
    /// Coordinate along the second principal direction.
    pub y: f32,
}

/// Power-iteration PCA to two dimensions.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingProjector {
    config: ProjectorConfig,
}

impl EmbeddingProjector {
    /// Creates a projector.
    pub fn new(config: ProjectorConfig) -> Self {
        Self { config }
    }

    /// Projects the first `sample_size` items of `model`, as its scorer sees them.
    pub fn project_model(
        &self,
        model: &TwoTowerModel,
        sample_size: usize,
    ) -> Result<Vec<ProjectedPoint>> {
        let indices: Vec<usize> = (0..sample_size.min(model.num_items())).collect();
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = model.item_vectors(&indices)?;
        let coords = self.project(vectors.view());
        Ok(indices
            .into_iter()
            .zip(coords)
            .map(|(item_index, (x, y))| ProjectedPoint { item_index, x, y })
            .collect())
    }

    /// Projects every row of `rows` onto its two leading principal directions.
    pub fn project(&self, rows: ArrayView2<'_, f32>) -> Vec<(f32, f32)> {
        let n = rows.nrows();
        let d = rows.ncols();
        if n == 0 {
            return Vec::new();
        }
        if d == 0 {
            return vec![(0.0, 0.0); n];
        }

        let Some(mean) = rows.mean_axis(Axis(0)) else {
            return Vec::new();
        };
        let centered = &rows - &mean.insert_axis(Axis(0));
        let denom = n.saturating_sub(1).max(1) as f32;
        let cov = centered.t().dot(&centered) / denom;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut deflated = cov.clone();
        let pc1 = self.dominant_direction(&deflated, None, &mut rng);
        let lambda1 = rayleigh(&deflated, &pc1);
        deflated -= &(outer(&pc1) * lambda1);
        let pc2 = self.dominant_direction(&deflated, Some(&pc1), &mut rng);

        // Order components by the variance they capture on the original data.
        let (pc1, pc2) = if rayleigh(&cov, &pc2) > rayleigh(&cov, &pc1) {
            (pc2, pc1)
        } else {
            (pc1, pc2)
        };
        debug!(
            items = n,
            dim = d,
            var1 = rayleigh(&cov, &pc1),
            var2 = rayleigh(&cov, &pc2),
            "Projected item vectors"
        );

        let xs = centered.dot(&pc1);
        let ys = centered.dot(&pc2);
        xs.into_iter().zip(ys).collect()
    }

    fn dominant_direction(
        &self,
        matrix: &Array2<f32>,
        orthogonal_to: Option<&Array1<f32>>,
        rng: &mut StdRng,
    ) -> Array1<f32> {
        let d = matrix.nrows();
        let mut v: Array1<f32> = (0..d).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        orthogonalize(&mut v, orthogonal_to);
        normalize(&mut v);
        for _ in 0..self.config.iterations {
            let mut next = matrix.dot(&v);
            orthogonalize(&mut next, orthogonal_to);
            if !normalize(&mut next) {
                // Zero variance left: any unit vector is as good as another.
                break;
            }
            v = next;
        }
        v
    }
}

fn rayleigh(matrix: &Array2<f32>, v: &Array1<f32>) -> f32 {
    v.dot(&matrix.dot(v))
}

fn outer(v: &Array1<f32>) -> Array2<f32> {
    let col = v.view().insert_axis(Axis(1));
    let row = v.view().insert_axis(Axis(0));
    col.dot(&row)
}

fn orthogonalize(v: &mut Array1<f32>, against: Option<&Array1<f32>>) {
    if let Some(u) = against {
        let proj = v.dot(u);
        v.scaled_add(-proj, u);
    }
}

/// Scales `v` to unit length; returns `false` if it is (numerically) zero.
fn normalize(v: &mut Array1<f32>) -> bool {
    let norm = v.dot(v).sqrt();
    if !norm.is_finite() || norm < 1e-12 {
        return false;
    }
    v.mapv_inplace(|x| x / norm);
    true
}
