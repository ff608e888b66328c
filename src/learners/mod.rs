pub mod isolation_forest;
pub mod logistic;
pub mod metrics;
pub mod random_forest;
pub mod standardizer;

pub use isolation_forest::*;
pub use logistic::*;
pub use metrics::*;
pub use random_forest::*;
pub use standardizer::*;

use nalgebra::DMatrix;

use crate::error::Result;

/// Standardized rows plus the synthetic labels they were derived with.
pub struct TrainingSet<'a> {
    pub features: &'a DMatrix<f64>,
    pub labels: &'a [bool],
}

impl<'a> TrainingSet<'a> {
    pub fn new(features: &'a DMatrix<f64>, labels: &'a [bool]) -> Self {
        Self { features, labels }
    }

    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    pub fn width(&self) -> usize {
        self.features.ncols()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|l| **l).count()
    }
}

/// Common capability of the ensemble members.
///
/// Unsupervised members ignore the labels. Scores are always in [0, 1] and scoring an
/// unfitted member fails with `NotFitted`.
pub trait SubModel: Send + Sync {
    fn name(&self) -> &'static str;

    fn fit(&mut self, data: &TrainingSet<'_>) -> Result<()>;

    fn is_fitted(&self) -> bool;

    fn score(&self, row: &[f64]) -> Result<f64>;

    fn score_matrix(&self, rows: &DMatrix<f64>) -> Result<Vec<f64>> {
        (0..rows.nrows())
            .map(|i| {
                let row: Vec<f64> = rows.row(i).iter().copied().collect();
                self.score(&row)
            })
            .collect()
    }
}

/// Balanced class weights `n / (k * n_class)` over the `k` classes present; a missing class gets weight 1.
pub fn balanced_class_weights(labels: &[bool]) -> (f64, f64) {
    let n = labels.len() as f64;
    let positives = labels.iter().filter(|l| **l).count() as f64;
    let negatives = n - positives;
    let present = [negatives, positives].iter().filter(|c| **c > 0.0).count() as f64;
    let weight = |count: f64| if count > 0.0 { n / (present * count) } else { 1.0 };
    (weight(negatives), weight(positives))
}

/// Seed of the `index`-th member of a seeded ensemble; independent of thread scheduling.
pub(crate) fn derive_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add((index as u64).wrapping_mul(1_442_695_040_888_963_407))
        .wrapping_add(1)
}
