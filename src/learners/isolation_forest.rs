use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{derive_seed, SubModel, TrainingSet};
use crate::error::{IntegrityError, Result};
use crate::utils::quantile;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average unsuccessful-search path length in a binary search tree of `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum IsolationNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// One isolation tree stored as a node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<IsolationNode>,
}

impl IsolationTree {
    fn grow(rows: &[Vec<f64>], height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let indices: Vec<usize> = (0..rows.len()).collect();
        tree.split(rows, indices, 0, height_limit, rng);
        tree
    }

    fn split(
        &mut self,
        rows: &[Vec<f64>],
        indices: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let slot = self.nodes.len();
        self.nodes.push(IsolationNode::Leaf { size: indices.len() });
        if depth >= height_limit || indices.len() <= 1 {
            return slot;
        }

        // Only columns that still vary inside this node can separate it.
        let width = rows[indices[0]].len();
        let ranges: Vec<(usize, f64, f64)> = (0..width)
            .filter_map(|feature| {
                let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(rows[i][feature]), hi.max(rows[i][feature]))
                });
                (hi > lo).then_some((feature, lo, hi))
            })
            .collect();
        if ranges.is_empty() {
            return slot;
        }

        let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| rows[i][feature] < threshold);

        let left = self.split(rows, left_rows, depth + 1, height_limit, rng);
        let right = self.split(rows, right_rows, depth + 1, height_limit, rng);
        self.nodes[slot] = IsolationNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                IsolationNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] < *threshold { *left } else { *right };
                    depth += 1.0;
                }
                IsolationNode::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

/// Min/max of the training batch's raw anomaly scores, fixed at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBounds {
    pub min: f64,
    pub max: f64,
}

impl ScoreBounds {
    /// Map a raw score into [0, 1]. A degenerate range maps everything to 0.
    pub fn normalize(&self, raw: f64) -> f64 {
        let span = self.max - self.min;
        if span <= f64::EPSILON {
            return 0.0;
        }
        ((raw - self.min) / span).clamp(0.0, 1.0)
    }
}

/// Isolation-based outlier detector.
///
/// Raw scores are `2^(-E[h(x)] / c(psi))`: close to 1 for points isolated in few splits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    n_trees: usize,
    max_samples: usize,
    contamination: f64,
    seed: u64,
    sample_size: usize,
    trees: Vec<IsolationTree>,
    bounds: Option<ScoreBounds>,
    /// Raw score at the `1 - contamination` quantile of the training batch.
    threshold: Option<f64>,
}

impl IsolationForest {
    pub fn new(n_trees: usize, max_samples: usize, contamination: f64, seed: u64) -> Self {
        Self {
            n_trees,
            max_samples,
            contamination,
            seed,
            sample_size: 0,
            trees: Vec::new(),
            bounds: None,
            threshold: None,
        }
    }

    pub fn bounds(&self) -> Option<ScoreBounds> {
        self.bounds
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn raw_score(&self, row: &[f64]) -> Result<f64> {
        if self.trees.is_empty() {
            return Err(IntegrityError::NotFitted);
        }
        let mean_path = self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c <= 0.0 {
            return Ok(0.5);
        }
        Ok(2f64.powf(-mean_path / c))
    }

    /// Whether a raw score falls in the expected contamination share.
    pub fn is_outlier(&self, raw: f64) -> bool {
        self.threshold.is_some_and(|t| raw >= t)
    }
}

impl SubModel for IsolationForest {
    fn name(&self) -> &'static str {
        "isolation_forest"
    }

    fn fit(&mut self, data: &TrainingSet<'_>) -> Result<()> {
        if data.is_empty() {
            return Err(IntegrityError::EmptyDataset);
        }
        let rows: Vec<Vec<f64>> = (0..data.len())
            .map(|i| data.features.row(i).iter().copied().collect())
            .collect();

        let n = rows.len();
        let psi = self.max_samples.clamp(1, n);
        let height_limit = (psi as f64).log2().ceil().max(1.0) as usize;

        let seed = self.seed;
        self.trees = (0..self.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(derive_seed(seed, t));
                let subsample: Vec<Vec<f64>> = sample(&mut rng, n, psi)
                    .into_iter()
                    .map(|i| rows[i].clone())
                    .collect();
                IsolationTree::grow(&subsample, height_limit, &mut rng)
            })
            .collect();
        self.sample_size = psi;

        let raw: Vec<f64> = rows.iter().map(|r| self.raw_score(r)).collect::<Result<_>>()?;
        let min = raw.iter().copied().fold(f64::INFINITY, f64::min);
        let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.bounds = Some(ScoreBounds { min, max });
        self.threshold = quantile(&raw, 1.0 - self.contamination);

        tracing::debug!(
            "Isolation forest: {} trees, {} samples per tree, raw score range [{:.4}, {:.4}]",
            self.trees.len(),
            psi,
            min,
            max
        );
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty() && self.bounds.is_some()
    }

    fn score(&self, row: &[f64]) -> Result<f64> {
        let bounds = self.bounds.ok_or(IntegrityError::NotFitted)?;
        Ok(bounds.normalize(self.raw_score(row)?))
    }
}
