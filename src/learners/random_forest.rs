use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{balanced_class_weights, derive_seed, SubModel, TrainingSet};
use crate::error::{IntegrityError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        probability: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => node = if row[*feature] <= *threshold { *left } else { *right },
                TreeNode::Leaf { probability } => return *probability,
            }
        }
    }
}

/// Growth settings shared by every tree of one fit.
struct Grower<'a> {
    data: &'a TrainingSet<'a>,
    weights: &'a [f64],
    max_depth: usize,
    min_samples_leaf: usize,
    max_features: usize,
}

struct Split {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
    decrease: f64,
}

impl Grower<'_> {
    fn value(&self, sample: usize, feature: usize) -> f64 {
        self.data.features[(sample, feature)]
    }

    /// Weighted totals (all, positive) of a node.
    fn totals(&self, samples: &[usize]) -> (f64, f64) {
        samples.iter().fold((0.0, 0.0), |(all, pos), &s| {
            let w = self.weights[s];
            (all + w, if self.data.labels[s] { pos + w } else { pos })
        })
    }

    fn grow(&self, samples: Vec<usize>, rng: &mut StdRng, importances: &mut [f64]) -> DecisionTree {
        let mut tree = DecisionTree { nodes: Vec::new() };
        self.build(&mut tree, samples, 0, rng, importances);
        tree
    }

    fn build(
        &self,
        tree: &mut DecisionTree,
        samples: Vec<usize>,
        depth: usize,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> usize {
        let (total, positive) = self.totals(&samples);
        let probability = if total > 0.0 { positive / total } else { 0.0 };
        let slot = tree.nodes.len();
        tree.nodes.push(TreeNode::Leaf { probability });

        let pure = positive <= 0.0 || positive >= total;
        if pure || depth >= self.max_depth || samples.len() < 2 * self.min_samples_leaf {
            return slot;
        }

        let Some(split) = self.best_split(&samples, total, positive, rng) else {
            return slot;
        };
        importances[split.feature] += split.decrease;

        let left = self.build(tree, split.left, depth + 1, rng, importances);
        let right = self.build(tree, split.right, depth + 1, rng, importances);
        tree.nodes[slot] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        slot
    }

    fn best_split(&self, samples: &[usize], total: f64, positive: f64, rng: &mut StdRng) -> Option<Split> {
        let width = self.data.width();
        let parent = total * gini(total, positive);
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in sample(rng, width, self.max_features.min(width)).into_iter() {
            let mut order: Vec<usize> = samples.to_vec();
            order.sort_by(|a, b| self.value(*a, feature).total_cmp(&self.value(*b, feature)));

            let (mut left_total, mut left_pos) = (0.0, 0.0);
            for k in 0..order.len() - 1 {
                let s = order[k];
                left_total += self.weights[s];
                if self.data.labels[s] {
                    left_pos += self.weights[s];
                }

                let left_count = k + 1;
                if left_count < self.min_samples_leaf || order.len() - left_count < self.min_samples_leaf {
                    continue;
                }
                let here = self.value(s, feature);
                let next = self.value(order[k + 1], feature);
                if next <= here {
                    continue;
                }

                let right_total = total - left_total;
                let right_pos = positive - left_pos;
                let children = left_total * gini(left_total, left_pos) + right_total * gini(right_total, right_pos);
                let decrease = parent - children;
                if decrease > 1e-12 && best.map_or(true, |(_, _, d)| decrease > d) {
                    best = Some((feature, here + (next - here) / 2.0, decrease));
                }
            }
        }

        let (feature, threshold, decrease) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) =
            samples.iter().copied().partition(|&s| self.value(s, feature) <= threshold);
        Some(Split {
            feature,
            threshold,
            left,
            right,
            decrease,
        })
    }
}

fn gini(total: f64, positive: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let p = positive / total;
    2.0 * p * (1.0 - p)
}

/// Bagged Gini decision trees with class-balanced sample weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    n_trees: usize,
    max_depth: usize,
    min_samples_leaf: usize,
    seed: u64,
    trees: Vec<DecisionTree>,
    importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(n_trees: usize, max_depth: usize, min_samples_leaf: usize, seed: u64) -> Self {
        Self {
            n_trees,
            max_depth,
            min_samples_leaf: min_samples_leaf.max(1),
            seed,
            trees: Vec::new(),
            importances: Vec::new(),
        }
    }

    /// Mean impurity decrease per feature, normalised to sum to 1 (all zero if no tree split).
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }
}

impl SubModel for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&mut self, data: &TrainingSet<'_>) -> Result<()> {
        if data.is_empty() {
            return Err(IntegrityError::EmptyDataset);
        }
        let n = data.len();
        let width = data.width();
        let (negative_weight, positive_weight) = balanced_class_weights(data.labels);
        let max_features = ((width as f64).sqrt().floor() as usize).max(1);
        let (seed, max_depth, min_samples_leaf) = (self.seed, self.max_depth, self.min_samples_leaf);

        let grown: Vec<(DecisionTree, Vec<f64>)> = (0..self.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(derive_seed(seed, t));
                let mut weights = vec![0.0; n];
                for _ in 0..n {
                    let s = rng.gen_range(0..n);
                    weights[s] += if data.labels[s] { positive_weight } else { negative_weight };
                }
                let samples: Vec<usize> = (0..n).filter(|&s| weights[s] > 0.0).collect();

                let grower = Grower {
                    data,
                    weights: &weights,
                    max_depth,
                    min_samples_leaf,
                    max_features,
                };
                let mut importances = vec![0.0; width];
                let tree = grower.grow(samples, &mut rng, &mut importances);
                let sum: f64 = importances.iter().sum();
                if sum > 0.0 {
                    importances.iter_mut().for_each(|v| *v /= sum);
                }
                (tree, importances)
            })
            .collect();

        let mut importances = vec![0.0; width];
        for (_, tree_importances) in &grown {
            for (acc, v) in importances.iter_mut().zip(tree_importances) {
                *acc += v;
            }
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            importances.iter_mut().for_each(|v| *v /= sum);
        }

        self.trees = grown.into_iter().map(|(tree, _)| tree).collect();
        self.importances = importances;
        tracing::debug!(
            "Random forest: {} trees, max depth {}, {} features per split",
            self.trees.len(),
            self.max_depth,
            max_features
        );
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn score(&self, row: &[f64]) -> Result<f64> {
        if self.trees.is_empty() {
            return Err(IntegrityError::NotFitted);
        }
        let total: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        Ok((total / self.trees.len() as f64).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    /// Positive when the first column is large; the second column is noise.
    fn separable() -> (DMatrix<f64>, Vec<bool>) {
        let mut values = Vec::new();
        let mut labels = Vec::new();
        for i in 0..80 {
            let signal = if i % 4 == 0 { 2.0 + (i % 3) as f64 * 0.1 } else { -1.0 + (i % 7) as f64 * 0.1 };
            values.extend_from_slice(&[signal, (i % 5) as f64]);
            labels.push(i % 4 == 0);
        }
        (DMatrix::from_row_slice(80, 2, &values), labels)
    }

    #[test]
    fn learns_a_separable_signal() {
        let (x, y) = separable();
        let mut forest = RandomForest::new(30, 10, 2, 42);
        forest.fit(&TrainingSet::new(&x, &y)).unwrap();

        assert!(forest.score(&[2.1, 1.0]).unwrap() > 0.8);
        assert!(forest.score(&[-0.8, 1.0]).unwrap() < 0.2);

        let importances = forest.feature_importances();
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn fitting_is_deterministic_across_threads() {
        let (x, y) = separable();
        let mut a = RandomForest::new(20, 6, 3, 7);
        let mut b = RandomForest::new(20, 6, 3, 7);
        a.fit(&TrainingSet::new(&x, &y)).unwrap();
        b.fit(&TrainingSet::new(&x, &y)).unwrap();
        assert_eq!(a.score_matrix(&x).unwrap(), b.score_matrix(&x).unwrap());
    }

    #[test]
    fn single_class_gives_constant_probability() {
        let (x, _) = separable();
        let y = vec![false; 80];
        let mut forest = RandomForest::new(5, 4, 2, 1);
        forest.fit(&TrainingSet::new(&x, &y)).unwrap();
        assert!(forest.score_matrix(&x).unwrap().iter().all(|p| *p == 0.0));
    }

    #[test]
    fn unfitted_forest_refuses_to_score() {
        let forest = RandomForest::new(5, 4, 2, 1);
        assert!(matches!(forest.score(&[0.0, 0.0]), Err(IntegrityError::NotFitted)));
    }
}
