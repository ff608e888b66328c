use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Hold-out evaluation of one probabilistic classifier at a 0.5 cut.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierMetrics {
    pub samples: usize,
    pub positives: usize,
    /// `None` when the hold-out set has a single class.
    pub auc: Option<f64>,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

pub fn evaluate_classifier(probabilities: &[f64], labels: &[bool]) -> ClassifierMetrics {
    let n = probabilities.len().min(labels.len());
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (p, y) in probabilities.iter().zip(labels).take(n) {
        match (*p >= 0.5, *y) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    ClassifierMetrics {
        samples: n,
        positives: labels.iter().take(n).filter(|y| **y).count(),
        auc: roc_auc(&probabilities[..n], &labels[..n]),
        precision,
        recall,
        f1,
    }
}

/// Area under the ROC curve via the rank-sum statistic; tied scores share their mean rank.
pub fn roc_auc(scores: &[f64], labels: &[bool]) -> Option<f64> {
    let positives = labels.iter().filter(|y| **y).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 || scores.len() != labels.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based: the tie group covers start+1 ..= end.
        let mean_rank = (start + 1 + end) as f64 / 2.0;
        positive_rank_sum += order[start..end].iter().filter(|&&i| labels[i]).count() as f64 * mean_rank;
        start = end;
    }

    let p = positives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Some(u / (p * negatives as f64))
}

/// Stratified train/test split. Returns sorted (train, test) row indices.
///
/// Each class contributes `round(test_size * count)` rows to the test side, but never its
/// only row, so a non-empty class always reaches the training side.
pub fn stratified_split(labels: &[bool], test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for class in [false, true] {
        let mut members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        members.shuffle(&mut rng);
        let held_out = ((members.len() as f64 * test_size).round() as usize).min(members.len().saturating_sub(1));
        test.extend_from_slice(&members[..held_out]);
        train.extend_from_slice(&members[held_out..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}
