use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{balanced_class_weights, SubModel, TrainingSet};
use crate::error::{IntegrityError, Result};

const CONVERGENCE_TOLERANCE: f64 = 1e-8;

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// L2-regularised logistic regression fitted by Newton iterations (IRLS).
///
/// The intercept is not penalised. Sample weights are class-balanced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    max_iter: usize,
    c: f64,
    intercept: f64,
    coefficients: Vec<f64>,
    fitted: bool,
}

impl LogisticRegression {
    pub fn new(max_iter: usize, c: f64) -> Self {
        Self {
            max_iter: max_iter.max(1),
            c,
            intercept: 0.0,
            coefficients: Vec::new(),
            fitted: false,
        }
    }

    #[cfg(test)]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Degenerate model: every row gets the observed positive rate.
    fn constant(&mut self, width: usize, rate: f64) {
        let rate = rate.clamp(1e-12, 1.0 - 1e-12);
        self.intercept = (rate / (1.0 - rate)).ln();
        self.coefficients = vec![0.0; width];
        self.fitted = true;
    }
}

impl SubModel for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic_regression"
    }

    fn fit(&mut self, data: &TrainingSet<'_>) -> Result<()> {
        if data.is_empty() {
            return Err(IntegrityError::EmptyDataset);
        }
        let n = data.len();
        let width = data.width();
        let positives = data.positives();
        if positives == 0 || positives == n {
            tracing::warn!("Logistic regression: single-class labels, fitting a constant model");
            self.constant(width, positives as f64 / n as f64);
            return Ok(());
        }

        let (negative_weight, positive_weight) = balanced_class_weights(data.labels);
        let sample_weights: Vec<f64> = data
            .labels
            .iter()
            .map(|l| if *l { positive_weight } else { negative_weight })
            .collect();
        let targets: Vec<f64> = data.labels.iter().map(|l| if *l { 1.0 } else { 0.0 }).collect();

        // Column 0 is the intercept.
        let design = DMatrix::from_fn(n, width + 1, |i, j| if j == 0 { 1.0 } else { data.features[(i, j - 1)] });
        let lambda = if self.c > 0.0 { 1.0 / self.c } else { 0.0 };
        let mut penalty = DMatrix::<f64>::identity(width + 1, width + 1) * lambda;
        penalty[(0, 0)] = 0.0;

        let mut beta = DVector::<f64>::zeros(width + 1);
        let mut iterations = 0;
        for _ in 0..self.max_iter {
            iterations += 1;
            let eta = &design * &beta;
            let p: Vec<f64> = eta.iter().map(|z| sigmoid(*z)).collect();

            let residual = DVector::from_fn(n, |i, _| sample_weights[i] * (targets[i] - p[i]));
            let gradient = design.transpose() * residual - &penalty * &beta;

            let curvature: Vec<f64> = (0..n).map(|i| sample_weights[i] * p[i] * (1.0 - p[i])).collect();
            let weighted = DMatrix::from_fn(n, width + 1, |i, j| design[(i, j)] * curvature[i]);
            let hessian = design.transpose() * weighted + &penalty;

            let Some(cholesky) = hessian.cholesky() else {
                tracing::warn!("Logistic regression: Hessian not positive definite after {} iterations", iterations);
                break;
            };
            let step = cholesky.solve(&gradient);
            beta += &step;
            if step.norm() < CONVERGENCE_TOLERANCE {
                break;
            }
        }

        self.intercept = beta[0];
        self.coefficients = beta.iter().skip(1).copied().collect();
        self.fitted = true;
        tracing::debug!("Logistic regression converged in {} iterations", iterations);
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn score(&self, row: &[f64]) -> Result<f64> {
        if !self.fitted {
            return Err(IntegrityError::NotFitted);
        }
        if row.len() != self.coefficients.len() {
            return Err(IntegrityError::Configuration(format!(
                "logistic regression was fitted on {} features, got {}",
                self.coefficients.len(),
                row.len()
            )));
        }
        let z = self.intercept + row.iter().zip(&self.coefficients).map(|(x, w)| x * w).sum::<f64>();
        Ok(sigmoid(z))
    }
}
