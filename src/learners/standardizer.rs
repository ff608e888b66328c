use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{IntegrityError, Result};

/// Per-column standardizer fitted once on the training matrix.
///
/// Scales are population standard deviations; a constant column keeps scale 1 so it maps to 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    pub fn fit(features: &DMatrix<f64>) -> Result<Self> {
        let n = features.nrows();
        if n == 0 {
            return Err(IntegrityError::EmptyDataset);
        }

        let mut means = Vec::with_capacity(features.ncols());
        let mut scales = Vec::with_capacity(features.ncols());
        for column in features.column_iter() {
            let mean = column.sum() / n as f64;
            let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
            let std = variance.sqrt();
            means.push(mean);
            scales.push(if std > 0.0 && std.is_finite() { std } else { 1.0 });
        }

        Ok(Self { means, scales })
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }

    #[cfg(test)]
    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    pub fn transform(&self, features: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.check_width(features.ncols())?;
        Ok(DMatrix::from_fn(features.nrows(), features.ncols(), |i, j| {
            (features[(i, j)] - self.means[j]) / self.scales[j]
        }))
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (mean, scale))| (v - mean) / scale)
            .collect())
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.width() {
            return Err(IntegrityError::Configuration(format!(
                "standardizer was fitted on {} features, got {}",
                self.width(),
                width
            )));
        }
        Ok(())
    }
}
