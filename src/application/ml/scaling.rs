use crate::domain::errors::PipelineError;
use serde::{Deserialize, Serialize};

/// Per-column standardization fitted on the training partition only.
///
/// Zero-variance columns get unit scale so they map to 0 instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, PipelineError> {
        let first = rows
            .first()
            .ok_or_else(|| PipelineError::insufficient("standard scaler fit", 0, 1))?;
        let width = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; width];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut scales = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2);
            }
        }
        for s in scales.iter_mut() {
            let std = (*s / n).sqrt();
            *s = if std > f64::EPSILON { std } else { 1.0 };
        }

        Ok(Self { means, scales })
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, PipelineError> {
        if let Some(row) = rows.iter().find(|r| r.len() != self.width()) {
            return Err(PipelineError::ShapeMismatch {
                context: "standard scaler input width".to_string(),
                expected: self.width(),
                actual: row.len(),
            });
        }
        Ok(rows.iter().map(|r| self.transform_row(r)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaler_standardizes_training_columns() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        let out = scaler.transform(&rows).unwrap();
        assert!((out[0][0] + 1.0).abs() < 1e-12);
        assert!((out[1][0] - 1.0).abs() < 1e-12);
        // Constant column maps to zero
        assert_eq!(out[0][1], 0.0);
    }

    #[test]
    fn test_scaler_rejects_wrong_width() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0]]).unwrap();
        assert!(scaler.transform(&[vec![1.0]]).is_err());
        assert!(StandardScaler::fit(&[]).is_err());
    }
}
