use crate::domain::errors::PipelineError;
use serde::{Deserialize, Serialize};

/// Feature matrix paired row-for-row with its target vector.
///
/// `row_ids` records the source row each observation came from, so ordering
/// and leakage can be checked after splits and resampling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub feature_names: Vec<String>,
    pub row_ids: Vec<usize>,
}

impl Dataset {
    pub fn new(
        features: Vec<Vec<f64>>,
        targets: Vec<f64>,
        feature_names: Vec<String>,
    ) -> Result<Self, PipelineError> {
        let row_ids = (0..features.len()).collect();
        Self::with_row_ids(features, targets, feature_names, row_ids)
    }

    pub fn with_row_ids(
        features: Vec<Vec<f64>>,
        targets: Vec<f64>,
        feature_names: Vec<String>,
        row_ids: Vec<usize>,
    ) -> Result<Self, PipelineError> {
        if features.len() != targets.len() {
            return Err(PipelineError::ShapeMismatch {
                context: "feature rows vs targets".to_string(),
                expected: features.len(),
                actual: targets.len(),
            });
        }
        if row_ids.len() != features.len() {
            return Err(PipelineError::ShapeMismatch {
                context: "feature rows vs row ids".to_string(),
                expected: features.len(),
                actual: row_ids.len(),
            });
        }
        if let Some(row) = features.iter().find(|row| row.len() != feature_names.len()) {
            return Err(PipelineError::ShapeMismatch {
                context: "feature row width".to_string(),
                expected: feature_names.len(),
                actual: row.len(),
            });
        }
        Ok(Self {
            features,
            targets,
            feature_names,
            row_ids,
        })
    }

    /// Empty dataset that keeps the column layout.
    pub fn empty_like(&self) -> Self {
        Self {
            features: Vec::new(),
            targets: Vec::new(),
            feature_names: self.feature_names.clone(),
            row_ids: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
            feature_names: self.feature_names.clone(),
            row_ids: indices.iter().map(|&i| self.row_ids[i]).collect(),
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> Self {
        let indices: Vec<usize> = (start..end.min(self.len())).collect();
        self.select_rows(&indices)
    }

    pub fn select_columns(&self, names: &[String]) -> Result<Self, PipelineError> {
        let indices = names
            .iter()
            .map(|name| {
                self.feature_names
                    .iter()
                    .position(|f| f == name)
                    .ok_or_else(|| PipelineError::MissingColumn {
                        column: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            features: self
                .features
                .iter()
                .map(|row| indices.iter().map(|&j| row[j]).collect())
                .collect(),
            targets: self.targets.clone(),
            feature_names: names.to_vec(),
            row_ids: self.row_ids.clone(),
        })
    }

    pub fn column(&self, index: usize) -> Vec<f64> {
        self.features.iter().map(|row| row[index]).collect()
    }

    /// (negatives, positives) for a binary target.
    pub fn class_counts(&self) -> (usize, usize) {
        let positives = self.targets.iter().filter(|&&t| t >= 0.5).count();
        (self.len() - positives, positives)
    }

    pub fn positive_rate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.class_counts().1 as f64 / self.len() as f64
    }
}

/// Three disjoint partitions of one dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub train: Dataset,
    pub validation: Dataset,
    pub test: Dataset,
}

impl DatasetSplit {
    pub fn total_len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}
