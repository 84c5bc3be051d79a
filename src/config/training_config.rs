//! Trainer, feature builder and ensemble configuration.

use super::read_var;
use crate::domain::ml::EnsembleMethod;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub seed: u64,
    /// Stratified folds for classification cross-validation.
    pub cv_folds: usize,
    /// Time-series folds for regression; 0 disables.
    pub regression_cv_folds: usize,
    pub min_rows: usize,
    pub horizon: usize,
    pub sequence_length: usize,
    /// Model names to train; empty means every family for the task.
    pub models: Vec<String>,
    pub ensemble_method: EnsembleMethod,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            cv_folds: 5,
            regression_cv_folds: 0,
            min_rows: 30,
            horizon: 1,
            sequence_length: 10,
            models: Vec::new(),
            ensemble_method: EnsembleMethod::Mean,
        }
    }
}

impl TrainingConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let models = lookup("TRAINING_MODELS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            seed: read_var(lookup, "TRAINING_SEED", defaults.seed),
            cv_folds: read_var(lookup, "TRAINING_CV_FOLDS", defaults.cv_folds),
            regression_cv_folds: read_var(
                lookup,
                "TRAINING_REGRESSION_CV_FOLDS",
                defaults.regression_cv_folds,
            ),
            min_rows: read_var(lookup, "TRAINING_MIN_ROWS", defaults.min_rows),
            horizon: read_var(lookup, "FORECAST_HORIZON", defaults.horizon),
            sequence_length: read_var(lookup, "SEQUENCE_LENGTH", defaults.sequence_length),
            models,
            ensemble_method: read_var(lookup, "ENSEMBLE_METHOD", defaults.ensemble_method),
        }
    }
}
