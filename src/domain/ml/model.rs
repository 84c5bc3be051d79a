use crate::domain::errors::ModelError;
use crate::domain::ml::dataset::Dataset;
use crate::domain::ml::metrics::MetricsRecord;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Learning task a model family solves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Task {
    Regression,
    Classification,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Regression => write!(f, "regression"),
            Task::Classification => write!(f, "classification"),
        }
    }
}

impl FromStr for Task {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "regression" => Ok(Task::Regression),
            "classification" => Ok(Task::Classification),
            _ => Err(anyhow!(
                "Invalid task: {}. Must be 'regression' or 'classification'",
                s
            )),
        }
    }
}

/// Shared, read-only inputs every fit receives
#[derive(Debug, Clone, Copy)]
pub struct FitContext {
    pub seed: u64,
    pub sequence_length: usize,
}

impl Default for FitContext {
    fn default() -> Self {
        Self {
            seed: 42,
            sequence_length: 10,
        }
    }
}

/// A fitted model. Outputs a regression value, or the positive-class
/// probability for classification, per input row.
///
/// Models that consume context rows (sequence windows) return fewer values
/// than rows; the returned values align with the tail of the input.
pub trait FittedModel: Send + Sync {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError>;
}

/// One family of models with a fixed hyperparameter configuration.
///
/// Families are registered once in the catalog; adding a family never
/// touches the trainer.
pub trait ModelFamily: Send + Sync {
    fn name(&self) -> &'static str;

    fn task(&self) -> Task;

    /// Fit a standard scaler on the training partition and apply it everywhere.
    fn needs_scaling(&self) -> bool {
        false
    }

    /// Train on the minority-oversampled training partition.
    fn needs_balanced_classes(&self) -> bool {
        false
    }

    /// Tree families get permutation importances.
    fn reports_importance(&self) -> bool {
        false
    }

    /// Leading rows consumed before the first prediction.
    fn context_rows(&self, _ctx: &FitContext) -> usize {
        0
    }

    /// Structural precondition check. `Some(reason)` is a skip, not a failure.
    fn skip_reason(&self, _train: &Dataset, _validation: &Dataset, _ctx: &FitContext) -> Option<String> {
        None
    }

    fn fit(&self, train: &Dataset, ctx: &FitContext) -> Result<Box<dyn FittedModel>, ModelError>;
}

/// Result of asking the trainer for one model
#[derive(Debug)]
pub enum TrainingOutcome {
    Trained(MetricsRecord),
    Skipped(String),
    Failed(ModelError),
}

impl TrainingOutcome {
    pub fn metrics(&self) -> Option<&MetricsRecord> {
        match self {
            TrainingOutcome::Trained(record) => Some(record),
            _ => None,
        }
    }
}

/// Lifecycle of a registry slot: untrained, training, then trained, failed or skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelStatus {
    Untrained,
    Training,
    Trained,
    Failed(String),
    Skipped(String),
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::Untrained => write!(f, "untrained"),
            ModelStatus::Training => write!(f, "training"),
            ModelStatus::Trained => write!(f, "trained"),
            ModelStatus::Failed(reason) => write!(f, "failed: {}", reason),
            ModelStatus::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_parsing() {
        assert_eq!(Task::from_str("Regression").unwrap(), Task::Regression);
        assert!(Task::from_str("ranking").is_err());
    }

    #[test]
    fn test_status_display_distinguishes_skip_and_failure() {
        let skipped = ModelStatus::Skipped("needs 10 rows".to_string()).to_string();
        let failed = ModelStatus::Failed("singular matrix".to_string()).to_string();
        assert!(skipped.starts_with("skipped"));
        assert!(failed.starts_with("failed"));
    }
}
