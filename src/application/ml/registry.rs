//! Holds the trained models of one task, keyed by family name.
//!
//! A slot's status moves from untrained to training, then to trained, failed
//! or skipped. A failed or skipped retrain clears the slot's model so stale
//! weights are never served.

use crate::application::ml::ensemble::combine;
use crate::application::ml::scaling::StandardScaler;
use crate::domain::errors::{ModelError, PipelineError};
use crate::domain::ml::{
    EnsembleMethod, EnsemblePrediction, ErrorMetrics, FittedModel, MetricValue, MetricsRecord,
    ModelStatus, Task,
};
use std::collections::BTreeMap;
use tracing::warn;

/// A fitted model plus everything needed to serve it
pub struct TrainedModel {
    pub name: String,
    pub task: Task,
    pub model: Box<dyn FittedModel>,
    pub scaler: Option<StandardScaler>,
    pub feature_names: Vec<String>,
    pub metrics: MetricsRecord,
    pub feature_importance: Option<Vec<(String, f64)>>,
}

impl TrainedModel {
    /// Predicts on raw (unscaled) rows.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if let Some(row) = rows.iter().find(|r| r.len() != self.feature_names.len()) {
            return Err(ModelError::FeatureWidth {
                model: self.name.clone(),
                expected: self.feature_names.len(),
                actual: row.len(),
            });
        }
        match &self.scaler {
            Some(scaler) => {
                let scaled: Vec<Vec<f64>> =
                    rows.iter().map(|r| scaler.transform_row(r)).collect();
                self.model.predict(&scaled)
            }
            None => self.model.predict(rows),
        }
    }
}

impl std::fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedModel")
            .field("name", &self.name)
            .field("task", &self.task)
            .field("features", &self.feature_names.len())
            .field("scaled", &self.scaler.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct Slot {
    status: ModelStatus,
    model: Option<TrainedModel>,
}

/// One row of the model comparison table
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ComparisonRow {
    pub model: String,
    pub train: MetricValue,
    pub validation: MetricValue,
    pub cv_mean: MetricValue,
    pub cv_std: MetricValue,
    pub elapsed_ms: u128,
}

#[derive(Debug)]
pub struct ModelRegistry {
    task: Task,
    slots: BTreeMap<String, Slot>,
}

impl ModelRegistry {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            slots: BTreeMap::new(),
        }
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn status(&self, name: &str) -> ModelStatus {
        self.slots
            .get(name)
            .map(|s| s.status.clone())
            .unwrap_or(ModelStatus::Untrained)
    }

    pub fn statuses(&self) -> Vec<(String, ModelStatus)> {
        self.slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.status.clone()))
            .collect()
    }

    pub fn mark_training(&mut self, name: &str) {
        self.set(name, ModelStatus::Training, None);
    }

    pub fn store(&mut self, model: TrainedModel) {
        let name = model.name.clone();
        self.set(&name, ModelStatus::Trained, Some(model));
    }

    pub fn mark_failed(&mut self, name: &str, reason: impl Into<String>) {
        self.set(name, ModelStatus::Failed(reason.into()), None);
    }

    pub fn mark_skipped(&mut self, name: &str, reason: impl Into<String>) {
        self.set(name, ModelStatus::Skipped(reason.into()), None);
    }

    fn set(&mut self, name: &str, status: ModelStatus, model: Option<TrainedModel>) {
        self.slots
            .insert(name.to_string(), Slot { status, model });
    }

    pub fn get(&self, name: &str) -> Option<&TrainedModel> {
        self.slots.get(name).and_then(|s| s.model.as_ref())
    }

    pub fn trained(&self) -> impl Iterator<Item = &TrainedModel> {
        self.slots.values().filter_map(|s| s.model.as_ref())
    }

    pub fn trained_names(&self) -> Vec<String> {
        self.trained().map(|m| m.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.trained().next().is_none()
    }

    pub fn predict(&self, name: &str, rows: &[Vec<f64>]) -> Result<Vec<f64>, PipelineError> {
        let model = self.get(name).ok_or_else(|| PipelineError::NotTrained {
            name: name.to_string(),
        })?;
        model.predict(rows).map_err(|source| PipelineError::Prediction {
            model: name.to_string(),
            source,
        })
    }

    /// Predictions from every trained model. A model that fails to predict is
    /// logged and left out.
    pub fn predict_all(&self, rows: &[Vec<f64>]) -> BTreeMap<String, Vec<f64>> {
        self.trained()
            .filter_map(|model| match model.predict(rows) {
                Ok(values) => Some((model.name.clone(), values)),
                Err(e) => {
                    warn!("Skipping {} in ensemble: {}", model.name, e);
                    None
                }
            })
            .collect()
    }

    /// Ensemble weights from validation quality: R² for regression, AUC above
    /// chance for classification, floored at 0. Undefined metrics weigh 0.
    pub fn validation_weights(&self) -> BTreeMap<String, f64> {
        self.trained()
            .map(|model| {
                let weight = match (&model.metrics.validation, model.metrics.validation.headline()) {
                    (_, MetricValue::Undefined) => 0.0,
                    (ErrorMetrics::Regression(_), MetricValue::Defined(r2)) => r2.max(0.0),
                    (ErrorMetrics::Classification(_), MetricValue::Defined(auc)) => {
                        (auc - 0.5).max(0.0)
                    }
                };
                (model.name.clone(), weight)
            })
            .collect()
    }

    /// Ensemble prediction over every trained model. `Ok(None)` when nothing is trained.
    pub fn predict_ensemble(
        &self,
        rows: &[Vec<f64>],
        method: EnsembleMethod,
    ) -> Result<Option<EnsemblePrediction>, PipelineError> {
        if self.is_empty() {
            return Ok(None);
        }
        let predictions = self.predict_all(rows);
        let weights = self.validation_weights();
        if predictions.is_empty() {
            return Err(PipelineError::Alignment {
                reason: "every trained model failed to predict".to_string(),
            });
        }
        combine(&predictions, method, Some(&weights))
    }

    /// Metrics of trained models, best validation headline first; undefined last.
    pub fn comparison(&self) -> Vec<ComparisonRow> {
        let mut rows: Vec<ComparisonRow> = self
            .trained()
            .map(|m| ComparisonRow {
                model: m.name.clone(),
                train: m.metrics.train.headline(),
                validation: m.metrics.validation.headline(),
                cv_mean: m.metrics.cross_validation_mean(),
                cv_std: m.metrics.cross_validation_std(),
                elapsed_ms: m.metrics.elapsed_ms,
            })
            .collect();
        rows.sort_by(|a, b| match (a.validation.value(), b.validation.value()) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.model.cmp(&b.model),
        });
        rows
    }

    pub fn feature_importance(&self, name: &str) -> Option<&[(String, f64)]> {
        self.get(name).and_then(|m| m.feature_importance.as_deref())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
