//! Fits model families on a training partition, scores them and stores the
//! results in a [`ModelRegistry`].
//!
//! One family failing (error or panic) never aborts the others; it is
//! recorded as failed and the batch carries on.

use crate::application::ml::evaluation::{
    classification_metrics, regression_metrics, roc_auc, stratified_folds, summarize_folds,
    time_series_folds,
};
use crate::application::ml::importance::permutation_importance;
use crate::application::ml::models::ModelCatalog;
use crate::application::ml::registry::{ModelRegistry, TrainedModel};
use crate::application::ml::scaling::StandardScaler;
use crate::application::resampling::{SMOTE_NEIGHBOURS, smote};
use crate::config::TrainingConfig;
use crate::domain::errors::{ModelError, PipelineError};
use crate::domain::ml::{
    CrossValidationSummary, Dataset, ErrorMetrics, FitContext, FittedModel, MetricsRecord,
    ModelFamily, Task, TrainingOutcome,
};
use rayon::prelude::*;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Minimum rows in a training partition
pub const MIN_TRAIN_ROWS: usize = 2;

pub struct ModelTrainer {
    catalog: ModelCatalog,
    config: TrainingConfig,
}

/// Fit output before it is scored
struct Fitted {
    model: Box<dyn FittedModel>,
    scaler: Option<StandardScaler>,
}

impl Fitted {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        match &self.scaler {
            Some(scaler) => {
                let scaled: Vec<Vec<f64>> = rows.iter().map(|r| scaler.transform_row(r)).collect();
                self.model.predict(&scaled)
            }
            None => self.model.predict(rows),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Fits `family` on `data`, scaling first when the family asks for it. The
/// scaler is fitted on `scale_on`, the partition before any resampling.
/// Panics inside the family are turned into errors.
fn fit_family(
    family: &dyn ModelFamily,
    data: &Dataset,
    scale_on: &Dataset,
    ctx: &FitContext,
) -> Result<Fitted, ModelError> {
    let name = family.name();
    catch_unwind(AssertUnwindSafe(|| {
        let (scaler, fit_data) = if family.needs_scaling() {
            let scaler = StandardScaler::fit(&scale_on.features).map_err(|e| ModelError::fit(name, e))?;
            let scaled = Dataset::with_row_ids(
                scaler.transform(&data.features).map_err(|e| ModelError::fit(name, e))?,
                data.targets.clone(),
                data.feature_names.clone(),
                data.row_ids.clone(),
            )
            .map_err(|e| ModelError::fit(name, e))?;
            (Some(scaler), scaled)
        } else {
            (None, data.clone())
        };
        let model = family.fit(&fit_data, ctx)?;
        Ok(Fitted { model, scaler })
    }))
    .unwrap_or_else(|payload| {
        Err(ModelError::Panicked {
            model: name.to_string(),
            message: panic_message(payload),
        })
    })
}

/// Predicts `rows` and checks that one value came back per row after the
/// family's leading context rows.
fn predict_guarded(
    family: &dyn ModelFamily,
    fitted: &Fitted,
    rows: &[Vec<f64>],
    ctx: &FitContext,
) -> Result<Vec<f64>, ModelError> {
    let name = family.name();
    let predicted = catch_unwind(AssertUnwindSafe(|| fitted.predict(rows))).unwrap_or_else(|payload| {
        Err(ModelError::Panicked {
            model: name.to_string(),
            message: panic_message(payload),
        })
    })?;
    let expected = rows.len().saturating_sub(family.context_rows(ctx));
    if predicted.len() != expected {
        return Err(ModelError::predict(
            name,
            format!("returned {} predictions for {} rows, expected {}", predicted.len(), rows.len(), expected),
        ));
    }
    Ok(predicted)
}

fn score(task: Task, actual: &[f64], predicted: &[f64]) -> ErrorMetrics {
    // Windowed models return fewer values; score the aligned tail.
    let n = actual.len().min(predicted.len());
    let actual = &actual[actual.len() - n..];
    let predicted = &predicted[predicted.len() - n..];
    match task {
        Task::Regression => ErrorMetrics::Regression(regression_metrics(actual, predicted)),
        Task::Classification => ErrorMetrics::Classification(classification_metrics(actual, predicted)),
    }
}

impl ModelTrainer {
    pub fn new(catalog: ModelCatalog, config: TrainingConfig) -> Self {
        Self { catalog, config }
    }

    fn context(&self) -> FitContext {
        FitContext {
            seed: self.config.seed,
            sequence_length: self.config.sequence_length,
        }
    }

    fn check_training_set(&self, task: Task, train: &Dataset) -> Result<(), PipelineError> {
        if train.len() < MIN_TRAIN_ROWS {
            return Err(PipelineError::insufficient("training", train.len(), MIN_TRAIN_ROWS));
        }
        if task == Task::Classification {
            let (negatives, positives) = train.class_counts();
            if negatives == 0 || positives == 0 {
                return Err(PipelineError::InvalidData {
                    column: "target".to_string(),
                    reason: format!(
                        "training partition needs both classes, got {} negative and {} positive",
                        negatives, positives
                    ),
                });
            }
        }
        Ok(())
    }

    fn balanced(&self, train: &Dataset) -> Result<Dataset, PipelineError> {
        let balanced = smote(train, SMOTE_NEIGHBOURS, self.config.seed)?;
        let (negatives, positives) = balanced.class_counts();
        debug!(
            "Balanced training set: {} rows ({} negative / {} positive)",
            balanced.len(),
            negatives,
            positives
        );
        Ok(balanced)
    }

    /// Trains one model by name and stores it in `registry`.
    ///
    /// Returns `Err` only for problems with the request itself (unknown model,
    /// unusable training set). A family that fails or is skipped is reported
    /// through the outcome and recorded in the registry.
    pub fn train(
        &self,
        registry: &mut ModelRegistry,
        name: &str,
        train: &Dataset,
        validation: &Dataset,
    ) -> Result<TrainingOutcome, PipelineError> {
        let task = registry.task();
        let family = self.catalog.get(task, name)?;
        self.check_training_set(task, train)?;
        let balanced = if family.needs_balanced_classes() {
            Some(self.balanced(train)?)
        } else {
            None
        };
        Ok(self.train_family(registry, family, train, balanced.as_ref(), validation))
    }

    /// Trains every requested model (all for the task when `names` is empty).
    ///
    /// The oversampled training set is computed once and shared by every
    /// family that asks for balanced classes.
    pub fn train_all(
        &self,
        registry: &mut ModelRegistry,
        names: &[String],
        train: &Dataset,
        validation: &Dataset,
    ) -> Result<Vec<(String, TrainingOutcome)>, PipelineError> {
        let task = registry.task();
        let families = self.catalog.resolve(task, names)?;
        self.check_training_set(task, train)?;
        let balanced = if families.iter().any(|f| f.needs_balanced_classes()) {
            Some(self.balanced(train)?)
        } else {
            None
        };

        info!(
            "Training {} {} models on {} rows ({} validation)",
            families.len(),
            task,
            train.len(),
            validation.len()
        );
        let outcomes: Vec<(String, TrainingOutcome)> = families
            .into_iter()
            .map(|family| {
                let name = family.name().to_string();
                let outcome = self.train_family(registry, family, train, balanced.as_ref(), validation);
                (name, outcome)
            })
            .collect();

        let trained = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TrainingOutcome::Trained(_)))
            .count();
        info!("{}/{} models trained", trained, outcomes.len());
        Ok(outcomes)
    }

    fn train_family(
        &self,
        registry: &mut ModelRegistry,
        family: Arc<dyn ModelFamily>,
        train: &Dataset,
        balanced: Option<&Dataset>,
        validation: &Dataset,
    ) -> TrainingOutcome {
        let name = family.name();
        let task = family.task();
        let ctx = self.context();

        if let Some(reason) = family.skip_reason(train, validation, &ctx) {
            warn!("Skipping {}: {}", name, reason);
            registry.mark_skipped(name, reason.clone());
            return TrainingOutcome::Skipped(reason);
        }

        registry.mark_training(name);
        let started = Instant::now();
        let fit_data = match (family.needs_balanced_classes(), balanced) {
            (true, Some(balanced)) => balanced,
            _ => train,
        };
        info!("Training {} on {} rows", name, fit_data.len());

        let result = fit_family(family.as_ref(), fit_data, train, &ctx).and_then(|fitted| {
            let train_pred = predict_guarded(family.as_ref(), &fitted, &train.features, &ctx)?;
            let validation_pred = predict_guarded(family.as_ref(), &fitted, &validation.features, &ctx)?;
            Ok((fitted, train_pred, validation_pred))
        });
        let (fitted, train_pred, validation_pred) = match result {
            Ok(parts) => parts,
            Err(e) => {
                warn!("{} failed: {}", name, e);
                registry.mark_failed(name, e.to_string());
                return TrainingOutcome::Failed(e);
            }
        };

        let cross_validation = self.cross_validate(family.as_ref(), fit_data, &ctx);
        let feature_importance = if family.reports_importance() {
            let data = if validation.is_empty() { train } else { validation };
            let importance_model = ScaledModel { fitted: &fitted };
            match permutation_importance(&importance_model, data, ctx.seed) {
                Ok(scores) => Some(scores),
                Err(e) => {
                    warn!("Feature importance for {} unavailable: {}", name, e);
                    None
                }
            }
        } else {
            None
        };

        let elapsed_ms = started.elapsed().as_millis();
        let metrics = MetricsRecord {
            model: name.to_string(),
            train: score(task, &train.targets, &train_pred),
            validation: score(task, &validation.targets, &validation_pred),
            cross_validation,
            training_rows: fit_data.len(),
            elapsed_ms,
        };
        info!(
            "{} trained in {} ms: train {} {}, validation {} {}",
            name,
            elapsed_ms,
            metrics.train.headline_name(),
            metrics.train.headline(),
            metrics.validation.headline_name(),
            metrics.validation.headline()
        );

        registry.store(TrainedModel {
            name: name.to_string(),
            task,
            model: fitted.model,
            scaler: fitted.scaler,
            feature_names: train.feature_names.clone(),
            metrics: metrics.clone(),
            feature_importance,
        });
        TrainingOutcome::Trained(metrics)
    }

    /// Stratified AUC folds for classification, expanding-window RMSE folds for
    /// regression. `None` when disabled or when no fold could be scored.
    fn cross_validate(
        &self,
        family: &dyn ModelFamily,
        data: &Dataset,
        ctx: &FitContext,
    ) -> Option<CrossValidationSummary> {
        let splits: Vec<(Vec<usize>, Vec<usize>)> = match family.task() {
            Task::Classification => {
                if self.config.cv_folds < 2 {
                    return None;
                }
                let folds = stratified_folds(&data.targets, self.config.cv_folds, ctx.seed);
                folds
                    .iter()
                    .map(|held_out| {
                        let train_idx = (0..data.len())
                            .filter(|i| held_out.binary_search(i).is_err())
                            .collect();
                        (train_idx, held_out.clone())
                    })
                    .collect()
            }
            Task::Regression => {
                if self.config.regression_cv_folds < 2 {
                    return None;
                }
                time_series_folds(data.len(), self.config.regression_cv_folds)
                    .into_iter()
                    .map(|(train, test)| (train.collect(), test.collect()))
                    .collect()
            }
        };
        if splits.is_empty() {
            return None;
        }

        let scores: Vec<f64> = splits
            .par_iter()
            .filter_map(|(train_idx, test_idx)| {
                let fold_train = data.select_rows(train_idx);
                let fold_test = data.select_rows(test_idx);
                if family.skip_reason(&fold_train, &fold_test, ctx).is_some() {
                    return None;
                }
                let fitted = fit_family(family, &fold_train, &fold_train, ctx).ok()?;
                let predicted = predict_guarded(family, &fitted, &fold_test.features, ctx).ok()?;
                let n = predicted.len().min(fold_test.len());
                let actual = &fold_test.targets[fold_test.len() - n..];
                let predicted = &predicted[predicted.len() - n..];
                match family.task() {
                    Task::Classification => roc_auc(actual, predicted).value(),
                    Task::Regression => regression_metrics(actual, predicted).rmse.value(),
                }
            })
            .collect();
        if scores.is_empty() {
            debug!("No cross-validation fold could be scored for {}", family.name());
            return None;
        }
        let metric = match family.task() {
            Task::Classification => "roc_auc",
            Task::Regression => "rmse",
        };
        Some(summarize_folds(metric, scores))
    }
}

/// Borrowed view that applies the fit's scaler before predicting
struct ScaledModel<'a> {
    fitted: &'a Fitted,
}

impl FittedModel for ScaledModel<'_> {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        self.fitted.predict(rows)
    }
}
