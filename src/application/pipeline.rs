//! End-to-end runs: split, train every requested model, score the test
//! partition, combine the survivors and (for credit data) sweep approval thresholds.

use crate::application::ml::approval::analyze_approval_levels;
use crate::application::ml::evaluation::{classification_metrics, regression_metrics};
use crate::application::ml::models::ModelCatalog;
use crate::application::ml::registry::ModelRegistry;
use crate::application::ml::trainer::ModelTrainer;
use crate::application::splitting::{chronological_split, stratified_split};
use crate::config::PipelineConfig;
use crate::domain::errors::PipelineError;
use crate::domain::ml::{
    ApprovalCurve, Dataset, DatasetSplit, EnsemblePrediction, ErrorMetrics, Task, TrainingOutcome,
};
use tracing::{info, warn};

/// Caller-owned result of one run; the registry keeps the fitted models.
#[derive(Debug)]
pub struct PipelineRun {
    pub registry: ModelRegistry,
    pub split: DatasetSplit,
    pub outcomes: Vec<(String, TrainingOutcome)>,
    pub test_metrics: Vec<(String, ErrorMetrics)>,
    pub ensemble: Option<EnsemblePrediction>,
    pub approval_curves: Vec<ApprovalCurve>,
}

fn test_metrics(
    registry: &ModelRegistry,
    test: &Dataset,
) -> Vec<(String, ErrorMetrics)> {
    if test.is_empty() {
        return Vec::new();
    }
    registry
        .predict_all(&test.features)
        .into_iter()
        .map(|(name, predicted)| {
            let n = predicted.len().min(test.len());
            let actual = &test.targets[test.len() - n..];
            let predicted = &predicted[predicted.len() - n..];
            let metrics = match registry.task() {
                Task::Regression => ErrorMetrics::Regression(regression_metrics(actual, predicted)),
                Task::Classification => {
                    ErrorMetrics::Classification(classification_metrics(actual, predicted))
                }
            };
            (name, metrics)
        })
        .collect()
}

fn ensemble_on(
    registry: &ModelRegistry,
    rows: &[Vec<f64>],
    config: &PipelineConfig,
) -> Result<Option<EnsemblePrediction>, PipelineError> {
    if rows.is_empty() {
        return Ok(None);
    }
    match registry.predict_ensemble(rows, config.training.ensemble_method) {
        Ok(ensemble) => Ok(ensemble),
        Err(PipelineError::Alignment { reason }) => {
            warn!("No ensemble on the test partition: {}", reason);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Chronological split and regression training.
pub fn run_forecast(
    dataset: &Dataset,
    catalog: ModelCatalog,
    config: &PipelineConfig,
) -> Result<PipelineRun, PipelineError> {
    let split = chronological_split(
        dataset,
        config.split.test_fraction,
        config.split.validation_fraction,
    )?;
    info!(
        "Chronological split: {} train, {} validation, {} test",
        split.train.len(),
        split.validation.len(),
        split.test.len()
    );

    let mut registry = ModelRegistry::new(Task::Regression);
    let trainer = ModelTrainer::new(catalog, config.training.clone());
    let outcomes = trainer.train_all(
        &mut registry,
        &config.training.models,
        &split.train,
        &split.validation,
    )?;
    let test_metrics = test_metrics(&registry, &split.test);
    let ensemble = ensemble_on(&registry, &split.test.features, config)?;

    Ok(PipelineRun {
        registry,
        split,
        outcomes,
        test_metrics,
        ensemble,
        approval_curves: Vec::new(),
    })
}

/// Stratified split, classification training and an approval sweep per trained model.
pub fn run_credit(
    dataset: &Dataset,
    catalog: ModelCatalog,
    config: &PipelineConfig,
) -> Result<PipelineRun, PipelineError> {
    let split = stratified_split(
        dataset,
        config.split.test_fraction,
        config.split.validation_fraction,
        config.split.seed,
    )?;
    info!(
        "Stratified split: {} train, {} validation, {} test (default rate {:.1}%)",
        split.train.len(),
        split.validation.len(),
        split.test.len(),
        dataset.positive_rate() * 100.0
    );

    let mut registry = ModelRegistry::new(Task::Classification);
    let trainer = ModelTrainer::new(catalog, config.training.clone());
    let outcomes = trainer.train_all(
        &mut registry,
        &config.training.models,
        &split.train,
        &split.validation,
    )?;
    let test_metrics = test_metrics(&registry, &split.test);
    let ensemble = ensemble_on(&registry, &split.test.features, config)?;

    let economics = config.economics.unit_economics();
    let mut approval_curves = Vec::new();
    if !split.test.is_empty() {
        for name in registry.trained_names() {
            match analyze_approval_levels(
                &registry,
                &name,
                &split.test,
                &config.economics.thresholds,
                &economics,
            ) {
                Ok(curve) => approval_curves.push(curve),
                Err(PipelineError::Prediction { model, source }) => {
                    warn!("No approval curve for {}: {}", model, source)
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(PipelineRun {
        registry,
        split,
        outcomes,
        test_metrics,
        ensemble,
        approval_curves,
    })
}
