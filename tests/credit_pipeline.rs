use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use riskcast::application::features::{TabularFeatureBuilder, TabularSchema};
use riskcast::application::ml::approval::approval_curve;
use riskcast::application::ml::{ModelCatalog, ModelRegistry, ModelTrainer};
use riskcast::application::pipeline::run_credit;
use riskcast::application::resampling::{SMOTE_NEIGHBOURS, smote};
use riskcast::application::splitting::stratified_split;
use riskcast::config::{PipelineConfig, TrainingConfig};
use riskcast::domain::errors::ModelError;
use riskcast::domain::ml::{
    Dataset, FitContext, FittedModel, ModelFamily, ModelStatus, Task, TrainingOutcome,
    UnitEconomics,
};
use riskcast::domain::table::RawTable;
use std::sync::Arc;

/// Two informative features and one noise column; default probability rises with `x1`.
fn applicants(n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n);
    let mut targets = Vec::with_capacity(n);
    for _ in 0..n {
        let x1: f64 = rng.random_range(-2.0..2.0);
        let x2: f64 = rng.random_range(0.0..1.0);
        let noise: f64 = rng.random_range(0.0..1.0);
        let p = 1.0 / (1.0 + (-(2.5 * x1 + x2 - 2.0)).exp());
        targets.push(if rng.random::<f64>() < p { 1.0 } else { 0.0 });
        features.push(vec![x1, x2, noise]);
    }
    Dataset::new(
        features,
        targets,
        vec!["x1".to_string(), "x2".to_string(), "noise".to_string()],
    )
    .unwrap()
}

fn imbalanced(n: usize) -> Dataset {
    let features = (0..n)
        .map(|i| vec![i as f64, ((i * 17) % 13) as f64])
        .collect();
    // Every 20th applicant defaults: a 95/5 split
    let targets = (0..n).map(|i| if i % 20 == 0 { 1.0 } else { 0.0 }).collect();
    Dataset::new(features, targets, vec!["a".to_string(), "b".to_string()]).unwrap()
}

struct BrokenFamily;

impl ModelFamily for BrokenFamily {
    fn name(&self) -> &'static str {
        "Broken"
    }
    fn task(&self) -> Task {
        Task::Classification
    }
    fn fit(&self, _train: &Dataset, _ctx: &FitContext) -> Result<Box<dyn FittedModel>, ModelError> {
        Err(ModelError::fit(self.name(), "matrix is singular"))
    }
}

struct PanickingFamily;

impl ModelFamily for PanickingFamily {
    fn name(&self) -> &'static str {
        "Panicking"
    }
    fn task(&self) -> Task {
        Task::Classification
    }
    fn fit(&self, _train: &Dataset, _ctx: &FitContext) -> Result<Box<dyn FittedModel>, ModelError> {
        panic!("index out of bounds in native solver")
    }
}

struct PickyFamily;

impl ModelFamily for PickyFamily {
    fn name(&self) -> &'static str {
        "Picky"
    }
    fn task(&self) -> Task {
        Task::Classification
    }
    fn skip_reason(&self, train: &Dataset, _validation: &Dataset, _ctx: &FitContext) -> Option<String> {
        Some(format!("needs 10000 rows, got {}", train.len()))
    }
    fn fit(&self, _train: &Dataset, _ctx: &FitContext) -> Result<Box<dyn FittedModel>, ModelError> {
        unreachable!("skipped families are never fitted")
    }
}

#[test]
fn test_balancing_only_touches_training_partition() {
    let data = imbalanced(200);
    let split = stratified_split(&data, 0.2, 0.1, 42).unwrap();
    let original_rate = data.positive_rate();
    let validation_rate = split.validation.positive_rate();

    let balanced = smote(&split.train, SMOTE_NEIGHBOURS, 42).unwrap();
    assert!((balanced.positive_rate() - 0.5).abs() < 1e-12);
    assert!((balanced.positive_rate() - 0.5).abs() < (split.train.positive_rate() - 0.5).abs());

    // Validation keeps roughly the original 95/5 ratio
    assert!(validation_rate < 0.1, "validation rate {}", validation_rate);
    assert!((validation_rate - original_rate).abs() < 0.05);
    assert_eq!(split.validation.len() + split.test.len() + split.train.len(), 200);
}

#[test]
fn test_balanced_families_train_on_resampled_rows() {
    let data = imbalanced(200);
    let split = stratified_split(&data, 0.2, 0.1, 42).unwrap();
    let (negatives, _) = split.train.class_counts();

    let trainer = ModelTrainer::new(ModelCatalog::standard(), TrainingConfig::default());
    let mut registry = ModelRegistry::new(Task::Classification);
    let outcomes = trainer
        .train_all(
            &mut registry,
            &["Decision Tree".to_string(), "Random Forest".to_string()],
            &split.train,
            &split.validation,
        )
        .unwrap();

    let rows = |name: &str| {
        outcomes
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, o)| o.metrics())
            .map(|m| m.training_rows)
            .unwrap()
    };
    assert_eq!(rows("Decision Tree"), 2 * negatives);
    assert_eq!(rows("Random Forest"), split.train.len());
}

#[test]
fn test_failures_do_not_stop_other_models() {
    let mut catalog = ModelCatalog::standard();
    catalog.register(Arc::new(BrokenFamily));
    catalog.register(Arc::new(PanickingFamily));
    catalog.register(Arc::new(PickyFamily));

    let data = applicants(200, 3);
    let split = stratified_split(&data, 0.2, 0.1, 42).unwrap();
    let trainer = ModelTrainer::new(catalog, TrainingConfig::default());
    let mut registry = ModelRegistry::new(Task::Classification);
    let names: Vec<String> = ["Broken", "Panicking", "Picky", "Logistic Regression"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let outcomes = trainer
        .train_all(&mut registry, &names, &split.train, &split.validation)
        .unwrap();

    assert!(matches!(outcomes[0].1, TrainingOutcome::Failed(ModelError::Fit { .. })));
    assert!(matches!(outcomes[1].1, TrainingOutcome::Failed(ModelError::Panicked { .. })));
    assert!(matches!(outcomes[2].1, TrainingOutcome::Skipped(_)));
    assert!(matches!(outcomes[3].1, TrainingOutcome::Trained(_)));

    assert!(registry.status("Broken").to_string().starts_with("failed"));
    assert!(registry.status("Picky").to_string().starts_with("skipped"));
    assert_eq!(registry.trained_names(), vec!["Logistic Regression".to_string()]);
}

#[test]
fn test_cross_validation_reports_auc() {
    let data = applicants(300, 9);
    let split = stratified_split(&data, 0.2, 0.1, 42).unwrap();
    let trainer = ModelTrainer::new(ModelCatalog::standard(), TrainingConfig::default());
    let mut registry = ModelRegistry::new(Task::Classification);
    let outcome = trainer
        .train(&mut registry, "Logistic Regression", &split.train, &split.validation)
        .unwrap();
    let metrics = outcome.metrics().unwrap();
    let cv = metrics.cross_validation.as_ref().unwrap();
    assert_eq!(cv.metric, "roc_auc");
    assert_eq!(cv.folds.len(), 5);
    assert!(cv.mean.value().unwrap() > 0.7);
    assert!(metrics.validation.headline().value().unwrap() > 0.7);
    assert!(metrics.classification_report().is_some());
}

#[test]
fn test_zero_approval_threshold() {
    let curve = approval_curve(
        "m",
        &[0.2, 0.6, 0.9],
        &[0.0, 1.0, 1.0],
        &[0.0, 0.5, 1.0],
        &UnitEconomics::default(),
    )
    .unwrap();
    let strict = &curve.points[0];
    assert_eq!(strict.approval_rate, 0.0);
    assert_eq!(strict.realized_default_rate, 0.0);
    assert!(!strict.realized_default_rate.is_nan());
    assert_eq!(curve.points[2].approval_rate, 1.0);
}

#[test]
fn test_credit_run_produces_monotone_curves() {
    let data = applicants(300, 21);
    let config = PipelineConfig {
        training: TrainingConfig {
            models: vec!["Logistic Regression".to_string(), "Decision Tree".to_string()],
            ..TrainingConfig::default()
        },
        ..PipelineConfig::default()
    };
    let run = run_credit(&data, ModelCatalog::standard(), &config).unwrap();

    assert_eq!(run.approval_curves.len(), 2);
    for curve in &run.approval_curves {
        assert_eq!(curve.points.len(), config.economics.thresholds.len());
        assert!(curve
            .points
            .windows(2)
            .all(|w| w[0].threshold < w[1].threshold && w[0].approval_rate <= w[1].approval_rate));
        assert!(curve.optimal().is_some());
    }
    let ensemble = run.ensemble.unwrap();
    assert_eq!(ensemble.len(), run.split.test.len());
    assert!(ensemble.values.iter().all(|p| (0.0..=1.0).contains(p)));
    assert_eq!(run.registry.status("Decision Tree"), ModelStatus::Trained);
}

#[test]
fn test_tabular_builder_feeds_trainer() {
    let mut rng = StdRng::seed_from_u64(4);
    let headers: Vec<String> = ["gender", "dpd_5_cnt", "score_1", "age", "payment_type_0", "bad_flag"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let rows = (0..120)
        .map(|i| {
            let late: u32 = rng.random_range(0..4);
            let default = late >= 2 && rng.random::<f64>() < 0.8;
            vec![
                Some(if i % 2 == 0 { "M" } else { "F" }.to_string()),
                if i % 11 == 0 { None } else { Some(late.to_string()) },
                Some(format!("{:.3}", rng.random_range(0.0..1.0))),
                Some((20 + i % 50).to_string()),
                Some((i % 3).to_string()),
                Some(if default { "1" } else { "0" }.to_string()),
            ]
        })
        .collect();
    let table = RawTable::new(headers, rows).unwrap();

    let mut builder = TabularFeatureBuilder::new(TabularSchema::loan_default(), 30);
    let dataset = builder.fit_transform(&table).unwrap();
    assert!(dataset.feature_names.contains(&"gender_encoded".to_string()));
    assert!(dataset.feature_names.contains(&"risk_score".to_string()));

    let split = stratified_split(&dataset, 0.25, 0.0, 42).unwrap();
    let trainer = ModelTrainer::new(ModelCatalog::standard(), TrainingConfig::default());
    let mut registry = ModelRegistry::new(Task::Classification);
    let outcome = trainer
        .train(&mut registry, "KNN", &split.train, &split.test)
        .unwrap();
    assert!(matches!(outcome, TrainingOutcome::Trained(_)));

    let inference = builder.transform_features(&table).unwrap();
    let probabilities = registry.predict("KNN", &inference).unwrap();
    assert_eq!(probabilities.len(), 120);
}
