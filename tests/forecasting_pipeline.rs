use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use riskcast::application::features::{PriceFeatureBuilder, SeriesFeatureBuilder};
use riskcast::application::ml::evaluation::regression_metrics;
use riskcast::application::ml::{ModelCatalog, ModelRegistry, ModelTrainer};
use riskcast::application::pipeline::run_forecast;
use riskcast::application::splitting::chronological_split;
use riskcast::config::{PipelineConfig, TrainingConfig};
use riskcast::domain::errors::PipelineError;
use riskcast::domain::market::{PriceBar, PriceField};
use riskcast::domain::ml::{Dataset, MetricValue, ModelStatus, Task};
use riskcast::domain::table::RawTable;

/// y = 2x + uniform noise in [-0.5, 0.5], with x the row index
fn linear_table(n: usize, seed: u64) -> RawTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let y: Vec<f64> = x
        .iter()
        .map(|v| 2.0 * v + rng.random_range(-0.5..0.5))
        .collect();
    RawTable::from_columns(&[("x", x), ("y", y)]).unwrap()
}

fn truncated(table: &RawTable, len: usize) -> RawTable {
    let x = table.numeric_column("x").unwrap();
    let y = table.numeric_column("y").unwrap();
    RawTable::from_columns(&[
        ("x", x[..len].iter().map(|v| v.unwrap()).collect()),
        ("y", y[..len].iter().map(|v| v.unwrap()).collect()),
    ])
    .unwrap()
}

#[test]
fn test_chronological_split_never_interleaves() {
    for n in [0usize, 1, 5, 17, 100, 333] {
        for test_fraction in [0.0, 0.1, 0.2, 0.5] {
            for validation_fraction in [0.0, 0.1, 0.3] {
                let ds = Dataset::new(
                    (0..n).map(|i| vec![i as f64]).collect(),
                    (0..n).map(|i| i as f64).collect(),
                    vec!["t".to_string()],
                )
                .unwrap();
                let split = chronological_split(&ds, test_fraction, validation_fraction).unwrap();
                assert_eq!(split.total_len(), n);
                let train_max = split.train.row_ids.iter().max();
                let val_min = split.validation.row_ids.iter().min();
                let val_max = split.validation.row_ids.iter().max();
                let test_min = split.test.row_ids.iter().min();
                if let (Some(a), Some(b)) = (train_max, val_min) {
                    assert!(a < b);
                }
                if let (Some(a), Some(b)) = (val_max, test_min) {
                    assert!(a < b);
                }
                if let (Some(a), Some(b)) = (train_max, test_min) {
                    assert!(a < b);
                }
            }
        }
    }
}

#[test]
fn test_series_features_ignore_future_rows() {
    let table = linear_table(80, 7);
    let mut full_builder = SeriesFeatureBuilder::new("y", 1, 1).unwrap();
    let full = full_builder.build(&table).unwrap();

    for (pos, &row) in full.row_ids.iter().enumerate().step_by(9) {
        // Only rows up to and including `row` are visible here
        let mut builder = SeriesFeatureBuilder::new("y", 1, 0).unwrap();
        builder.build(&truncated(&table, row + 1)).unwrap();
        let latest = builder.build_inference_features(&truncated(&table, row + 1)).unwrap();
        assert_eq!(latest, full.features[pos], "row {} leaks future data", row);
    }
}

#[test]
fn test_perfect_predictor_metrics() {
    let y: Vec<f64> = (0..25).map(|i| (i as f64).sqrt()).collect();
    let m = regression_metrics(&y, &y);
    assert!(m.mae.value().unwrap().abs() < 1e-9);
    assert!(m.rmse.value().unwrap().abs() < 1e-9);
    assert!((m.r2.value().unwrap() - 1.0).abs() < 1e-9);
}

#[test]
fn test_constant_target_r2_is_undefined() {
    let y = vec![3.0; 10];
    let m = regression_metrics(&y, &[2.0; 10]);
    assert_eq!(m.r2, MetricValue::Undefined);
    assert_eq!(m.r2.to_string(), "undefined");
}

#[test]
fn test_linear_regression_scenario() {
    let mut builder = SeriesFeatureBuilder::new("y", 1, 30).unwrap();
    let dataset = builder.build(&linear_table(200, 11)).unwrap();
    let split = chronological_split(&dataset, 0.2, 0.1).unwrap();

    let trainer = ModelTrainer::new(ModelCatalog::standard(), TrainingConfig::default());
    let mut registry = ModelRegistry::new(Task::Regression);
    let outcomes = trainer
        .train_all(
            &mut registry,
            &["Linear Regression".to_string()],
            &split.train,
            &split.validation,
        )
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    let r2 = outcomes[0].1.metrics().unwrap().validation.headline();
    assert!(r2.value().unwrap() > 0.9, "validation R2 was {}", r2);
}

#[test]
fn test_ten_rows_is_insufficient() {
    let mut builder = SeriesFeatureBuilder::new("y", 1, 30).unwrap();
    match builder.build(&linear_table(10, 3)) {
        Err(PipelineError::InsufficientData { required, .. }) => assert_eq!(required, 30),
        other => panic!("expected InsufficientData, got {:?}", other),
    }
    let message = builder.build(&linear_table(10, 3)).unwrap_err().to_string();
    assert!(message.contains("fetch more data"));
}

#[test]
fn test_forecast_run_aligns_sequence_model() {
    let mut builder = SeriesFeatureBuilder::new("y", 1, 30).unwrap();
    let dataset = builder.build(&linear_table(200, 5)).unwrap();
    let config = PipelineConfig {
        training: TrainingConfig {
            models: vec!["Linear Regression".to_string(), "Sequence Network".to_string()],
            ..TrainingConfig::default()
        },
        ..PipelineConfig::default()
    };

    let run = run_forecast(&dataset, ModelCatalog::standard(), &config).unwrap();
    assert_eq!(run.registry.status("Linear Regression"), ModelStatus::Trained);
    assert_eq!(run.registry.status("Sequence Network"), ModelStatus::Trained);

    let ensemble = run.ensemble.unwrap();
    let test_len = run.split.test.len();
    assert_eq!(ensemble.len(), test_len - (config.training.sequence_length - 1));
    assert_eq!(ensemble.contributors.len(), 2);
    assert!(ensemble.per_model.values().all(|v| v.len() == ensemble.len()));
}

#[test]
fn test_price_bars_forecast_with_tree_models() {
    let bars: Vec<PriceBar> = (0..150)
        .map(|i| {
            let close = 200.0 + (i as f64 / 8.0).sin() * 10.0 + i as f64 * 0.2;
            PriceBar {
                timestamp: i as i64 * 3_600,
                open: close - 0.3,
                high: close + 1.2,
                low: close - 1.1,
                close,
                volume: 5_000.0 + ((i * 37) % 11) as f64 * 100.0,
            }
        })
        .collect();
    let mut builder = PriceFeatureBuilder::new(PriceField::Close, 1, 30).unwrap();
    let dataset = builder.build(&bars).unwrap();
    let config = PipelineConfig {
        training: TrainingConfig {
            models: vec!["Random Forest".to_string(), "XGBoost".to_string()],
            ..TrainingConfig::default()
        },
        ..PipelineConfig::default()
    };

    let run = run_forecast(&dataset, ModelCatalog::standard(), &config).unwrap();
    assert_eq!(run.registry.trained_names().len(), 2);
    let importance = run.registry.feature_importance("Random Forest").unwrap();
    assert_eq!(importance.len(), dataset.n_features());
    assert_eq!(run.test_metrics.len(), 2);

    let latest = builder.build_inference_features(&bars).unwrap();
    let next = run.registry.predict("XGBoost", &[latest]).unwrap();
    assert_eq!(next.len(), 1);
    assert!(next[0].is_finite());
}
