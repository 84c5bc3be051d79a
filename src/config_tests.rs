use crate::config::PipelineConfig;
use crate::domain::ml::EnsembleMethod;
use rust_decimal_macros::dec;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn test_config_defaults() {
    let config = PipelineConfig::from_lookup(lookup_from(&[])).unwrap();

    assert!((config.split.test_fraction - 0.2).abs() < 1e-12);
    assert!((config.split.validation_fraction - 0.1).abs() < 1e-12);
    assert_eq!(config.training.seed, 42);
    assert_eq!(config.training.cv_folds, 5);
    assert_eq!(config.training.min_rows, 30);
    assert_eq!(config.training.horizon, 1);
    assert!(config.training.models.is_empty());
    assert_eq!(config.training.ensemble_method, EnsembleMethod::Mean);
    assert_eq!(config.economics.revenue_per_loan, dec!(1000));
    assert_eq!(config.economics.loss_per_default, dec!(5000));
    assert_eq!(config.economics.thresholds, vec![0.1, 0.2, 0.3, 0.4, 0.5]);
}

#[test]
fn test_config_overrides() {
    let config = PipelineConfig::from_lookup(lookup_from(&[
        ("SPLIT_TEST_FRACTION", "0.25"),
        ("FORECAST_HORIZON", "3"),
        ("TRAINING_MODELS", "Linear Regression, Random Forest"),
        ("ENSEMBLE_METHOD", "weighted"),
        ("LOSS_PER_DEFAULT", "4200.50"),
        ("APPROVAL_THRESHOLDS", "0.05,0.15"),
    ]))
    .unwrap();

    assert!((config.split.test_fraction - 0.25).abs() < 1e-12);
    assert_eq!(config.training.horizon, 3);
    assert_eq!(
        config.training.models,
        vec!["Linear Regression".to_string(), "Random Forest".to_string()]
    );
    assert_eq!(config.training.ensemble_method, EnsembleMethod::Weighted);
    assert_eq!(config.economics.loss_per_default, dec!(4200.50));
    assert_eq!(config.economics.thresholds, vec![0.05, 0.15]);
}

#[test]
fn test_unparsable_values_fall_back_to_defaults() {
    let config = PipelineConfig::from_lookup(lookup_from(&[
        ("TRAINING_SEED", "not-a-number"),
        ("APPROVAL_THRESHOLDS", "0.1,abc"),
    ]))
    .unwrap();

    assert_eq!(config.training.seed, 42);
    assert_eq!(config.economics.thresholds.len(), 5);
}

#[test]
fn test_invalid_fraction_rejected() {
    let result = PipelineConfig::from_lookup(lookup_from(&[("SPLIT_TEST_FRACTION", "1.5")]));
    assert!(result.is_err());
}

#[test]
fn test_zero_horizon_rejected() {
    let result = PipelineConfig::from_lookup(lookup_from(&[("FORECAST_HORIZON", "0")]));
    assert!(result.is_err());
}

#[test]
fn test_toml_config() {
    let raw = r#"
        [split]
        test_fraction = 0.3

        [training]
        horizon = 2
        models = ["Linear Regression"]
        ensemble_method = "median"

        [economics]
        thresholds = [0.2, 0.4]
    "#;
    let config = PipelineConfig::from_toml_str(raw).unwrap();

    assert!((config.split.test_fraction - 0.3).abs() < 1e-12);
    assert!((config.split.validation_fraction - 0.1).abs() < 1e-12);
    assert_eq!(config.training.horizon, 2);
    assert_eq!(config.training.ensemble_method, EnsembleMethod::Median);
    assert_eq!(config.economics.thresholds, vec![0.2, 0.4]);
    assert_eq!(config.economics.revenue_per_loan, dec!(1000));
}
