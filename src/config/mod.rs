//! Configuration module for Riskcast.
//!
//! Settings load from environment variables (optionally via `.env`) or from a
//! TOML file, organized by concern: Split, Training, and Economics.

mod economics_config;
mod split_config;
mod training_config;

pub use economics_config::EconomicsConfig;
pub use split_config::SplitConfig;
pub use training_config::TrainingConfig;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Parses `key` through `lookup`, falling back to `default` when unset or unparsable.
pub(crate) fn read_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub split: SplitConfig,
    pub training: TrainingConfig,
    pub economics: EconomicsConfig,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self {
            split: SplitConfig::from_lookup(&lookup),
            training: TrainingConfig::from_lookup(&lookup),
            economics: EconomicsConfig::from_lookup(&lookup),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Failed to parse pipeline config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("test_fraction", self.split.test_fraction),
            ("validation_fraction", self.split.validation_fraction),
        ];
        for (name, value) in fractions {
            if !(0.0..1.0).contains(&value) {
                anyhow::bail!("Invalid {}: {}. Must be in [0, 1)", name, value);
            }
        }
        if self.training.horizon == 0 {
            anyhow::bail!("Invalid FORECAST_HORIZON: must be at least 1");
        }
        if self.training.sequence_length < 2 {
            anyhow::bail!(
                "Invalid SEQUENCE_LENGTH: {}. Must be at least 2",
                self.training.sequence_length
            );
        }
        if self.training.cv_folds == 1 {
            anyhow::bail!("Invalid TRAINING_CV_FOLDS: 1. Use 0 to disable or at least 2");
        }
        if self.economics.revenue_per_loan <= Decimal::ZERO
            || self.economics.loss_per_default <= Decimal::ZERO
        {
            anyhow::bail!(
                "Unit economics must be positive: revenue {} / loss {}",
                self.economics.revenue_per_loan,
                self.economics.loss_per_default
            );
        }
        if let Some(t) = self
            .economics
            .thresholds
            .iter()
            .find(|t| !(0.0..=1.0).contains(*t))
        {
            anyhow::bail!("Invalid approval threshold {}. Must be in [0, 1]", t);
        }
        Ok(())
    }
}
