use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsembleMethod {
    #[default]
    Mean,
    Median,
    Weighted,
}

impl fmt::Display for EnsembleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnsembleMethod::Mean => write!(f, "mean"),
            EnsembleMethod::Median => write!(f, "median"),
            EnsembleMethod::Weighted => write!(f, "weighted"),
        }
    }
}

impl FromStr for EnsembleMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mean" | "average" => Ok(EnsembleMethod::Mean),
            "median" => Ok(EnsembleMethod::Median),
            "weighted" => Ok(EnsembleMethod::Weighted),
            _ => Err(anyhow!(
                "Invalid ensemble method: {}. Must be 'mean', 'median', or 'weighted'",
                s
            )),
        }
    }
}

/// Combined prediction plus everything needed to explain it.
///
/// Computed on demand from the current registry; recompute after retraining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsemblePrediction {
    pub method: EnsembleMethod,
    pub values: Vec<f64>,
    pub contributors: Vec<String>,
    /// Each contributor's predictions after right-alignment.
    pub per_model: BTreeMap<String, Vec<f64>>,
    /// Effective weights used (all 1.0 for mean and median).
    pub weights: BTreeMap<String, f64>,
}

impl EnsemblePrediction {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_round_trip_through_str() {
        for method in [EnsembleMethod::Mean, EnsembleMethod::Median, EnsembleMethod::Weighted] {
            assert_eq!(EnsembleMethod::from_str(&method.to_string()).unwrap(), method);
        }
        assert!(EnsembleMethod::from_str("vote").is_err());
    }
}
