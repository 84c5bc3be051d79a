//! Dataset partitioning configuration.

use super::read_var;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub test_fraction: f64,
    pub validation_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            validation_fraction: 0.1,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            test_fraction: read_var(lookup, "SPLIT_TEST_FRACTION", defaults.test_fraction),
            validation_fraction: read_var(
                lookup,
                "SPLIT_VALIDATION_FRACTION",
                defaults.validation_fraction,
            ),
            seed: read_var(lookup, "SPLIT_SEED", defaults.seed),
        }
    }
}
