//! Unit economics and threshold grid for the approval analysis.

use super::read_var;
use crate::domain::ml::UnitEconomics;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EconomicsConfig {
    pub revenue_per_loan: Decimal,
    pub loss_per_default: Decimal,
    pub thresholds: Vec<f64>,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        Self {
            revenue_per_loan: dec!(1000),
            loss_per_default: dec!(5000),
            thresholds: vec![0.1, 0.2, 0.3, 0.4, 0.5],
        }
    }
}

impl EconomicsConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let thresholds = lookup("APPROVAL_THRESHOLDS")
            .and_then(|raw| {
                raw.split(',')
                    .map(|s| s.trim().parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .ok()
            })
            .filter(|t| !t.is_empty())
            .unwrap_or(defaults.thresholds);

        Self {
            revenue_per_loan: read_var(lookup, "REVENUE_PER_LOAN", defaults.revenue_per_loan),
            loss_per_default: read_var(lookup, "LOSS_PER_DEFAULT", defaults.loss_per_default),
            thresholds,
        }
    }

    pub fn unit_economics(&self) -> UnitEconomics {
        UnitEconomics {
            revenue_per_approval: self.revenue_per_loan,
            loss_per_default: self.loss_per_default,
        }
    }
}
