use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Money made per approved loan and lost per realized default
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitEconomics {
    pub revenue_per_approval: Decimal,
    pub loss_per_default: Decimal,
}

impl Default for UnitEconomics {
    fn default() -> Self {
        Self {
            revenue_per_approval: dec!(1000),
            loss_per_default: dec!(5000),
        }
    }
}

/// Outcome of approving every applicant whose default probability is at most `threshold`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalCurvePoint {
    pub threshold: f64,
    /// Fraction of applicants approved, in [0, 1].
    pub approval_rate: f64,
    /// Default rate among approved applicants; 0 when nobody is approved.
    pub realized_default_rate: f64,
    pub approved_count: usize,
    pub defaults: usize,
    pub expected_revenue: Decimal,
    pub expected_loss: Decimal,
    pub expected_net_value: Decimal,
    pub roi: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalCurve {
    pub model: String,
    pub points: Vec<ApprovalCurvePoint>,
}

impl ApprovalCurve {
    /// Point with the highest expected net value. Ties go to the lower threshold.
    pub fn optimal(&self) -> Option<&ApprovalCurvePoint> {
        let mut best: Option<&ApprovalCurvePoint> = None;
        for point in &self.points {
            best = match best {
                None => Some(point),
                Some(current) => {
                    let better = point.expected_net_value > current.expected_net_value
                        || (point.expected_net_value == current.expected_net_value
                            && point.threshold < current.threshold);
                    if better { Some(point) } else { Some(current) }
                }
            };
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(threshold: f64, net: Decimal) -> ApprovalCurvePoint {
        ApprovalCurvePoint {
            threshold,
            approval_rate: 0.0,
            realized_default_rate: 0.0,
            approved_count: 0,
            defaults: 0,
            expected_revenue: Decimal::ZERO,
            expected_loss: Decimal::ZERO,
            expected_net_value: net,
            roi: 0.0,
        }
    }

    #[test]
    fn test_optimal_prefers_lower_threshold_on_tie() {
        let curve = ApprovalCurve {
            model: "m".to_string(),
            points: vec![point(0.3, dec!(500)), point(0.1, dec!(500)), point(0.2, dec!(100))],
        };
        assert_eq!(curve.optimal().unwrap().threshold, 0.1);
    }

    #[test]
    fn test_optimal_on_empty_curve() {
        assert!(ApprovalCurve::default().optimal().is_none());
    }
}
