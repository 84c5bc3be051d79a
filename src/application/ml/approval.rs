//! Lending economics of approving applicants below a default-probability threshold.

use crate::application::ml::registry::ModelRegistry;
use crate::domain::errors::PipelineError;
use crate::domain::ml::{ApprovalCurve, ApprovalCurvePoint, Dataset, UnitEconomics};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::info;

/// Thresholds swept when none are configured
pub const DEFAULT_THRESHOLDS: [f64; 10] = [0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45, 0.5];

/// Sweeps `thresholds`: an applicant is approved when its default probability
/// is at most the threshold.
///
/// `outcomes` are 0/1 default labels aligned with `probabilities`. Thresholds
/// are sorted and deduplicated; a threshold that approves nobody still yields
/// a point with zero rates and zero value.
pub fn approval_curve(
    model: &str,
    probabilities: &[f64],
    outcomes: &[f64],
    thresholds: &[f64],
    economics: &UnitEconomics,
) -> Result<ApprovalCurve, PipelineError> {
    if probabilities.len() != outcomes.len() {
        return Err(PipelineError::ShapeMismatch {
            context: "approval analysis".to_string(),
            expected: outcomes.len(),
            actual: probabilities.len(),
        });
    }
    if probabilities.is_empty() {
        return Err(PipelineError::insufficient("approval analysis", 0, 1));
    }
    if thresholds.is_empty() {
        return Err(PipelineError::invalid_config(
            "thresholds",
            "at least one threshold is required",
        ));
    }
    if let Some(bad) = thresholds
        .iter()
        .find(|t| !t.is_finite() || **t < 0.0 || **t > 1.0)
    {
        return Err(PipelineError::invalid_config(
            "thresholds",
            format!("{} is outside [0, 1]", bad),
        ));
    }

    let mut sorted = thresholds.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();

    let total = probabilities.len();
    let points = sorted
        .into_iter()
        .map(|threshold| {
            let (approved_count, defaults) = probabilities
                .iter()
                .zip(outcomes)
                .filter(|(p, _)| **p <= threshold)
                .fold((0usize, 0usize), |(n, d), (_, y)| {
                    (n + 1, d + usize::from(*y >= 0.5))
                });
            let expected_revenue = economics.revenue_per_approval * Decimal::from(approved_count);
            let expected_loss = economics.loss_per_default * Decimal::from(defaults);
            let expected_net_value = expected_revenue - expected_loss;
            let roi = if expected_revenue > Decimal::ZERO {
                (expected_net_value / expected_revenue * Decimal::ONE_HUNDRED)
                    .to_f64()
                    .unwrap_or(0.0)
            } else {
                0.0
            };
            ApprovalCurvePoint {
                threshold,
                approval_rate: approved_count as f64 / total as f64,
                realized_default_rate: if approved_count > 0 {
                    defaults as f64 / approved_count as f64
                } else {
                    0.0
                },
                approved_count,
                defaults,
                expected_revenue,
                expected_loss,
                expected_net_value,
                roi,
            }
        })
        .collect();

    Ok(ApprovalCurve {
        model: model.to_string(),
        points,
    })
}

/// Scores `data` with a trained classifier and sweeps the approval thresholds.
pub fn analyze_approval_levels(
    registry: &ModelRegistry,
    model: &str,
    data: &Dataset,
    thresholds: &[f64],
    economics: &UnitEconomics,
) -> Result<ApprovalCurve, PipelineError> {
    let probabilities = registry.predict(model, &data.features)?;
    let outcomes = &data.targets[data.len() - probabilities.len().min(data.len())..];
    let curve = approval_curve(model, &probabilities, outcomes, thresholds, economics)?;
    if let Some(best) = curve.optimal() {
        info!(
            "{}: optimal threshold {:.2} approves {:.1}% with net value {}",
            model,
            best.threshold,
            best.approval_rate * 100.0,
            best.expected_net_value
        );
    }
    Ok(curve)
}
