//! Combines per-model prediction vectors into one ensemble prediction.
//!
//! Vectors are right-aligned: each is truncated from the front to the length
//! of the shortest contributor, so windowed models that predict fewer rows
//! still line up with the most recent observations.

use crate::domain::errors::PipelineError;
use crate::domain::ml::{EnsembleMethod, EnsemblePrediction};
use statrs::statistics::{Data, Median};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Weight used for a contributor with no supplied score
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Merges `predictions` with `method`.
///
/// Empty vectors are ignored. Returns `Ok(None)` when no model was supplied and
/// an alignment error when models were supplied but none produced predictions.
/// `weights` only matter for [`EnsembleMethod::Weighted`]; a missing entry
/// counts as 1.0, negative or non-finite entries as 0, and all-zero weights
/// fall back to a uniform average.
pub fn combine(
    predictions: &BTreeMap<String, Vec<f64>>,
    method: EnsembleMethod,
    weights: Option<&BTreeMap<String, f64>>,
) -> Result<Option<EnsemblePrediction>, PipelineError> {
    if predictions.is_empty() {
        return Ok(None);
    }

    let contributors: Vec<(&String, &Vec<f64>)> =
        predictions.iter().filter(|(_, p)| !p.is_empty()).collect();
    let common_len = contributors.iter().map(|(_, p)| p.len()).min().unwrap_or(0);
    if common_len == 0 {
        return Err(PipelineError::Alignment {
            reason: format!(
                "none of the {} supplied models produced predictions ({})",
                predictions.len(),
                predictions.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        });
    }

    let per_model: BTreeMap<String, Vec<f64>> = contributors
        .iter()
        .map(|(name, p)| ((*name).clone(), p[p.len() - common_len..].to_vec()))
        .collect();
    if contributors.iter().any(|(_, p)| p.len() != common_len) {
        debug!(
            "Ensemble right-aligned {} models to {} predictions",
            per_model.len(),
            common_len
        );
    }

    let mut effective: BTreeMap<String, f64> = per_model
        .keys()
        .map(|name| {
            let w = match method {
                EnsembleMethod::Weighted => weights
                    .and_then(|w| w.get(name).copied())
                    .unwrap_or(DEFAULT_WEIGHT),
                EnsembleMethod::Mean | EnsembleMethod::Median => DEFAULT_WEIGHT,
            };
            let w = if w.is_finite() && w > 0.0 { w } else { 0.0 };
            (name.clone(), w)
        })
        .collect();
    let weight_sum: f64 = effective.values().sum();
    if weight_sum <= 0.0 {
        warn!("All ensemble weights are zero; falling back to a uniform average");
        effective.values_mut().for_each(|w| *w = DEFAULT_WEIGHT);
    }
    let weight_sum: f64 = effective.values().sum();

    let values = (0..common_len)
        .map(|i| match method {
            EnsembleMethod::Mean => {
                per_model.values().map(|p| p[i]).sum::<f64>() / per_model.len() as f64
            }
            EnsembleMethod::Median => {
                Data::new(per_model.values().map(|p| p[i]).collect::<Vec<f64>>()).median()
            }
            EnsembleMethod::Weighted => {
                per_model
                    .iter()
                    .map(|(name, p)| p[i] * effective.get(name).copied().unwrap_or(0.0))
                    .sum::<f64>()
                    / weight_sum
            }
        })
        .collect();

    Ok(Some(EnsemblePrediction {
        method,
        values,
        contributors: per_model.keys().cloned().collect(),
        per_model,
        weights: effective,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preds(entries: &[(&str, Vec<f64>)]) -> BTreeMap<String, Vec<f64>> {
        entries
            .iter()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_mean_right_aligns_to_shortest() {
        let p = preds(&[
            ("a", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            ("b", vec![5.0, 4.0, 3.0, 2.0, 1.0]),
            ("c", vec![9.0, 9.0, 9.0]),
        ]);
        let e = combine(&p, EnsembleMethod::Mean, None).unwrap().unwrap();
        assert_eq!(e.len(), 3);
        assert_eq!(e.per_model["a"], vec![3.0, 4.0, 5.0]);
        assert_eq!(e.values, vec![5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_median() {
        let p = preds(&[("a", vec![1.0]), ("b", vec![10.0]), ("c", vec![2.0])]);
        let e = combine(&p, EnsembleMethod::Median, None).unwrap().unwrap();
        assert_eq!(e.values, vec![2.0]);
    }

    #[test]
    fn test_weighted_uses_supplied_weights() {
        let p = preds(&[("a", vec![0.0]), ("b", vec![10.0])]);
        let w: BTreeMap<String, f64> = [("a".to_string(), 1.0), ("b".to_string(), 3.0)]
            .into_iter()
            .collect();
        let e = combine(&p, EnsembleMethod::Weighted, Some(&w)).unwrap().unwrap();
        assert!((e.values[0] - 7.5).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_defaults_and_zero_fallback() {
        let p = preds(&[("a", vec![0.0]), ("b", vec![10.0])]);
        let e = combine(&p, EnsembleMethod::Weighted, None).unwrap().unwrap();
        assert!((e.values[0] - 5.0).abs() < 1e-12);

        let zeros: BTreeMap<String, f64> = [("a".to_string(), 0.0), ("b".to_string(), -1.0)]
            .into_iter()
            .collect();
        let e = combine(&p, EnsembleMethod::Weighted, Some(&zeros)).unwrap().unwrap();
        assert!((e.values[0] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_models_is_none_and_all_empty_is_error() {
        assert!(combine(&BTreeMap::new(), EnsembleMethod::Mean, None).unwrap().is_none());
        let p = preds(&[("a", vec![]), ("b", vec![])]);
        assert!(matches!(
            combine(&p, EnsembleMethod::Mean, None),
            Err(PipelineError::Alignment { .. })
        ));
    }

    #[test]
    fn test_empty_contributor_is_dropped() {
        let p = preds(&[("a", vec![1.0, 3.0]), ("seq", vec![])]);
        let e = combine(&p, EnsembleMethod::Mean, None).unwrap().unwrap();
        assert_eq!(e.contributors, vec!["a".to_string()]);
        assert_eq!(e.values, vec![1.0, 3.0]);
    }
}
