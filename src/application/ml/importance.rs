use crate::domain::errors::ModelError;
use crate::domain::ml::{Dataset, FittedModel};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;

fn mean_squared_error(model: &dyn FittedModel, rows: &[Vec<f64>], targets: &[f64]) -> Result<f64, ModelError> {
    let predictions = model.predict(rows)?;
    let n = predictions.len().min(targets.len());
    if n == 0 {
        return Ok(0.0);
    }
    let targets = &targets[targets.len() - n..];
    let predictions = &predictions[predictions.len() - n..];
    Ok(targets
        .iter()
        .zip(predictions)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n as f64)
}

/// Permutation importance: increase in squared error (Brier score for
/// probabilities) when one column is shuffled, normalized to sum to 1.
///
/// Columns whose shuffling does not hurt score 0. Sorted by importance, descending.
pub fn permutation_importance(
    model: &dyn FittedModel,
    data: &Dataset,
    seed: u64,
) -> Result<Vec<(String, f64)>, ModelError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let baseline = mean_squared_error(model, &data.features, &data.targets)?;

    let increases = (0..data.n_features())
        .into_par_iter()
        .map(|column| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(column as u64));
            let mut values = data.column(column);
            values.shuffle(&mut rng);
            let permuted: Vec<Vec<f64>> = data
                .features
                .iter()
                .zip(&values)
                .map(|(row, &v)| {
                    let mut row = row.clone();
                    row[column] = v;
                    row
                })
                .collect();
            let error = mean_squared_error(model, &permuted, &data.targets)?;
            Ok((error - baseline).max(0.0))
        })
        .collect::<Result<Vec<f64>, ModelError>>()?;

    let total: f64 = increases.iter().sum();
    let mut scores: Vec<(String, f64)> = data
        .feature_names
        .iter()
        .cloned()
        .zip(increases.into_iter().map(|inc| if total > 0.0 { inc / total } else { 0.0 }))
        .collect();
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FirstColumn;

    impl FittedModel for FirstColumn {
        fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
            Ok(rows.iter().map(|r| r[0]).collect())
        }
    }

    #[test]
    fn test_only_used_column_matters() {
        let features: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64, (i * 7 % 11) as f64]).collect();
        let targets: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let ds = Dataset::new(features, targets, vec!["signal".to_string(), "noise".to_string()]).unwrap();
        let scores = permutation_importance(&FirstColumn, &ds, 42).unwrap();
        assert_eq!(scores[0].0, "signal");
        assert!((scores[0].1 - 1.0).abs() < 1e-12);
        assert_eq!(scores[1].1, 0.0);
    }
}
