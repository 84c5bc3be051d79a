//! Feature builders: raw tables and price bars in, [`Dataset`] out.
//!
//! Each builder fixes its feature layout on the first build and reuses it
//! unchanged for every later transform.

pub mod indicators;
pub mod price_features;
pub mod selection;
pub mod series_features;
pub mod tabular_features;

use crate::domain::errors::PipelineError;
use crate::domain::ml::Dataset;
use tracing::debug;

pub use price_features::PriceFeatureBuilder;
pub use selection::{FeatureScore, FeatureSelection, SelectionMethod, select_features, select_k_best};
pub use series_features::SeriesFeatureBuilder;
pub use tabular_features::{RiskLevel, TabularFeatureBuilder, TabularSchema};

/// Named feature columns of equal length, each value `None` until defined
pub(crate) type FeatureColumns = Vec<(String, Vec<Option<f64>>)>;

/// Keeps the rows where every feature and the target are defined.
///
/// Row ids are the source positions. Fails with `InsufficientData` when fewer
/// than `min_rows` rows survive.
pub(crate) fn assemble(
    stage: &str,
    columns: &FeatureColumns,
    targets: &[Option<f64>],
    min_rows: usize,
) -> Result<Dataset, PipelineError> {
    let mut features = Vec::new();
    let mut kept_targets = Vec::new();
    let mut row_ids = Vec::new();
    for (t, target) in targets.iter().enumerate() {
        let Some(target) = target else { continue };
        let row: Option<Vec<f64>> = columns.iter().map(|(_, values)| values[t]).collect();
        if let Some(row) = row {
            features.push(row);
            kept_targets.push(*target);
            row_ids.push(t);
        }
    }
    debug!(
        "{}: kept {} of {} rows after dropping warm-up and unlabelled rows",
        stage,
        features.len(),
        targets.len()
    );
    if features.len() < min_rows {
        return Err(PipelineError::insufficient(stage, features.len(), min_rows));
    }
    let names = columns.iter().map(|(name, _)| name.clone()).collect();
    Dataset::with_row_ids(features, kept_targets, names, row_ids)
}

/// Target shifted `horizon` rows into the future; the last `horizon` rows have none.
pub(crate) fn shift_forward(values: &[Option<f64>], horizon: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| values.get(t + horizon).copied().flatten())
        .collect()
}

/// Checks that a rebuilt layout matches the one fixed on the first build.
pub(crate) fn check_layout(stage: &str, fixed: &[String], built: &[String]) -> Result<(), PipelineError> {
    if let Some(missing) = fixed.iter().find(|name| !built.contains(name)) {
        return Err(PipelineError::MissingColumn {
            column: missing.clone(),
        });
    }
    if fixed != built {
        return Err(PipelineError::ShapeMismatch {
            context: format!("{} feature layout", stage),
            expected: fixed.len(),
            actual: built.len(),
        });
    }
    Ok(())
}

/// Latest row of `columns` in the order of `layout`, all values defined.
pub(crate) fn latest_row(
    stage: &str,
    layout: &[String],
    columns: &FeatureColumns,
) -> Result<Vec<f64>, PipelineError> {
    let built: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
    check_layout(stage, layout, &built)?;
    let last = columns
        .first()
        .map(|(_, values)| values.len())
        .unwrap_or(0)
        .checked_sub(1)
        .ok_or_else(|| PipelineError::insufficient(stage, 0, 1))?;
    columns
        .iter()
        .map(|(name, values)| {
            values[last].ok_or_else(|| PipelineError::InvalidData {
                column: name.clone(),
                reason: "not enough history to compute the latest value".to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_forward_drops_tail() {
        let v = vec![Some(1.0), Some(2.0), Some(3.0)];
        assert_eq!(shift_forward(&v, 1), vec![Some(2.0), Some(3.0), None]);
    }

    #[test]
    fn test_assemble_keeps_complete_rows() {
        let columns: FeatureColumns = vec![("a".to_string(), vec![None, Some(1.0), Some(2.0)])];
        let ds = assemble("test", &columns, &[Some(0.0), Some(1.0), None], 1).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.row_ids, vec![1]);
        assert!(matches!(
            assemble("test", &columns, &[Some(0.0), Some(1.0), None], 2),
            Err(PipelineError::InsufficientData { available: 1, required: 2, .. })
        ));
    }
}
