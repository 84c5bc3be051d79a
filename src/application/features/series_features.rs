//! Generic time-series features for any ordered numeric table.

use super::indicators::{lag, rolling_mean, rolling_std};
use super::{FeatureColumns, assemble, check_layout, latest_row, shift_forward};
use crate::domain::errors::PipelineError;
use crate::domain::ml::Dataset;
use crate::domain::table::RawTable;

pub const LAGS: [usize; 5] = [1, 2, 3, 5, 7];
pub const ROLLING_WINDOWS: [usize; 3] = [5, 10, 20];

const STAGE: &str = "series features";

/// Lags and rolling statistics of a target column plus every other numeric
/// column as-is. The target is the target column `horizon` rows ahead.
#[derive(Debug, Clone)]
pub struct SeriesFeatureBuilder {
    target: String,
    horizon: usize,
    min_rows: usize,
    layout: Option<Vec<String>>,
}

impl SeriesFeatureBuilder {
    pub fn new(target: impl Into<String>, horizon: usize, min_rows: usize) -> Result<Self, PipelineError> {
        if horizon == 0 {
            return Err(PipelineError::invalid_config("horizon", "must be at least 1"));
        }
        Ok(Self {
            target: target.into(),
            horizon,
            min_rows,
            layout: None,
        })
    }

    pub fn layout(&self) -> Option<&[String]> {
        self.layout.as_deref()
    }

    fn columns(&self, table: &RawTable) -> Result<(FeatureColumns, Vec<Option<f64>>), PipelineError> {
        let target = table.numeric_column(&self.target)?;
        let mut columns: FeatureColumns = Vec::new();
        for name in table.numeric_column_names() {
            if name != self.target {
                let values = table.numeric_column(&name)?;
                columns.push((name, values));
            }
        }
        for l in LAGS {
            columns.push((format!("{}_lag_{}", self.target, l), lag(&target, l)));
        }
        for w in ROLLING_WINDOWS {
            columns.push((format!("{}_rolling_mean_{}", self.target, w), rolling_mean(&target, w)?));
            columns.push((format!("{}_rolling_std_{}", self.target, w), rolling_std(&target, w)?));
        }
        Ok((columns, target))
    }

    /// Builds the training dataset. The first call fixes the feature layout;
    /// later calls must produce the same one.
    pub fn build(&mut self, table: &RawTable) -> Result<Dataset, PipelineError> {
        let (columns, target) = self.columns(table)?;
        let names: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
        match &self.layout {
            Some(fixed) => check_layout(STAGE, fixed, &names)?,
            None => self.layout = Some(names),
        }
        assemble(STAGE, &columns, &shift_forward(&target, self.horizon), self.min_rows)
    }

    /// Feature vector of the most recent row, for forecasting past the end of the table.
    pub fn build_inference_features(&self, table: &RawTable) -> Result<Vec<f64>, PipelineError> {
        let layout = self.layout.as_ref().ok_or_else(|| PipelineError::NotTrained {
            name: STAGE.to_string(),
        })?;
        let (columns, _) = self.columns(table)?;
        latest_row(STAGE, layout, &columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(n: usize) -> RawTable {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        RawTable::from_columns(&[("x", x), ("y", y)]).unwrap()
    }

    #[test]
    fn test_target_is_shifted_and_warm_up_dropped() {
        let mut builder = SeriesFeatureBuilder::new("y", 1, 10).unwrap();
        let ds = builder.build(&table(50)).unwrap();
        // 19 warm-up rows for the 20-row window, 1 trailing row without a future value
        assert_eq!(ds.len(), 30);
        assert_eq!(ds.row_ids[0], 19);
        assert_eq!(ds.targets[0], 40.0);
        let lag1 = ds.feature_names.iter().position(|n| n == "y_lag_1").unwrap();
        assert_eq!(ds.features[0][lag1], 36.0);
    }

    #[test]
    fn test_insufficient_rows() {
        let mut builder = SeriesFeatureBuilder::new("y", 1, 30).unwrap();
        assert!(matches!(
            builder.build(&table(10)),
            Err(PipelineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_missing_target_column() {
        let mut builder = SeriesFeatureBuilder::new("price", 1, 1).unwrap();
        assert!(matches!(
            builder.build(&table(30)),
            Err(PipelineError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_inference_uses_fixed_layout() {
        let mut builder = SeriesFeatureBuilder::new("y", 1, 10).unwrap();
        assert!(builder.build_inference_features(&table(40)).is_err());
        let ds = builder.build(&table(40)).unwrap();
        let latest = builder.build_inference_features(&table(40)).unwrap();
        assert_eq!(latest.len(), ds.n_features());
        let other = RawTable::from_columns(&[("y", (0..40).map(|i| i as f64).collect())]).unwrap();
        assert!(builder.build_inference_features(&other).is_err());
    }
}
