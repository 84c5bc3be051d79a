use super::{check_width, clip_probability, dense_matrix};
use crate::domain::errors::ModelError;
use crate::domain::ml::{Dataset, FitContext, FittedModel, ModelFamily, Task};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::xgboost::{XGRegressor, XGRegressorParameters};

pub const N_ESTIMATORS: usize = 100;
pub const MAX_DEPTH: u16 = 6;
pub const LEARNING_RATE: f64 = 0.1;
pub const SUBSAMPLE: f64 = 0.8;

/// Gradient boosted trees (smartcore's XGBoost, squared-error objective).
///
/// Boosting starts from the training target mean. For classification the
/// 0/1 fit is clipped into a probability.
pub struct XGBoostFamily {
    task: Task,
}

impl XGBoostFamily {
    pub fn new(task: Task) -> Self {
        Self { task }
    }
}

struct XGBoostFit {
    model: XGRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>,
    width: usize,
    task: Task,
}

impl ModelFamily for XGBoostFamily {
    fn name(&self) -> &'static str {
        "XGBoost"
    }

    fn task(&self) -> Task {
        self.task
    }

    fn reports_importance(&self) -> bool {
        true
    }

    fn fit(&self, train: &Dataset, ctx: &FitContext) -> Result<Box<dyn FittedModel>, ModelError> {
        if train.is_empty() {
            return Err(ModelError::fit(self.name(), "empty training set"));
        }
        let x = dense_matrix(self.name(), &train.features)?;
        let base_score = train.targets.iter().sum::<f64>() / train.len() as f64;
        let params = XGRegressorParameters::default()
            .with_n_estimators(N_ESTIMATORS)
            .with_max_depth(MAX_DEPTH)
            .with_learning_rate(LEARNING_RATE)
            .with_subsample(SUBSAMPLE)
            .with_base_score(base_score)
            .with_seed(ctx.seed);
        let model = XGRegressor::fit(&x, &train.targets, params)
            .map_err(|e| ModelError::fit(self.name(), e))?;
        Ok(Box::new(XGBoostFit {
            model,
            width: train.n_features(),
            task: self.task,
        }))
    }
}

impl FittedModel for XGBoostFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_width("XGBoost", self.width, rows)?;
        let x = dense_matrix("XGBoost", rows)?;
        let predictions = self
            .model
            .predict(&x)
            .map_err(|e| ModelError::predict("XGBoost", e))?;
        Ok(match self.task {
            Task::Regression => predictions,
            Task::Classification => predictions.into_iter().map(clip_probability).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boosting_fits_step_function() {
        let features: Vec<Vec<f64>> = (0..80).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..80).map(|i| if i < 40 { 10.0 } else { 20.0 }).collect();
        let ds = Dataset::new(features, targets, vec!["x".to_string()]).unwrap();
        let model = XGBoostFamily::new(Task::Regression)
            .fit(&ds, &FitContext::default())
            .unwrap();
        let pred = model.predict(&[vec![5.0], vec![70.0]]).unwrap();
        assert!(pred[0] < 13.0);
        assert!(pred[1] > 17.0);
    }
}
