use super::{check_width, clip_probability, dense_matrix};
use crate::domain::errors::ModelError;
use crate::domain::ml::{Dataset, FitContext, FittedModel, ModelFamily, Task};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

/// Single tree on balanced data. Fitting squared error on 0/1 labels picks
/// the same splits as Gini impurity, and leaf means are class frequencies.
pub struct DecisionTreeFamily;

struct DecisionTreeFit {
    model: DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>,
    width: usize,
}

impl ModelFamily for DecisionTreeFamily {
    fn name(&self) -> &'static str {
        "Decision Tree"
    }

    fn task(&self) -> Task {
        Task::Classification
    }

    fn needs_balanced_classes(&self) -> bool {
        true
    }

    fn reports_importance(&self) -> bool {
        true
    }

    fn fit(&self, train: &Dataset, ctx: &FitContext) -> Result<Box<dyn FittedModel>, ModelError> {
        let x = dense_matrix(self.name(), &train.features)?;
        let params = DecisionTreeRegressorParameters {
            max_depth: Some(10),
            min_samples_leaf: 2,
            min_samples_split: 5,
            seed: Some(ctx.seed),
        };
        let model = DecisionTreeRegressor::fit(&x, &train.targets, params)
            .map_err(|e| ModelError::fit(self.name(), e))?;
        Ok(Box::new(DecisionTreeFit {
            model,
            width: train.n_features(),
        }))
    }
}

impl FittedModel for DecisionTreeFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_width("Decision Tree", self.width, rows)?;
        let x = dense_matrix("Decision Tree", rows)?;
        let predictions = self
            .model
            .predict(&x)
            .map_err(|e| ModelError::predict("Decision Tree", e))?;
        Ok(predictions.into_iter().map(clip_probability).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_learns_threshold() {
        let features: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..40).map(|i| if i >= 25 { 1.0 } else { 0.0 }).collect();
        let ds = Dataset::new(features, targets, vec!["x".to_string()]).unwrap();
        let model = DecisionTreeFamily.fit(&ds, &FitContext::default()).unwrap();
        let probs = model.predict(&[vec![3.0], vec![35.0]]).unwrap();
        assert_eq!(probs, vec![0.0, 1.0]);
    }
}
