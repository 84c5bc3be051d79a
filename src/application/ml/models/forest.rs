use super::{check_width, clip_probability, dense_matrix};
use crate::domain::errors::ModelError;
use crate::domain::ml::{Dataset, FitContext, FittedModel, ModelFamily, Task};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

pub const N_TREES: usize = 100;
pub const MAX_DEPTH: u16 = 10;
pub const MIN_SAMPLES_SPLIT: usize = 5;
pub const MIN_SAMPLES_LEAF: usize = 2;

/// Bagged regression trees. For classification the forest is fitted on 0/1
/// labels so the averaged leaves give the positive-class probability.
pub struct RandomForestFamily {
    task: Task,
    n_trees: usize,
}

impl RandomForestFamily {
    pub fn new(task: Task) -> Self {
        Self::with_trees(task, N_TREES)
    }

    pub fn with_trees(task: Task, n_trees: usize) -> Self {
        Self {
            task,
            n_trees: n_trees.max(1),
        }
    }
}

struct RandomForestFit {
    model: RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>,
    width: usize,
    task: Task,
}

impl ModelFamily for RandomForestFamily {
    fn name(&self) -> &'static str {
        "Random Forest"
    }

    fn task(&self) -> Task {
        self.task
    }

    fn reports_importance(&self) -> bool {
        true
    }

    fn fit(&self, train: &Dataset, ctx: &FitContext) -> Result<Box<dyn FittedModel>, ModelError> {
        let x = dense_matrix(self.name(), &train.features)?;
        let params = RandomForestRegressorParameters::default()
            .with_n_trees(self.n_trees)
            .with_max_depth(MAX_DEPTH)
            .with_min_samples_split(MIN_SAMPLES_SPLIT)
            .with_min_samples_leaf(MIN_SAMPLES_LEAF)
            .with_seed(ctx.seed);
        let model = RandomForestRegressor::fit(&x, &train.targets, params)
            .map_err(|e| ModelError::fit(self.name(), e))?;
        Ok(Box::new(RandomForestFit {
            model,
            width: train.n_features(),
            task: self.task,
        }))
    }
}

impl FittedModel for RandomForestFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_width("Random Forest", self.width, rows)?;
        let x = dense_matrix("Random Forest", rows)?;
        let predictions = self
            .model
            .predict(&x)
            .map_err(|e| ModelError::predict("Random Forest", e))?;
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
    fn test_forest_probabilities_separate_classes() {
        let features: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64, (i % 7) as f64]).collect();
        let targets: Vec<f64> = (0..60).map(|i| if i >= 30 { 1.0 } else { 0.0 }).collect();
        let ds = Dataset::new(features, targets, vec!["a".to_string(), "b".to_string()]).unwrap();
        let model = RandomForestFamily::new(Task::Classification)
            .fit(&ds, &FitContext::default())
            .unwrap();
        let probs = model.predict(&[vec![2.0, 2.0], vec![55.0, 6.0]]).unwrap();
        assert!(probs[0] < 0.5);
        assert!(probs[1] > 0.5);
    }

    #[test]
    fn test_forest_rejects_wrong_width() {
        let ds = Dataset::new(
            (0..20).map(|i| vec![i as f64]).collect(),
            (0..20).map(|i| i as f64).collect(),
            vec!["a".to_string()],
        )
        .unwrap();
        let model = RandomForestFamily::new(Task::Regression)
            .fit(&ds, &FitContext::default())
            .unwrap();
        assert!(model.predict(&[vec![1.0, 2.0]]).is_err());
    }
}
