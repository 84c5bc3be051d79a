use super::{check_width, dense_matrix};
use crate::domain::errors::ModelError;
use crate::domain::ml::{Dataset, FitContext, FittedModel, ModelFamily, Task};
use smartcore::algorithm::neighbour::KNNAlgorithmName;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::metrics::distance::euclidian::Euclidian;
use smartcore::neighbors::knn_regressor::{KNNRegressor, KNNRegressorParameters};

pub const K: usize = 5;

/// k-nearest neighbours; the mean 0/1 label of the neighbours is the
/// positive-class probability.
pub struct KnnFamily;

struct KnnFit {
    model: KNNRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>, Euclidian<f64>>,
    width: usize,
}

impl ModelFamily for KnnFamily {
    fn name(&self) -> &'static str {
        "KNN"
    }

    fn task(&self) -> Task {
        Task::Classification
    }

    fn needs_scaling(&self) -> bool {
        true
    }

    fn needs_balanced_classes(&self) -> bool {
        true
    }

    fn fit(&self, train: &Dataset, _ctx: &FitContext) -> Result<Box<dyn FittedModel>, ModelError> {
        if train.is_empty() {
            return Err(ModelError::fit(self.name(), "empty training set"));
        }
        let x = dense_matrix(self.name(), &train.features)?;
        // Linear search tolerates the duplicate points oversampling creates
        let params = KNNRegressorParameters::<f64, Euclidian<f64>>::default()
            .with_k(K.min(train.len()))
            .with_algorithm(KNNAlgorithmName::LinearSearch);
        let model = KNNRegressor::fit(&x, &train.targets, params)
            .map_err(|e| ModelError::fit(self.name(), e))?;
        Ok(Box::new(KnnFit {
            model,
            width: train.n_features(),
        }))
    }
}

impl FittedModel for KnnFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_width("KNN", self.width, rows)?;
        let x = dense_matrix("KNN", rows)?;
        self.model
            .predict(&x)
            .map_err(|e| ModelError::predict("KNN", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knn_probability_is_neighbour_share() {
        let features: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..10).map(|i| if i >= 5 { 1.0 } else { 0.0 }).collect();
        let ds = Dataset::new(features, targets, vec!["x".to_string()]).unwrap();
        let model = KnnFamily.fit(&ds, &FitContext::default()).unwrap();
        let probs = model.predict(&[vec![0.0], vec![9.0]]).unwrap();
        assert!(probs[0].abs() < 1e-12);
        assert!((probs[1] - 1.0).abs() < 1e-12);
    }
}
