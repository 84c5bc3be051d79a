use super::{check_width, dense_matrix};
use crate::domain::errors::ModelError;
use crate::domain::ml::{Dataset, FitContext, FittedModel, ModelFamily, Task};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::{LinearRegression, LinearRegressionParameters};
use smartcore::linear::logistic_regression::{
    LogisticRegression, LogisticRegressionParameters,
};

/// Ordinary least squares on standardized features.
pub struct LinearRegressionFamily;

struct LinearRegressionFit {
    model: LinearRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>,
    width: usize,
}

impl ModelFamily for LinearRegressionFamily {
    fn name(&self) -> &'static str {
        "Linear Regression"
    }

    fn task(&self) -> Task {
        Task::Regression
    }

    fn needs_scaling(&self) -> bool {
        true
    }

    fn fit(&self, train: &Dataset, _ctx: &FitContext) -> Result<Box<dyn FittedModel>, ModelError> {
        let x = dense_matrix(self.name(), &train.features)?;
        let model = LinearRegression::fit(&x, &train.targets, LinearRegressionParameters::default())
            .map_err(|e| ModelError::fit(self.name(), e))?;
        Ok(Box::new(LinearRegressionFit {
            model,
            width: train.n_features(),
        }))
    }
}

impl FittedModel for LinearRegressionFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_width("Linear Regression", self.width, rows)?;
        let x = dense_matrix("Linear Regression", rows)?;
        self.model
            .predict(&x)
            .map_err(|e| ModelError::predict("Linear Regression", e))
    }
}

/// L2-regularized logistic regression (alpha = 1) on balanced, standardized data.
pub struct LogisticRegressionFamily;

/// Binary decision function extracted from the fitted smartcore model.
struct LogisticRegressionFit {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl ModelFamily for LogisticRegressionFamily {
    fn name(&self) -> &'static str {
        "Logistic Regression"
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
        let x = dense_matrix(self.name(), &train.features)?;
        let labels: Vec<i32> = train
            .targets
            .iter()
            .map(|&t| if t >= 0.5 { 1 } else { 0 })
            .collect();
        let params = LogisticRegressionParameters::default().with_alpha(1.0);
        let model: LogisticRegression<f64, i32, DenseMatrix<f64>, Vec<i32>> =
            LogisticRegression::fit(&x, &labels, params)
                .map_err(|e| ModelError::fit(self.name(), e))?;

        if model.classes().len() != 2 {
            return Err(ModelError::fit(
                self.name(),
                format!("expected 2 classes, found {}", model.classes().len()),
            ));
        }

        let coefficients = (0..train.n_features())
            .map(|j| *model.coefficients().get((0, j)))
            .collect();
        let intercept = *model.intercept().get((0, 0));

        Ok(Box::new(LogisticRegressionFit {
            coefficients,
            intercept,
        }))
    }
}

impl FittedModel for LogisticRegressionFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        check_width("Logistic Regression", self.coefficients.len(), rows)?;
        Ok(rows
            .iter()
            .map(|row| {
                let z = self.intercept
                    + row
                        .iter()
                        .zip(&self.coefficients)
                        .map(|(x, w)| x * w)
                        .sum::<f64>();
                1.0 / (1.0 + (-z).exp())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_regression_recovers_line() {
        let features: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..20).map(|i| 3.0 * i as f64 + 1.0).collect();
        let ds = Dataset::new(features, targets, vec!["x".to_string()]).unwrap();
        let model = LinearRegressionFamily.fit(&ds, &FitContext::default()).unwrap();
        let pred = model.predict(&[vec![30.0]]).unwrap();
        assert!((pred[0] - 91.0).abs() < 1e-6);
    }

    #[test]
    fn test_logistic_regression_orders_probabilities() {
        let features: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64 / 10.0 - 2.0]).collect();
        let targets: Vec<f64> = (0..40).map(|i| if i >= 20 { 1.0 } else { 0.0 }).collect();
        let ds = Dataset::new(features, targets, vec!["x".to_string()]).unwrap();
        let model = LogisticRegressionFamily.fit(&ds, &FitContext::default()).unwrap();
        let probs = model.predict(&[vec![-2.0], vec![0.0], vec![2.0]]).unwrap();
        assert!(probs[0] < 0.5);
        assert!(probs[2] > 0.5);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}
