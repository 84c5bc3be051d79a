//! Model families and the catalog they are registered in.
//!
//! Every family has a fixed hyperparameter configuration. Classification
//! families output the positive-class probability, which is why several of
//! them are built on smartcore regressors fitted to 0/1 labels.

pub mod boosting;
pub mod forest;
pub mod linear;
pub mod neighbors;
pub mod network;
pub mod sequence;
pub mod tree;

use crate::domain::errors::{ModelError, PipelineError};
use crate::domain::ml::{ModelFamily, Task};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::sync::Arc;

pub use boosting::XGBoostFamily;
pub use forest::RandomForestFamily;
pub use linear::{LinearRegressionFamily, LogisticRegressionFamily};
pub use neighbors::KnnFamily;
pub use network::NeuralNetworkFamily;
pub use sequence::SequenceNetworkFamily;
pub use tree::DecisionTreeFamily;

pub(crate) fn dense_matrix(model: &str, rows: &[Vec<f64>]) -> Result<DenseMatrix<f64>, ModelError> {
    DenseMatrix::from_2d_vec(&rows.to_vec()).map_err(|e| ModelError::fit(model, e))
}

pub(crate) fn check_width(model: &str, expected: usize, rows: &[Vec<f64>]) -> Result<(), ModelError> {
    match rows.iter().find(|r| r.len() != expected) {
        Some(row) => Err(ModelError::FeatureWidth {
            model: model.to_string(),
            expected,
            actual: row.len(),
        }),
        None => Ok(()),
    }
}

pub(crate) fn clip_probability(p: f64) -> f64 {
    p.clamp(0.0, 1.0)
}

/// Lookup table of model families, keyed by task and name.
#[derive(Clone, Default)]
pub struct ModelCatalog {
    families: Vec<Arc<dyn ModelFamily>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in family for both tasks.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        catalog.register(Arc::new(LinearRegressionFamily));
        catalog.register(Arc::new(RandomForestFamily::new(Task::Regression)));
        catalog.register(Arc::new(XGBoostFamily::new(Task::Regression)));
        catalog.register(Arc::new(NeuralNetworkFamily::new(Task::Regression)));
        catalog.register(Arc::new(SequenceNetworkFamily));

        catalog.register(Arc::new(RandomForestFamily::new(Task::Classification)));
        catalog.register(Arc::new(XGBoostFamily::new(Task::Classification)));
        catalog.register(Arc::new(LogisticRegressionFamily));
        catalog.register(Arc::new(NeuralNetworkFamily::new(Task::Classification)));
        catalog.register(Arc::new(KnnFamily));
        catalog.register(Arc::new(DecisionTreeFamily));
        catalog
    }

    /// Adds a family, replacing any existing one with the same task and name.
    pub fn register(&mut self, family: Arc<dyn ModelFamily>) {
        self.families
            .retain(|f| !(f.task() == family.task() && f.name() == family.name()));
        self.families.push(family);
    }

    pub fn names(&self, task: Task) -> Vec<&'static str> {
        self.families
            .iter()
            .filter(|f| f.task() == task)
            .map(|f| f.name())
            .collect()
    }

    pub fn get(&self, task: Task, name: &str) -> Result<Arc<dyn ModelFamily>, PipelineError> {
        let wanted = name.trim();
        let mut known_elsewhere = false;
        for family in &self.families {
            if family.name().eq_ignore_ascii_case(wanted) {
                if family.task() == task {
                    return Ok(Arc::clone(family));
                }
                known_elsewhere = true;
            }
        }
        if known_elsewhere {
            Err(PipelineError::UnsupportedTask {
                name: wanted.to_string(),
                task: task.to_string(),
            })
        } else {
            Err(PipelineError::UnknownModel {
                name: wanted.to_string(),
            })
        }
    }

    /// Families for the requested names, in request order. Empty means all for the task.
    pub fn resolve(
        &self,
        task: Task,
        requested: &[String],
    ) -> Result<Vec<Arc<dyn ModelFamily>>, PipelineError> {
        if requested.is_empty() {
            return Ok(self
                .families
                .iter()
                .filter(|f| f.task() == task)
                .cloned()
                .collect());
        }
        requested.iter().map(|name| self.get(task, name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_names() {
        let catalog = ModelCatalog::standard();
        assert_eq!(
            catalog.names(Task::Regression),
            vec![
                "Linear Regression",
                "Random Forest",
                "XGBoost",
                "Neural Network",
                "Sequence Network"
            ]
        );
        assert_eq!(catalog.names(Task::Classification).len(), 6);
    }

    #[test]
    fn test_lookup_errors() {
        let catalog = ModelCatalog::standard();
        assert!(catalog.get(Task::Regression, "random forest").is_ok());
        assert!(matches!(
            catalog.get(Task::Regression, "KNN"),
            Err(PipelineError::UnsupportedTask { .. })
        ));
        assert!(matches!(
            catalog.get(Task::Classification, "Prophet"),
            Err(PipelineError::UnknownModel { .. })
        ));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut catalog = ModelCatalog::standard();
        catalog.register(Arc::new(LinearRegressionFamily));
        assert_eq!(catalog.names(Task::Regression).len(), 5);
    }

    #[test]
    fn test_width_check() {
        assert!(check_width("m", 2, &[vec![1.0, 2.0]]).is_ok());
        assert!(matches!(
            check_width("m", 2, &[vec![1.0]]),
            Err(ModelError::FeatureWidth { .. })
        ));
    }
}
