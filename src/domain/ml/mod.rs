pub mod approval;
pub mod dataset;
pub mod ensemble;
pub mod metrics;
pub mod model;

pub use approval::{ApprovalCurve, ApprovalCurvePoint, UnitEconomics};
pub use dataset::{Dataset, DatasetSplit};
pub use ensemble::{EnsembleMethod, EnsemblePrediction};
pub use metrics::{
    ClassScores, ClassificationMetrics, ClassificationReport, ConfusionMatrix,
    CrossValidationSummary, ErrorMetrics, MetricValue, MetricsRecord, RegressionMetrics,
};
pub use model::{FitContext, FittedModel, ModelFamily, ModelStatus, Task, TrainingOutcome};
