pub mod approval;
pub mod ensemble;
pub mod evaluation;
pub mod importance;
pub mod models;
pub mod registry;
pub mod scaling;
pub mod trainer;

pub use models::ModelCatalog;
pub use registry::{ComparisonRow, ModelRegistry, TrainedModel};
pub use trainer::ModelTrainer;
