// Feature engineering
pub mod features;

// Partitioning and class balancing
pub mod resampling;
pub mod splitting;

// Model training, evaluation and ensembles
pub mod ml;

pub mod pipeline;
pub mod reporting;
