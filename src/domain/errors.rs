use thiserror::Error;

/// Structural and precondition failures of the training pipeline.
///
/// These stop the workflow that raised them but never the host process.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "Insufficient data in {stage}: {available} usable rows, at least {required} required (fetch more data)"
    )]
    InsufficientData {
        stage: String,
        available: usize,
        required: usize,
    },

    #[error("Invalid configuration for {parameter}: {reason}")]
    InvalidConfig { parameter: String, reason: String },

    #[error("Missing column: {column}")]
    MissingColumn { column: String },

    #[error("Invalid data in column {column}: {reason}")]
    InvalidData { column: String, reason: String },

    #[error("Unseen category in {column}: '{value}' was not present when the encoder was fitted")]
    UnseenCategory { column: String, value: String },

    #[error("Unknown model: {name}")]
    UnknownModel { name: String },

    #[error("Model {name} does not support {task} tasks")]
    UnsupportedTask { name: String, task: String },

    #[error("Model {name} has not been trained")]
    NotTrained { name: String },

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Ensemble alignment failed: {reason}")]
    Alignment { reason: String },

    #[error("Feature selection with {model} failed: {source}")]
    Selection {
        model: String,
        #[source]
        source: ModelError,
    },

    #[error("Prediction with {model} failed: {source}")]
    Prediction {
        model: String,
        #[source]
        source: ModelError,
    },
}

/// Failures raised by a single model family. Recovered inside the trainer.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{model} fit failed: {reason}")]
    Fit { model: String, reason: String },

    #[error("{model} predict failed: {reason}")]
    Predict { model: String, reason: String },

    #[error("{model} expects {expected} features, got {actual}")]
    FeatureWidth {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("{model} panicked during training: {message}")]
    Panicked { model: String, message: String },
}

impl ModelError {
    pub fn fit(model: &str, reason: impl ToString) -> Self {
        ModelError::Fit {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn predict(model: &str, reason: impl ToString) -> Self {
        ModelError::Predict {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl PipelineError {
    pub fn insufficient(stage: &str, available: usize, required: usize) -> Self {
        PipelineError::InsufficientData {
            stage: stage.to_string(),
            available,
            required,
        }
    }

    pub fn invalid_config(parameter: &str, reason: impl ToString) -> Self {
        PipelineError::InvalidConfig {
            parameter: parameter.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message_is_actionable() {
        let err = PipelineError::insufficient("series feature builder", 9, 30);
        let msg = err.to_string();
        assert!(msg.contains("series feature builder"));
        assert!(msg.contains("9"));
        assert!(msg.contains("30"));
        assert!(msg.contains("fetch more data"));
    }

    #[test]
    fn test_model_error_names_model() {
        let err = ModelError::fit("Random Forest", "empty matrix");
        assert_eq!(err.to_string(), "Random Forest fit failed: empty matrix");
    }
}
