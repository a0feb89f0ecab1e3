//! Error types for the insurance modeling pipeline

use crate::training::ModelFamily;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ModelingError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum ModelingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Domain error: column '{column}' contains {value}, log1p requires values > -1")]
    Domain { column: String, value: f64 },

    #[error("Failed to fit {family} model: {reason}")]
    Fit { family: ModelFamily, reason: String },

    #[error("Data error: {0}")]
    Data(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelingError {
    /// Wrap any error raised while fitting `family`.
    pub(crate) fn fit(family: ModelFamily, err: impl std::fmt::Display) -> Self {
        ModelingError::Fit {
            family,
            reason: err.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for ModelingError {
    fn from(err: polars::error::PolarsError) -> Self {
        ModelingError::Data(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ModelingError {
    fn from(err: ndarray::ShapeError) -> Self {
        ModelingError::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
