//! Error types for the Kolosal workflow engine

use thiserror::Error;

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, KolosalError>;

/// Main error type for the workflow engine
#[derive(Error, Debug)]
pub enum KolosalError {
    #[error("Invalid split fraction: {0} (must be in the open interval (0, 1))")]
    InvalidFraction(f64),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Recipe must be fit before it can be applied")]
    UnfitRecipe,

    #[error("Missing value for tunable parameter: {0}")]
    MissingParameter(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Prediction error: {0}")]
    PredictionError(String),

    #[error("Convergence failed after {iterations} iterations")]
    ConvergenceError { iterations: usize },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),
}

impl KolosalError {
    /// Whether the error reflects a structural/configuration problem.
    ///
    /// Fatal errors abort a tuning run. Everything else raised while fitting a
    /// single candidate is recorded as a candidate failure instead.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KolosalError::InvalidFraction(_)
                | KolosalError::InsufficientData(_)
                | KolosalError::UnfitRecipe
                | KolosalError::ModelNotFitted
                | KolosalError::MissingParameter(_)
                | KolosalError::SchemaMismatch(_)
                | KolosalError::ConfigError(_)
                | KolosalError::ThreadPoolError(_)
        )
    }

    pub(crate) fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        KolosalError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for KolosalError {
    fn from(err: polars::error::PolarsError) -> Self {
        KolosalError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for KolosalError {
    fn from(err: serde_json::Error) -> Self {
        KolosalError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for KolosalError {
    fn from(err: ndarray::ShapeError) -> Self {
        KolosalError::SchemaMismatch(format!("invalid matrix shape: {}", err))
    }
}
