//! Error types for the nested evaluation harness

use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Fit failure in '{family}' on outer fold {fold} with {params}: {reason}")]
    FitFailure {
        family: String,
        fold: usize,
        params: String,
        reason: String,
    },

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Convergence failed after {iterations} iterations")]
    ConvergenceError { iterations: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl HarnessError {
    /// Whether this error describes a misconfigured run rather than a
    /// failure that happened while fitting.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HarnessError::ConfigError(_)
                | HarnessError::BudgetExceeded(_)
                | HarnessError::InvalidParameter { .. }
                | HarnessError::FeatureNotFound(_)
        )
    }
}

impl From<polars::error::PolarsError> for HarnessError {
    fn from(err: polars::error::PolarsError) -> Self {
        HarnessError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for HarnessError {
    fn from(err: ndarray::ShapeError) -> Self {
        HarnessError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HarnessError::ConfigError("fold count too large".to_string());
        assert_eq!(err.to_string(), "Configuration error: fold count too large");
    }

    #[test]
    fn test_fit_failure_display_carries_context() {
        let err = HarnessError::FitFailure {
            family: "Ridge Regression".to_string(),
            fold: 3,
            params: "{alpha=0.1}".to_string(),
            reason: "singular matrix".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Ridge Regression"));
        assert!(msg.contains("fold 3"));
        assert!(msg.contains("alpha=0.1"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(HarnessError::BudgetExceeded("0s".into()).is_configuration());
        assert!(HarnessError::ConfigError("x".into()).is_configuration());
        assert!(!HarnessError::ModelNotFitted.is_configuration());
        assert!(!HarnessError::ComputationError("nan".into()).is_configuration());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HarnessError = io_err.into();
        assert!(matches!(err, HarnessError::IoError(_)));
    }
}
