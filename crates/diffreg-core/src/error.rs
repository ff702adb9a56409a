//! Error types for registration operations.
//!
//! This module provides the structured error type shared by every diffreg
//! crate. Library code returns [`Result`]; binaries and I/O helpers wrap it
//! with `anyhow` at their edges.

use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Error in metric or loss computation.
    #[error("Metric error: {0}")]
    MetricError(String),

    /// Error in transform or sampling-grid construction.
    #[error("Transform error: {0}")]
    TransformError(String),

    /// Invalid configuration, detected eagerly at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Dimension mismatch (wrong rank or too few elements along an axis).
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Shape mismatch between two arrays that must agree.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Failure reported by the diffusion model collaborator.
    #[error("Model error: {0}")]
    ModelError(String),

    /// Failure reported by the dataset collaborator.
    #[error("Dataset error: {0}")]
    DatasetError(String),

    /// Failure while persisting results.
    #[error("Output error: {0}")]
    OutputError(String),

    /// Tensor data could not be converted to or from host memory.
    #[error("Data conversion error: {0}")]
    DataConversion(String),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a metric error.
    pub fn metric(msg: impl Into<String>) -> Self {
        Self::MetricError(msg.into())
    }

    /// Create a transform error.
    pub fn transform(msg: impl Into<String>) -> Self {
        Self::TransformError(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    /// Create a shape mismatch error from two shapes.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Create a model error.
    pub fn model(msg: impl Into<String>) -> Self {
        Self::ModelError(msg.into())
    }

    /// Create a dataset error.
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::DatasetError(msg.into())
    }

    /// Create an output error.
    pub fn output(msg: impl Into<String>) -> Self {
        Self::OutputError(msg.into())
    }

    /// Create a data conversion error.
    pub fn data_conversion(msg: impl Into<String>) -> Self {
        Self::DataConversion(msg.into())
    }
}

/// Fail with [`RegistrationError::ShapeMismatch`] unless both shapes agree.
pub fn ensure_same_shape(expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected != actual {
        return Err(RegistrationError::shape_mismatch(expected, actual));
    }
    Ok(())
}
