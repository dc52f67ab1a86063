//! Error types for gar-fl

use thiserror::Error;

/// All possible errors in gar-fl
#[derive(Error, Debug)]
pub enum GarError {
    /// Gradient matrix has no rows
    #[error("Empty gradient matrix provided")]
    EmptyUpdates,

    /// Column subset refers to a coordinate outside the gradient
    #[error("Index {index} out of bounds for dimension {len}")]
    IndexOutOfBounds {
        /// Offending index
        index: usize,
        /// Number of columns in the gradient matrix
        len: usize,
    },

    /// Configuration could not be parsed or names an unknown rule
    #[error("Configuration error: {0}")]
    Config(String),

    /// Hyperparameter is outside its valid range
    #[error("Invalid hyperparameter {name}: {value}")]
    InvalidHyperparameter {
        /// Configuration key
        name: &'static str,
        /// Rejected value
        value: f64,
    },

    /// Not enough rows (or coordinates) survive trimming/selection
    #[error("Insufficient quorum: need {needed}, got {actual}")]
    InsufficientQuorum {
        /// Minimum required entries
        needed: usize,
        /// Entries actually available
        actual: usize,
    },

    /// Error-feedback residual was sized for a different gradient
    #[error("Residual shape mismatch: buffer is {expected:?}, input is {actual:?}")]
    ResidualShapeMismatch {
        /// Shape of the stored residual
        expected: Vec<usize>,
        /// Shape of the incoming gradient
        actual: Vec<usize>,
    },
}

impl From<serde_json::Error> for GarError {
    fn from(e: serde_json::Error) -> Self {
        GarError::Config(e.to_string())
    }
}
