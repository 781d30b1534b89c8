//! Error types shared across the workspace

use thiserror::Error;

/// Core error type for Koopman RL operations
#[derive(Error, Debug)]
pub enum KoopmanError {
    /// Environment-related errors
    #[error("Environment error: {0}")]
    Environment(String),

    /// Model-fitting errors
    #[error("Model error: {0}")]
    Model(String),

    /// Policy-related errors
    #[error("Policy error: {0}")]
    Policy(String),

    /// Dimension mismatch between components; raised at construction time
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Dimension actually received
        actual: usize,
    },

    /// Policy produced NaN, negative, or non-normalized probabilities.
    /// Fatal for the current refit cycle; the caller must not persist
    /// parameters from the offending iteration.
    #[error("Degenerate action distribution: {0}")]
    DegenerateDistribution(String),

    /// Checkpoint read failure; fatal before training proceeds
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Numerical computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Koopman RL operations
pub type Result<T> = std::result::Result<T, KoopmanError>;
