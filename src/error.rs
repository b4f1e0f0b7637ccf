use thiserror::Error;

/// Errors surfaced by the optimizer to its caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Internal optimizer failure: {0}")]
    Internal(String),
}

impl OptimizerError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }
}

/// Failures reported by a [`crate::data::PriceSource`]. These never reach the
/// caller of the optimizer; they trigger the synthetic-history fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceSourceError {
    #[error("Symbol not found: {symbol}")]
    NotFound { symbol: String },

    #[error("Price data unavailable for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },
}
