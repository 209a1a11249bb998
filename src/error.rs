//! Error types for tessel

use thiserror::Error;

/// Tessel compiler error type
///
/// Every error is fatal to the compilation unit; none are recoverable
/// inside the backend. They propagate to the caller unchanged.
#[derive(Debug, Error)]
pub enum CompilerError {
    /// Unsupported thread count or malformed architecture descriptor
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operand exceeds its instruction field width
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Tile grouping or segment lifecycle produced an impossible shape
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CompilerError>;
