use thiserror::Error;

/// Errors that can occur while constructing core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A tile name failed validation.
    #[error("Invalid tile name: {0}")]
    InvalidName(String),
}

/// A specialized Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
