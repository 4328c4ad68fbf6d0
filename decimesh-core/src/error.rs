//! Error types for decimesh

use thiserror::Error;

/// Main error type for decimesh operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),

    #[error("numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias for decimesh operations
pub type Result<T> = std::result::Result<T, Error>;
