use thiserror::Error;

/// Errors raised while parsing shared primitives
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Missing 0x prefix: {0}")]
    MissingPrefix(String),

    #[error("Invalid address checksum: {0}")]
    InvalidChecksum(String),
}

impl From<hex::FromHexError> for CommonError {
    fn from(err: hex::FromHexError) -> Self {
        CommonError::InvalidHex(err.to_string())
    }
}

pub type CommonResult<T> = Result<T, CommonError>;
