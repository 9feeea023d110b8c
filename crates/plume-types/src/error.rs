use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid cid: {0}")]
    InvalidCid(String),

    #[error("invalid tid: {0}")]
    InvalidTid(String),

    #[error("invalid did: {0}")]
    InvalidDid(String),
}
