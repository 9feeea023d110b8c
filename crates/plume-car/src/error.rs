use plume_types::Cid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CarError {
    #[error("invalid archive magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u64),

    #[error("archive must declare exactly one root, found {0}")]
    SingleRootRequired(usize),

    #[error("corrupt archive at offset {offset}: {reason}")]
    Corrupt { offset: usize, reason: String },

    #[error("block bytes do not hash to {0}")]
    HashMismatch(Cid),

    #[error("header error: {0}")]
    Header(String),
}

pub type CarResult<T> = Result<T, CarError>;
