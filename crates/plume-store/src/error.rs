use plume_car::CarError;
use plume_types::Cid;

/// Errors from block store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested block was not found.
    #[error("block not found: {0}")]
    NotFound(Cid),

    /// The block decoded, but not into the requested shape.
    #[error("schema mismatch for {cid}: {reason}")]
    SchemaMismatch { cid: Cid, reason: String },

    /// Raw bytes offered under a CID they do not hash to.
    #[error("hash mismatch: bytes do not hash to {0}")]
    HashMismatch(Cid),

    /// Encoding a value failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed archive during import.
    #[error("archive error: {0}")]
    Archive(#[from] CarError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
