use plume_auth::{AuthError, Capability};
use plume_store::StoreError;
use plume_types::{Cid, Tid};

use crate::table::TableTier;

/// Errors from operations on a single sorted table.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TableError {
    #[error("duplicate key: {0}")]
    DuplicateKey(Tid),

    #[error("key not found: {0}")]
    NotFound(Tid),

    #[error("cannot merge tables of tier {found:?} into tier {expected:?}")]
    TierMismatch { expected: TableTier, found: TableTier },

    #[error("tables at tier {0:?} do not merge further")]
    MaxTier(TableTier),

    #[error("merge needs at least one table")]
    NothingToMerge,
}

/// Errors from collection operations.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("identifier {tid} is older than the current table floor {floor}")]
    IdentifierTooOld { tid: Tid, floor: Tid },

    #[error("no entry for {0}")]
    NotFound(String),

    #[error("entry already exists for {0}")]
    DuplicateKey(String),

    #[error("invalid namespace name: {0:?}")]
    InvalidNamespace(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for collection operations.
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("no valid capability for {0}")]
    Unauthorized(Capability),

    #[error("repository is read-only: no signing key")]
    ReadOnlyRepository,

    #[error("commit {0} is not in this repository's history")]
    CommitNotFound(Cid),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TableError> for RepoError {
    fn from(e: TableError) -> Self {
        Self::Collection(e.into())
    }
}

/// Result alias for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;
