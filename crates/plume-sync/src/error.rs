use plume_auth::{AuthError, Capability};
use plume_repo::{CollectionError, RepoError};
use plume_store::StoreError;
use plume_types::{Cid, CidSet, Did};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("history does not connect to local commit {0}")]
    MissingHistory(Cid),

    #[error("incomplete sync: {} block(s) missing", .0.len())]
    IncompleteSync(CidSet),

    #[error("invalid signature on commit {0}")]
    InvalidSignature(Cid),

    #[error("commit {commit} is not authorized for {capability}")]
    UnauthorizedChange { commit: Cid, capability: Capability },

    #[error("commit {commit} changes the repository DID from {expected} to {found}")]
    DidChanged { commit: Cid, expected: Did, found: Did },

    #[error("genesis commit {0} is not empty")]
    NonEmptyGenesis(Cid),

    #[error("event sink rejected commit {commit}: {reason}")]
    Sink { commit: Cid, reason: String },

    #[error("repository error: {0}")]
    Repo(#[from] RepoError),

    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("token error: {0}")]
    Auth(#[from] AuthError),
}

pub type SyncResult<T> = Result<T, SyncError>;
