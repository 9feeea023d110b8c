//! Persisted repository blocks.

use std::collections::BTreeMap;
use std::fmt;

use plume_crypto::Signature;
use plume_types::{Cid, CidSet, Did};
use serde::{Deserialize, Serialize};

/// A signed pointer to a [`RepoRoot`]. The signature covers the raw bytes
/// of `root`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub root: Cid,
    pub sig: Signature,
}

/// One revision of a repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRoot {
    pub did: Did,
    /// `None` only for the genesis root.
    pub prev: Option<Cid>,
    /// Blocks first introduced by this revision.
    pub new_cids: CidSet,
    /// The capability token that authorized this revision.
    pub auth_token: Cid,
    pub namespaces: BTreeMap<String, Cid>,
    pub relationships: Cid,
}

/// Root of one application's collections.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRoot {
    pub posts: Cid,
    pub interactions: Cid,
    pub relationships: Cid,
    pub profile: Option<Cid>,
}

/// The time-ordered collections of a namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Posts,
    Interactions,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 2] = [CollectionKind::Posts, CollectionKind::Interactions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Interactions => "interactions",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Segment names used in capability resources for non-TID collections.
pub(crate) const RELATIONSHIPS: &str = "relationships";
pub(crate) const PROFILE: &str = "profile";
