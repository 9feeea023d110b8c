//! Signed, content-addressed Plume repositories.
//!
//! A repository is a chain of signed commits. Each commit points at a
//! [`RepoRoot`] holding the owner's namespaces and repository-level
//! relationships. Every block is immutable; a [`Repo`] is only a pointer to
//! its newest commit.
//!
//! # Key Types
//!
//! - [`Repo`] — Commit chain, namespace cache, archive export/import
//! - [`Namespace`] — Per-application posts, interactions, relationships and profile
//! - [`TidCollection`] — Time-ordered entries in tiered [`SortedTable`]s
//! - [`DidCollection`] — DID-keyed entries in a hashed trie
//! - [`Event`] — Semantic change shared by local writes and diff verification
//! - [`RepoConfig`] — Table thresholds, loadable from TOML

pub mod config;
pub mod delta;
pub mod did_collection;
pub mod error;
pub mod namespace;
pub mod repo;
pub mod schema;
pub mod table;
pub mod tid_collection;

pub use config::{RepoConfig, TableThresholds};
pub use delta::{
    capability_for_event, did_collection_diff, id_map_diff, namespace_diff, root_diff,
    tid_collection_diff, Event, MapDiff,
};
pub use did_collection::{DidCollection, DidEntry};
pub use error::{CollectionError, CollectionResult, RepoError, RepoResult, TableError};
pub use namespace::{Namespace, NamespaceUpdate};
pub use repo::{NamespaceFuture, Repo};
pub use schema::{Commit, CollectionKind, NamespaceRoot, RepoRoot};
pub use table::{Entry, SortedTable, TableTier};
pub use tid_collection::TidCollection;
