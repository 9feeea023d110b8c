//! Content-addressed block storage for Plume.
//!
//! Every piece of repository data (commits, roots, namespace roots, sorted
//! tables, trie nodes, capability tokens) is stored as an immutable block
//! identified by the BLAKE3 digest of its encoding.
//!
//! # Layers
//!
//! - [`BlockBackend`] -- raw async get/put/has over encoded bytes
//! - [`MemoryBackend`] -- `HashMap`-based backend for tests and embedding
//! - [`FileBackend`] -- one file per block under a fan-out directory
//! - [`BlockStore`] -- typed facade: encodes values, checks decoded shape,
//!   and exports/imports archives
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once written; putting an existing block is a no-op.
//! 2. Raw ingestion (`put_bytes`) re-hashes before storing.
//! 3. Concurrent reads are always safe.
//! 4. The backend never interprets block contents.

pub mod backend;
pub mod block_store;
pub mod error;
pub mod file;
pub mod memory;

pub use backend::BlockBackend;
pub use block_store::BlockStore;
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
