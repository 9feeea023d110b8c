//! Block archives for Plume.
//!
//! An archive bundles content-addressed blocks for transport between
//! repositories. It declares exactly one root and lists each block with its
//! identifier.
//!
//! # Layout
//!
//! - `PLMC` magic
//! - varint length + JSON header `{"version": 1, "roots": [cid]}`
//! - repeated frames: varint length + 32-byte digest + block bytes
//!
//! The reader re-hashes every block, so an archive cannot smuggle a block
//! under a foreign identifier.

pub mod error;
pub mod reader;
pub mod varint;
pub mod writer;

pub use error::{CarError, CarResult};
pub use reader::CarReader;
pub use writer::CarWriter;

pub(crate) const MAGIC: &[u8; 4] = b"PLMC";
pub(crate) const VERSION: u64 = 1;

/// Archive header, encoded as JSON after the magic.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) struct CarHeader {
    pub version: u64,
    pub roots: Vec<plume_types::Cid>,
}
