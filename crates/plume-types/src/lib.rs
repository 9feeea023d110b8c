//! Foundation types for Plume repositories.
//!
//! Every other Plume crate depends on `plume-types`.
//!
//! # Key Types
//!
//! - [`Cid`] — Content identifier (BLAKE3 digest of an encoded block)
//! - [`Tid`] — Sortable time identifier used to key time-ordered collections
//! - [`Did`] — Decentralized identifier naming a repository owner or key holder
//! - [`CidSet`] — Insertion-ordered, deduplicating set of CIDs

pub mod cid;
pub mod cid_set;
pub mod did;
pub mod error;
pub mod tid;

pub use cid::Cid;
pub use cid_set::CidSet;
pub use did::Did;
pub use error::TypeError;
pub use tid::{Tid, TidClock};
