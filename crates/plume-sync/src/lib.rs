//! Verified synchronization for Plume repositories.
//!
//! A receiver never trusts the sender. Each incoming commit is checked for
//! completeness, for a valid signature by the audience of its capability
//! token, and for every semantic change being covered by that token. Events
//! are emitted strictly oldest commit first, and local state advances one
//! verified commit at a time.
//!
//! # Key Types
//!
//! - [`DiffVerifier`] — Verifies commit ranges and full histories
//! - [`EventSink`] — Receives each verified commit's events
//! - [`SyncReport`] — Commits verified, events emitted, resulting head

pub mod error;
pub mod sink;
pub mod types;
pub mod verifier;

pub use error::{SyncError, SyncResult};
pub use sink::EventSink;
pub use types::SyncReport;
pub use verifier::{load_and_verify_diff, DiffVerifier};
