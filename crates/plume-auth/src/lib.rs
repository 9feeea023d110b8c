//! Capability-based write authorization for Plume.
//!
//! Every mutation of a repository, and every mutation found while verifying
//! an incoming diff, must be covered by a capability that the repository
//! owner delegated, directly or through a chain of signed tokens.
//!
//! # Key Types
//!
//! - [`Capability`] -- a scope (`owner|program|collection|identifier`) plus a level
//! - [`Delegation`] -- outcome of [`try_delegate`]: denied, escalated, or granted
//! - [`CapabilityToken`] -- signed, delegatable bearer credential
//! - [`TokenBuilder`] -- constructs and signs tokens
//! - [`TokenStore`] -- tokens held by a writer, searchable by capability
//! - [`DidResolver`] -- maps a DID to the key that signs for it

pub mod capability;
pub mod error;
pub mod resolver;
pub mod store;
pub mod token;

pub use capability::{
    has_permission, try_delegate, Capability, CapabilityLevel, Delegation, EscalationKind,
    Segment,
};
pub use error::{AuthError, AuthResult};
pub use resolver::{DidResolver, KeyDidResolver, MemoryDidResolver};
pub use store::TokenStore;
pub use token::{
    unix_now, ChainItem, ChainedCapability, CapabilityToken, TokenBuilder, TokenPayload,
    DEFAULT_LIFETIME_SECS,
};
