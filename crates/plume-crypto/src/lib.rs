//! Cryptographic primitives for Plume.
//!
//! Provides domain-separated BLAKE3 hashing for block identifiers, Ed25519
//! signing/verification, and the `did:key` encoding of public keys.
//!
//! All crypto operations wrap established libraries. No custom cryptography.

pub mod did_key;
pub mod hasher;
pub mod signer;

pub use did_key::{did_for_key, key_from_did};
pub use hasher::{ContentHasher, HasherError};
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey};
