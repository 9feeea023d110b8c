//! `did:key` identities for Ed25519 keys.
//!
//! The method-specific part is the 32-byte public key in lowercase hex.

use plume_types::Did;

use crate::signer::{SignatureError, VerifyingKey};

const DID_KEY_PREFIX: &str = "did:key:";

/// The `did:key` identity of a public key.
pub fn did_for_key(key: &VerifyingKey) -> Did {
    let text = format!("{DID_KEY_PREFIX}{}", hex::encode(key.as_bytes()));
    // hex output never contains '|', so this always parses
    Did::parse(text.clone()).unwrap_or_else(|_| unreachable!("malformed did:key {text}"))
}

/// Recover the public key embedded in a `did:key` identity.
pub fn key_from_did(did: &Did) -> Result<VerifyingKey, SignatureError> {
    let hex_part = did
        .as_str()
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| SignatureError::NotDidKey(did.to_string()))?;
    let bytes = hex::decode(hex_part).map_err(|_| SignatureError::InvalidKey)?;
    let arr: [u8; 32] = bytes.try_into().map_err(|_| SignatureError::InvalidKey)?;
    VerifyingKey::from_bytes(arr)
}
