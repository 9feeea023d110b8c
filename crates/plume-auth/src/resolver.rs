use std::collections::HashMap;
use std::sync::RwLock;

use plume_crypto::{key_from_did, VerifyingKey};
use plume_types::Did;

use crate::error::{AuthError, AuthResult};

/// Maps a DID to the key that signs for it.
pub trait DidResolver: Send + Sync {
    fn resolve(&self, did: &Did) -> AuthResult<VerifyingKey>;
}

/// Resolves only `did:key` identities, whose key is embedded in the DID.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyDidResolver;

impl DidResolver for KeyDidResolver {
    fn resolve(&self, did: &Did) -> AuthResult<VerifyingKey> {
        key_from_did(did).map_err(|_| AuthError::UnresolvableDid(did.clone()))
    }
}

/// Registered keys for arbitrary DIDs, falling back to `did:key`.
#[derive(Debug, Default)]
pub struct MemoryDidResolver {
    keys: RwLock<HashMap<Did, VerifyingKey>>,
}

impl MemoryDidResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, did: Did, key: VerifyingKey) {
        self.keys.write().expect("lock poisoned").insert(did, key);
    }
}

impl DidResolver for MemoryDidResolver {
    fn resolve(&self, did: &Did) -> AuthResult<VerifyingKey> {
        if let Some(key) = self.keys.read().expect("lock poisoned").get(did) {
            return Ok(key.clone());
        }
        KeyDidResolver.resolve(did)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_crypto::SigningKey;

    #[test]
    fn key_resolver_handles_did_key_only() {
        let key = SigningKey::generate();
        assert_eq!(KeyDidResolver.resolve(&key.did()).unwrap(), key.verifying_key());
        let other = Did::parse("did:example:alice").unwrap();
        assert_eq!(
            KeyDidResolver.resolve(&other),
            Err(AuthError::UnresolvableDid(other.clone()))
        );
    }

    #[test]
    fn memory_resolver_prefers_registered_keys() {
        let alice = Did::parse("did:example:alice").unwrap();
        let key = SigningKey::generate();
        let resolver = MemoryDidResolver::new();
        assert!(resolver.resolve(&alice).is_err());
        resolver.register(alice.clone(), key.verifying_key());
        assert_eq!(resolver.resolve(&alice).unwrap(), key.verifying_key());

        let device = SigningKey::generate();
        assert_eq!(resolver.resolve(&device.did()).unwrap(), device.verifying_key());
    }
}
