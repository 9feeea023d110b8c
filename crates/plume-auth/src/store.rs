use std::sync::{Arc, RwLock};

use plume_types::Did;
use tracing::debug;

use crate::capability::Capability;
use crate::token::CapabilityToken;

/// Tokens held by a writer.
///
/// Cloning shares the underlying list, so a repository and its caller can
/// both add tokens.
#[derive(Clone, Debug, Default)]
pub struct TokenStore {
    tokens: Arc<RwLock<Vec<CapabilityToken>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens(tokens: impl IntoIterator<Item = CapabilityToken>) -> Self {
        let store = Self::new();
        for token in tokens {
            store.add(token);
        }
        store
    }

    /// Add a token. Duplicates are ignored.
    pub fn add(&self, token: CapabilityToken) {
        let mut tokens = self.tokens.write().expect("lock poisoned");
        if !tokens.contains(&token) {
            debug!(issuer = %token.issuer(), audience = %token.audience(), "token added");
            tokens.push(token);
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().expect("lock poisoned").is_empty()
    }

    pub fn tokens(&self) -> Vec<CapabilityToken> {
        self.tokens.read().expect("lock poisoned").clone()
    }

    /// First token issued to `audience` whose chain grants `needed` on
    /// behalf of `needed`'s owner and is time-valid at `now`.
    pub fn find_with_capability(
        &self,
        audience: &Did,
        needed: &Capability,
        now: u64,
    ) -> Option<CapabilityToken> {
        self.tokens
            .read()
            .expect("lock poisoned")
            .iter()
            .find(|t| t.audience() == audience && t.has_valid_capability(needed.owner(), needed, now))
            .cloned()
    }
}
