use std::time::{SystemTime, UNIX_EPOCH};

use plume_crypto::{Signature, SigningKey};
use plume_types::Did;
use serde::{Deserialize, Serialize};

use crate::capability::{try_delegate, Capability, Delegation, EscalationKind};
use crate::error::{AuthError, AuthResult};
use crate::resolver::DidResolver;
use crate::store::TokenStore;

/// Thirty days.
pub const DEFAULT_LIFETIME_SECS: u64 = 30 * 24 * 60 * 60;

/// Current UNIX time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The signed portion of a [`CapabilityToken`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub issuer: Did,
    pub audience: Did,
    pub capabilities: Vec<Capability>,
    pub proofs: Vec<CapabilityToken>,
    pub not_before: Option<u64>,
    pub expires_at: u64,
}

/// A signed, delegatable bearer credential.
///
/// The issuer grants `capabilities` to the audience. A capability is either
/// delegated from a proof (a token issued *to* this token's issuer) or, when
/// no proof covers it, originates with the issuer itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub payload: TokenPayload,
    pub signature: Signature,
}

/// A capability resolved through a token's proof chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainedCapability {
    pub capability: Capability,
    /// The DID at the root of the chain that first claimed it.
    pub originator: Did,
    /// Earliest expiry along the chain.
    pub expires_at: u64,
    /// Latest `not_before` along the chain.
    pub not_before: Option<u64>,
}

impl ChainedCapability {
    /// `not_before <= now < expires_at`.
    pub fn is_valid_at(&self, now: u64) -> bool {
        self.not_before.map_or(true, |nbf| nbf <= now) && now < self.expires_at
    }
}

/// One capability claimed by a token, after chain resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainItem {
    Granted(ChainedCapability),
    /// A claim that asked a proof for more than it held.
    Escalated {
        kind: EscalationKind,
        capability: Capability,
    },
}

impl CapabilityToken {
    pub fn issuer(&self) -> &Did {
        &self.payload.issuer
    }

    pub fn audience(&self) -> &Did {
        &self.payload.audience
    }

    pub fn expires_at(&self) -> u64 {
        self.payload.expires_at
    }

    pub fn not_before(&self) -> Option<u64> {
        self.payload.not_before
    }

    /// The bytes the issuer signs.
    pub fn signing_bytes(payload: &TokenPayload) -> AuthResult<Vec<u8>> {
        serde_json::to_vec(payload).map_err(|e| AuthError::Serialization(e.to_string()))
    }

    /// Check the signature of this token and every nested proof, and that
    /// each proof was issued to the token that embeds it.
    pub fn validate(&self, resolver: &dyn DidResolver) -> AuthResult<()> {
        let mut pending = vec![self];
        while let Some(token) = pending.pop() {
            let key = resolver.resolve(token.issuer())?;
            let bytes = Self::signing_bytes(&token.payload)?;
            key.verify(&bytes, &token.signature)
                .map_err(|_| AuthError::InvalidSignature(token.issuer().clone()))?;
            for proof in &token.payload.proofs {
                if proof.audience() != token.issuer() {
                    return Err(AuthError::ProofAudienceMismatch {
                        expected: token.issuer().clone(),
                        actual: proof.audience().clone(),
                    });
                }
                pending.push(proof);
            }
        }
        Ok(())
    }

    /// Resolve every claimed capability through the proof chain.
    ///
    /// Granted entries carry their originator and the tightest time bounds
    /// along the chain. A claim no proof relates to is self-originated by
    /// this token's issuer.
    pub fn capabilities(&self) -> Vec<ChainItem> {
        let proof_chains: Vec<Vec<ChainItem>> = self
            .payload
            .proofs
            .iter()
            .map(CapabilityToken::capabilities)
            .collect();

        let mut out = Vec::new();
        for claimed in &self.payload.capabilities {
            let mut delegated = false;
            for item in proof_chains.iter().flatten() {
                let ChainItem::Granted(parent) = item else {
                    continue;
                };
                match try_delegate(&parent.capability, claimed) {
                    Delegation::Denied => {}
                    Delegation::Escalation { kind, capability } => {
                        delegated = true;
                        out.push(ChainItem::Escalated { kind, capability });
                    }
                    Delegation::Granted(capability) => {
                        delegated = true;
                        out.push(ChainItem::Granted(ChainedCapability {
                            capability,
                            originator: parent.originator.clone(),
                            expires_at: parent.expires_at.min(self.payload.expires_at),
                            not_before: parent.not_before.max(self.payload.not_before),
                        }));
                    }
                }
            }
            if !delegated {
                out.push(ChainItem::Granted(ChainedCapability {
                    capability: claimed.clone(),
                    originator: self.payload.issuer.clone(),
                    expires_at: self.payload.expires_at,
                    not_before: self.payload.not_before,
                }));
            }
        }
        out
    }

    /// `true` if a non-escalated chained capability covers `needed`,
    /// originates with `owner`, and is time-valid at `now`.
    pub fn has_valid_capability(&self, owner: &Did, needed: &Capability, now: u64) -> bool {
        self.capabilities().into_iter().any(|item| match item {
            ChainItem::Granted(chained) => {
                &chained.originator == owner
                    && try_delegate(&chained.capability, needed).is_granted()
                    && chained.is_valid_at(now)
            }
            ChainItem::Escalated { .. } => false,
        })
    }
}

// ---------------------------------------------------------------------------
// TokenBuilder
// ---------------------------------------------------------------------------

/// Builds and signs a [`CapabilityToken`].
///
/// ```ignore
/// let token = TokenBuilder::new()
///     .issued_by(alice_did, &alice_key)
///     .to_audience(device_key.did())
///     .claim_capability(Capability::write(&alice_did, &[]))
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct TokenBuilder {
    issuer: Option<(Did, SigningKey)>,
    audience: Option<Did>,
    capabilities: Vec<Capability>,
    proofs: Vec<CapabilityToken>,
    not_before: Option<u64>,
    expires_at: Option<u64>,
    lifetime_secs: Option<u64>,
    now: Option<u64>,
}

impl TokenBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issuer DID and the key that signs for it.
    pub fn issued_by(mut self, issuer: Did, key: &SigningKey) -> Self {
        self.issuer = Some((issuer, key.clone()));
        self
    }

    /// Issue as the key's own `did:key` identity.
    pub fn issued_by_key(self, key: &SigningKey) -> Self {
        let did = key.did();
        self.issued_by(did, key)
    }

    pub fn to_audience(mut self, audience: Did) -> Self {
        self.audience = Some(audience);
        self
    }

    pub fn with_lifetime_secs(mut self, secs: u64) -> Self {
        self.lifetime_secs = Some(secs);
        self
    }

    pub fn expires_at(mut self, ts: u64) -> Self {
        self.expires_at = Some(ts);
        self
    }

    pub fn not_before(mut self, ts: u64) -> Self {
        self.not_before = Some(ts);
        self
    }

    /// Fix the issue time instead of reading the clock.
    pub fn at(mut self, now: u64) -> Self {
        self.now = Some(now);
        self
    }

    /// Claim a capability rooted at the issuer.
    pub fn claim_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_proof(mut self, proof: CapabilityToken) -> Self {
        if !self.proofs.contains(&proof) {
            self.proofs.push(proof);
        }
        self
    }

    /// Claim a capability, attaching a proof from `store` that grants it to
    /// the issuer.
    pub fn delegate_capability(
        mut self,
        capability: Capability,
        store: &TokenStore,
    ) -> AuthResult<Self> {
        let issuer = self
            .issuer
            .as_ref()
            .map(|(did, _)| did.clone())
            .ok_or_else(|| AuthError::Builder("issuer must be set before delegating".into()))?;
        let now = self.now.unwrap_or_else(unix_now);
        let proof = store
            .find_with_capability(&issuer, &capability, now)
            .ok_or_else(|| AuthError::MissingCapability(capability.to_string()))?;
        self.capabilities.push(capability);
        Ok(self.with_proof(proof))
    }

    pub fn build(self) -> AuthResult<CapabilityToken> {
        let (issuer, key) = self
            .issuer
            .ok_or_else(|| AuthError::Builder("missing issuer".into()))?;
        let audience = self
            .audience
            .ok_or_else(|| AuthError::Builder("missing audience".into()))?;
        let now = self.now.unwrap_or_else(unix_now);
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| now + self.lifetime_secs.unwrap_or(DEFAULT_LIFETIME_SECS));

        let payload = TokenPayload {
            issuer,
            audience,
            capabilities: self.capabilities,
            proofs: self.proofs,
            not_before: self.not_before,
            expires_at,
        };
        let signature = key.sign(&CapabilityToken::signing_bytes(&payload)?);
        Ok(CapabilityToken { payload, signature })
    }
}
