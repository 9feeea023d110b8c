use plume_crypto::SignatureError;
use plume_types::Did;

/// Errors from capability parsing, token construction, and token checks.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    /// A resource string could not be parsed.
    #[error("invalid capability resource: {0}")]
    InvalidResource(String),

    /// A token's signature does not verify against its issuer.
    #[error("invalid token signature from {0}")]
    InvalidSignature(Did),

    /// A proof was issued to someone other than the token's issuer.
    #[error("proof audience {actual} does not match issuer {expected}")]
    ProofAudienceMismatch { expected: Did, actual: Did },

    /// No key is known for a DID.
    #[error("cannot resolve a key for {0}")]
    UnresolvableDid(Did),

    /// No held token covers the needed capability.
    #[error("no valid capability for {0}")]
    MissingCapability(String),

    /// A token is missing a required field.
    #[error("token builder: {0}")]
    Builder(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Result alias for authorization operations.
pub type AuthResult<T> = Result<T, AuthError>;
