use plume_types::Cid;

/// Domain-separated BLAKE3 hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so block identifiers and trie key digests can never collide
/// even for identical input bytes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for stored blocks; its output is the block's [`Cid`].
    pub const BLOCK: Self = Self {
        domain: "plume-block-v1",
    };
    /// Hasher for keys placed in hashed tries.
    pub const TRIE_KEY: Self = Self {
        domain: "plume-trie-key-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Domain-separated digest of raw bytes.
    pub fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Hash raw bytes into a content identifier.
    pub fn hash(&self, data: &[u8]) -> Cid {
        Cid::from_hash(self.digest(data))
    }

    /// Hash a serializable value as JSON.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> Result<Cid, HasherError> {
        let data =
            serde_json::to_vec(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Verify that data produces the expected identifier.
    pub fn verify(&self, data: &[u8], expected: &Cid) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
