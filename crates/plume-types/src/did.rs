use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const DID_PREFIX: &str = "did:";

/// Decentralized identifier naming a repository owner or key holder.
///
/// Opaque beyond the `did:` prefix. The `|` character is reserved as the
/// capability resource separator and is rejected.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    pub fn parse(s: impl Into<String>) -> Result<Self, TypeError> {
        let s = s.into();
        if !s.starts_with(DID_PREFIX) || s.len() == DID_PREFIX.len() {
            return Err(TypeError::InvalidDid(format!("missing '{DID_PREFIX}' prefix: {s}")));
        }
        if s.contains('|') {
            return Err(TypeError::InvalidDid(format!("reserved character '|': {s}")));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The DID method, e.g. `key` for `did:key:...`.
    pub fn method(&self) -> &str {
        self.0[DID_PREFIX.len()..].split(':').next().unwrap_or_default()
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.0)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid() {
        let did = Did::parse("did:example:alice").unwrap();
        assert_eq!(did.as_str(), "did:example:alice");
        assert_eq!(did.method(), "example");
    }

    #[test]
    fn parse_rejects_invalid() {
        assert!(Did::parse("alice").is_err());
        assert!(Did::parse("did:").is_err());
        assert!(Did::parse("did:example:a|b").is_err());
    }

    #[test]
    fn serde_validates() {
        let did = Did::parse("did:key:abc").unwrap();
        let json = serde_json::to_string(&did).unwrap();
        assert_eq!(json, "\"did:key:abc\"");
        let back: Did = serde_json::from_str(&json).unwrap();
        assert_eq!(back, did);
        assert!(serde_json::from_str::<Did>("\"nope\"").is_err());
    }
}
