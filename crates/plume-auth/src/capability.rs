use std::fmt;

use plume_types::Did;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

const SEPARATOR: char = '|';
const WILDCARD: &str = "*";
/// Program, collection, identifier.
const SCOPE_SEGMENTS: usize = 3;

/// How much a capability allows. Ordered: `Maintenance < Write`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapabilityLevel {
    Maintenance = 0,
    Write = 1,
}

/// One scope segment of a resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    /// `*`: everything below this point.
    Any,
    Exact(String),
}

impl Segment {
    /// Whether `s` can stand as an exact segment: non-empty, not the
    /// wildcard, and free of the resource separator.
    pub fn is_literal(s: &str) -> bool {
        !s.is_empty() && s != WILDCARD && !s.contains(SEPARATOR)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(WILDCARD),
            Self::Exact(s) => f.write_str(s),
        }
    }
}

/// A write permission scoped to `(owner, program, collection, identifier)`.
///
/// Textual resource form is `owner|program|collection|identifier`, where
/// trailing segments may be omitted and any scope segment may be `*`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawCapability", into = "RawCapability")]
pub struct Capability {
    owner: Did,
    scope: [Option<Segment>; SCOPE_SEGMENTS],
    level: CapabilityLevel,
}

impl Capability {
    /// Parse a resource string at the given level.
    pub fn parse(resource: &str, level: CapabilityLevel) -> AuthResult<Self> {
        let mut parts = resource.split(SEPARATOR);
        let owner = parts
            .next()
            .and_then(|s| Did::parse(s).ok())
            .ok_or_else(|| AuthError::InvalidResource(resource.to_string()))?;

        let mut scope: [Option<Segment>; SCOPE_SEGMENTS] = Default::default();
        for slot in scope.iter_mut() {
            match parts.next() {
                None => break,
                Some("") => return Err(AuthError::InvalidResource(resource.to_string())),
                Some(WILDCARD) => *slot = Some(Segment::Any),
                Some(s) => *slot = Some(Segment::Exact(s.to_string())),
            }
        }
        if parts.next().is_some() {
            return Err(AuthError::InvalidResource(resource.to_string()));
        }
        Ok(Self {
            owner,
            scope,
            level,
        })
    }

    /// A `Write` capability over `owner|scope...`.
    ///
    /// Unless the scope names a full identifier, the resource ends in `*`:
    /// `write(did, &[])` is `did|*`, `write(did, &["app", "posts"])` is
    /// `did|app|posts|*`.
    pub fn write(owner: &Did, scope: &[&str]) -> Self {
        Self::build(owner, scope, CapabilityLevel::Write)
    }

    /// Full `Maintenance` capability over an owner: `did|*`.
    pub fn maintenance(owner: &Did) -> Self {
        Self::build(owner, &[], CapabilityLevel::Maintenance)
    }

    fn build(owner: &Did, scope: &[&str], level: CapabilityLevel) -> Self {
        let mut segments: [Option<Segment>; SCOPE_SEGMENTS] = Default::default();
        let mut filled = 0;
        for (slot, part) in segments.iter_mut().zip(scope) {
            *slot = Some(if *part == WILDCARD {
                Segment::Any
            } else {
                Segment::Exact((*part).to_string())
            });
            filled += 1;
        }
        if filled < SCOPE_SEGMENTS {
            segments[filled] = Some(Segment::Any);
        }
        Self {
            owner: owner.clone(),
            scope: segments,
            level,
        }
    }

    pub fn owner(&self) -> &Did {
        &self.owner
    }

    pub fn level(&self) -> CapabilityLevel {
        self.level
    }

    pub fn program(&self) -> Option<&Segment> {
        self.scope[0].as_ref()
    }

    pub fn collection(&self) -> Option<&Segment> {
        self.scope[1].as_ref()
    }

    pub fn identifier(&self) -> Option<&Segment> {
        self.scope[2].as_ref()
    }

    /// The `owner|...` resource string.
    pub fn resource(&self) -> String {
        let mut out = self.owner.to_string();
        for segment in self.scope.iter().flatten() {
            out.push(SEPARATOR);
            out.push_str(&segment.to_string());
        }
        out
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.level, self.resource())
    }
}

#[derive(Serialize, Deserialize)]
struct RawCapability {
    resource: String,
    level: CapabilityLevel,
}

impl TryFrom<RawCapability> for Capability {
    type Error = AuthError;

    fn try_from(raw: RawCapability) -> AuthResult<Self> {
        Self::parse(&raw.resource, raw.level)
    }
}

impl From<Capability> for RawCapability {
    fn from(cap: Capability) -> Self {
        Self {
            resource: cap.resource(),
            level: cap.level,
        }
    }
}

// ---------------------------------------------------------------------------
// Delegation
// ---------------------------------------------------------------------------

/// Which part of a capability a child tried to widen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EscalationKind {
    Level,
    Program,
    Collection,
    Identifier,
}

impl EscalationKind {
    fn for_segment(index: usize) -> Self {
        match index {
            0 => Self::Program,
            1 => Self::Collection,
            _ => Self::Identifier,
        }
    }
}

/// Outcome of delegating one capability from another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delegation {
    /// The capabilities do not relate (different owner or disjoint scope).
    Denied,
    /// The child asks for more than the parent holds.
    Escalation {
        kind: EscalationKind,
        capability: Capability,
    },
    /// The parent covers the child.
    Granted(Capability),
}

impl Delegation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    pub fn is_escalation(&self) -> bool {
        matches!(self, Self::Escalation { .. })
    }
}

/// Decide whether `parent` can delegate `child`.
///
/// Level is checked first, then owner, then scope segments left to right: a
/// parent wildcard covers everything below it, a child wildcard against a
/// parent literal is an escalation, and differing literals are unrelated.
pub fn try_delegate(parent: &Capability, child: &Capability) -> Delegation {
    if child.level > parent.level {
        return Delegation::Escalation {
            kind: EscalationKind::Level,
            capability: child.clone(),
        };
    }
    if child.owner != parent.owner {
        return Delegation::Denied;
    }
    for (index, (p, c)) in parent.scope.iter().zip(&child.scope).enumerate() {
        match (p, c) {
            (Some(Segment::Any), _) => return Delegation::Granted(child.clone()),
            (_, Some(Segment::Any)) => {
                return Delegation::Escalation {
                    kind: EscalationKind::for_segment(index),
                    capability: child.clone(),
                }
            }
            (p, c) if p != c => return Delegation::Denied,
            _ => {}
        }
    }
    Delegation::Granted(child.clone())
}

/// `true` if `parent` covers `child` without escalation.
pub fn has_permission(parent: &Capability, child: &Capability) -> bool {
    try_delegate(parent, child).is_granted()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn alice() -> Did {
        Did::parse("did:example:alice").unwrap()
    }

    fn cap(resource: &str) -> Capability {
        Capability::parse(resource, CapabilityLevel::Write).unwrap()
    }

    #[test]
    fn literal_segments() {
        assert!(Segment::is_literal("app"));
        assert!(Segment::is_literal("my-app.v2"));
        assert!(!Segment::is_literal(""));
        assert!(!Segment::is_literal("*"));
        assert!(!Segment::is_literal("a|b"));
    }

    #[test]
    fn constructors_build_resources() {
        let did = alice();
        assert_eq!(Capability::write(&did, &[]).resource(), "did:example:alice|*");
        assert_eq!(
            Capability::write(&did, &["app", "posts"]).resource(),
            "did:example:alice|app|posts|*"
        );
        assert_eq!(
            Capability::write(&did, &["app", "posts", "3jzf-abc-defg-22"]).resource(),
            "did:example:alice|app|posts|3jzf-abc-defg-22"
        );
        assert_eq!(
            Capability::write(&did, &["relationships"]).resource(),
            "did:example:alice|relationships|*"
        );
        let m = Capability::maintenance(&did);
        assert_eq!(m.level(), CapabilityLevel::Maintenance);
        assert_eq!(m.resource(), "did:example:alice|*");
    }

    #[test]
    fn parse_rejects_malformed() {
        let level = CapabilityLevel::Write;
        assert!(Capability::parse("notadid|*", level).is_err());
        assert!(Capability::parse("did:example:alice||posts", level).is_err());
        assert!(Capability::parse("did:example:alice|a|b|c|d", level).is_err());
    }

    #[test]
    fn parse_roundtrips_resource() {
        for resource in [
            "did:example:alice",
            "did:example:alice|*",
            "did:example:alice|app|*",
            "did:example:alice|app|posts|abc",
        ] {
            assert_eq!(cap(resource).resource(), resource);
        }
    }

    #[test]
    fn serde_uses_resource_string() {
        let c = cap("did:example:alice|app|*");
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"resource":"did:example:alice|app|*","level":"WRITE"}"#);
        let back: Capability = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn level_escalation_checked_first() {
        let parent = Capability::maintenance(&alice());
        let child = Capability::write(&alice(), &["app"]);
        assert!(matches!(
            try_delegate(&parent, &child),
            Delegation::Escalation {
                kind: EscalationKind::Level,
                ..
            }
        ));
        // a write capability covers maintenance
        assert!(has_permission(&Capability::write(&alice(), &[]), &parent));
    }

    #[test]
    fn different_owner_is_denied() {
        let bob = Did::parse("did:example:bob").unwrap();
        let parent = Capability::write(&alice(), &[]);
        let child = Capability::write(&bob, &["app"]);
        assert_eq!(try_delegate(&parent, &child), Delegation::Denied);
    }

    #[test]
    fn wildcard_parent_grants_narrower_child() {
        let parent = cap("did:example:alice|app|*");
        let child = cap("did:example:alice|app|posts|abc");
        assert_eq!(try_delegate(&parent, &child), Delegation::Granted(child.clone()));
    }

    #[test]
    fn wildcard_child_escalates_at_its_segment() {
        let parent = cap("did:example:alice|app|posts|*");
        let kinds = [
            ("did:example:alice|*", EscalationKind::Program),
            ("did:example:alice|app|*", EscalationKind::Collection),
        ];
        for (resource, kind) in kinds {
            match try_delegate(&parent, &cap(resource)) {
                Delegation::Escalation { kind: k, .. } => assert_eq!(k, kind),
                other => panic!("expected escalation for {resource}, got {other:?}"),
            }
        }
        let exact = cap("did:example:alice|app|posts|abc");
        assert!(matches!(
            try_delegate(&exact, &parent),
            Delegation::Escalation {
                kind: EscalationKind::Identifier,
                ..
            }
        ));
    }

    #[test]
    fn disjoint_scope_is_denied() {
        let parent = cap("did:example:alice|app|posts|*");
        let child = cap("did:example:alice|app|interactions|abc");
        assert_eq!(try_delegate(&parent, &child), Delegation::Denied);
        let repo_level = cap("did:example:alice|relationships|*");
        assert_eq!(
            try_delegate(&cap("did:example:alice|app|*"), &repo_level),
            Delegation::Denied
        );
    }

    #[test]
    fn identical_capabilities_delegate() {
        let c = cap("did:example:alice|app|posts|abc");
        assert!(has_permission(&c, &c));
    }

    fn arb_capability() -> impl Strategy<Value = Capability> {
        let segment = prop_oneof![Just("*"), Just("a"), Just("b")];
        (
            prop::collection::vec(segment, 0..=3),
            prop_oneof![Just(CapabilityLevel::Maintenance), Just(CapabilityLevel::Write)],
        )
            .prop_map(|(parts, level)| {
                let mut resource = "did:example:alice".to_string();
                for p in parts {
                    resource.push('|');
                    resource.push_str(p);
                }
                Capability::parse(&resource, level).unwrap()
            })
    }

    proptest! {
        #[test]
        fn delegation_is_transitive(a in arb_capability(), b in arb_capability(), c in arb_capability()) {
            if has_permission(&a, &b) && has_permission(&b, &c) {
                prop_assert!(has_permission(&a, &c));
            }
        }

        #[test]
        fn never_grants_higher_level(a in arb_capability(), b in arb_capability()) {
            if b.level() > a.level() {
                prop_assert!(!has_permission(&a, &b));
            }
        }

        #[test]
        fn never_grants_widened_segment(a in arb_capability(), b in arb_capability()) {
            let widened = a.scope.iter().zip(&b.scope).position(|(p, c)| {
                p != c || *p == Some(Segment::Any)
            });
            if let Some(i) = widened {
                if b.scope[i] == Some(Segment::Any) && a.scope[i] != Some(Segment::Any) {
                    prop_assert!(!has_permission(&a, &b));
                }
            }
        }

        #[test]
        fn delegation_is_reflexive(a in arb_capability()) {
            prop_assert!(has_permission(&a, &a));
        }
    }
}
