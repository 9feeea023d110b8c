//! Semantic events and the structural diffs that produce them.
//!
//! A local write and the verifier describe the same change with the same
//! [`Event`], and [`capability_for_event`] gives the capability either side
//! requires for it.

use std::collections::BTreeMap;

use plume_auth::Capability;
use plume_store::BlockStore;
use plume_types::{Cid, Did, Tid};
use serde::{Deserialize, Serialize};

use crate::did_collection::DidCollection;
use crate::error::RepoResult;
use crate::schema::{CollectionKind, NamespaceRoot, RepoRoot, PROFILE, RELATIONSHIPS};
use crate::table::SortedTable;

/// One semantic change to a repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NamespaceDeleted {
        namespace: String,
    },
    ObjectAdded {
        namespace: String,
        collection: CollectionKind,
        tid: Tid,
        cid: Cid,
    },
    ObjectEdited {
        namespace: String,
        collection: CollectionKind,
        tid: Tid,
        cid: Cid,
    },
    ObjectDeleted {
        namespace: String,
        collection: CollectionKind,
        tid: Tid,
    },
    /// `namespace` is `None` for repository-level relationships.
    RelationshipAdded {
        namespace: Option<String>,
        did: Did,
        cid: Cid,
    },
    RelationshipEdited {
        namespace: Option<String>,
        did: Did,
        cid: Cid,
    },
    RelationshipDeleted {
        namespace: Option<String>,
        did: Did,
    },
    ProfileUpdated {
        namespace: String,
        cid: Option<Cid>,
    },
}

impl Event {
    /// Content the event points at, if any.
    pub fn content_cid(&self) -> Option<Cid> {
        match self {
            Self::ObjectAdded { cid, .. }
            | Self::ObjectEdited { cid, .. }
            | Self::RelationshipAdded { cid, .. }
            | Self::RelationshipEdited { cid, .. } => Some(*cid),
            Self::ProfileUpdated { cid, .. } => *cid,
            Self::NamespaceDeleted { .. }
            | Self::ObjectDeleted { .. }
            | Self::RelationshipDeleted { .. } => None,
        }
    }
}

/// The `WRITE` capability a writer needs to produce `event` in the
/// repository owned by `did`.
pub fn capability_for_event(did: &Did, event: &Event) -> Capability {
    match event {
        Event::NamespaceDeleted { namespace } => Capability::write(did, &[namespace.as_str()]),
        Event::ObjectAdded {
            namespace,
            collection,
            tid,
            ..
        }
        | Event::ObjectEdited {
            namespace,
            collection,
            tid,
            ..
        }
        | Event::ObjectDeleted {
            namespace,
            collection,
            tid,
        } => {
            let tid = tid.to_string();
            Capability::write(did, &[namespace.as_str(), collection.as_str(), tid.as_str()])
        }
        Event::RelationshipAdded { namespace, .. }
        | Event::RelationshipEdited { namespace, .. }
        | Event::RelationshipDeleted { namespace, .. } => match namespace {
            Some(ns) => Capability::write(did, &[ns.as_str(), RELATIONSHIPS]),
            None => Capability::write(did, &[RELATIONSHIPS]),
        },
        Event::ProfileUpdated { namespace, .. } => Capability::write(did, &[namespace.as_str(), PROFILE]),
    }
}

// ----------------------------------------------------------------------------
// Map diffs
// ----------------------------------------------------------------------------

/// Key-level difference between two maps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapDiff<K, V> {
    pub adds: Vec<(K, V)>,
    /// `(key, old, new)`
    pub updates: Vec<(K, V, V)>,
    pub deletes: Vec<(K, V)>,
}

impl<K, V> MapDiff<K, V> {
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Diff two maps; each list comes out in key order.
pub fn id_map_diff<K: Ord + Clone, V: PartialEq + Clone>(
    prev: &BTreeMap<K, V>,
    curr: &BTreeMap<K, V>,
) -> MapDiff<K, V> {
    let mut diff = MapDiff {
        adds: Vec::new(),
        updates: Vec::new(),
        deletes: Vec::new(),
    };
    for (key, new) in curr {
        match prev.get(key) {
            None => diff.adds.push((key.clone(), new.clone())),
            Some(old) if old != new => diff.updates.push((key.clone(), old.clone(), new.clone())),
            Some(_) => {}
        }
    }
    for (key, old) in prev {
        if !curr.contains_key(key) {
            diff.deletes.push((key.clone(), old.clone()));
        }
    }
    diff
}

// ----------------------------------------------------------------------------
// Structural diffs
// ----------------------------------------------------------------------------

/// Entry-level diff of two TID collection indexes.
///
/// Tables present under the same name with the same CID on both sides are
/// skipped; entries of every other table are compared as maps, so tables
/// rewritten by compaction produce no events.
pub async fn tid_collection_diff(
    store: &BlockStore,
    prev: Option<&Cid>,
    curr: &Cid,
) -> RepoResult<MapDiff<Tid, Cid>> {
    let prev_index: BTreeMap<Tid, Cid> = match prev {
        Some(cid) => store.get(cid).await?,
        None => BTreeMap::new(),
    };
    let curr_index: BTreeMap<Tid, Cid> = store.get(curr).await?;

    let prev_entries = changed_table_entries(store, &prev_index, &curr_index).await?;
    let curr_entries = changed_table_entries(store, &curr_index, &prev_index).await?;
    Ok(id_map_diff(&prev_entries, &curr_entries))
}

/// Entries of the tables in `side` that `other` does not hold identically.
async fn changed_table_entries(
    store: &BlockStore,
    side: &BTreeMap<Tid, Cid>,
    other: &BTreeMap<Tid, Cid>,
) -> RepoResult<BTreeMap<Tid, Cid>> {
    let mut entries = BTreeMap::new();
    for (name, table_cid) in side {
        if other.get(name) == Some(table_cid) {
            continue;
        }
        let table = SortedTable::load(store, table_cid).await?;
        entries.extend(table.entry_map().iter().map(|(t, c)| (*t, *c)));
    }
    Ok(entries)
}

/// Entry-level diff of two DID tries.
pub async fn did_collection_diff(
    store: &BlockStore,
    prev: Option<&Cid>,
    curr: &Cid,
) -> RepoResult<MapDiff<Did, Cid>> {
    let prev_entries = match prev {
        Some(cid) => DidCollection::load(store.clone(), *cid).await?.entry_map().await?,
        None => BTreeMap::new(),
    };
    let curr_entries = DidCollection::load(store.clone(), *curr)
        .await?
        .entry_map()
        .await?;
    Ok(id_map_diff(&prev_entries, &curr_entries))
}

fn relationship_events(namespace: Option<&str>, diff: MapDiff<Did, Cid>) -> Vec<Event> {
    let namespace = namespace.map(str::to_string);
    let mut events = Vec::new();
    for (did, cid) in diff.adds {
        events.push(Event::RelationshipAdded {
            namespace: namespace.clone(),
            did,
            cid,
        });
    }
    for (did, _, cid) in diff.updates {
        events.push(Event::RelationshipEdited {
            namespace: namespace.clone(),
            did,
            cid,
        });
    }
    for (did, _) in diff.deletes {
        events.push(Event::RelationshipDeleted {
            namespace: namespace.clone(),
            did,
        });
    }
    events
}

/// Events describing the change from `prev` to `curr` for one namespace.
///
/// With no `prev`, every entry of `curr` is reported as added.
pub async fn namespace_diff(
    store: &BlockStore,
    name: &str,
    prev: Option<&NamespaceRoot>,
    curr: &NamespaceRoot,
) -> RepoResult<Vec<Event>> {
    let mut events = Vec::new();
    for kind in CollectionKind::ALL {
        let (prev_cid, curr_cid) = match kind {
            CollectionKind::Posts => (prev.map(|p| &p.posts), &curr.posts),
            CollectionKind::Interactions => (prev.map(|p| &p.interactions), &curr.interactions),
        };
        if prev_cid == Some(curr_cid) {
            continue;
        }
        let diff = tid_collection_diff(store, prev_cid, curr_cid).await?;
        for (tid, cid) in diff.adds {
            events.push(Event::ObjectAdded {
                namespace: name.to_string(),
                collection: kind,
                tid,
                cid,
            });
        }
        for (tid, _, cid) in diff.updates {
            events.push(Event::ObjectEdited {
                namespace: name.to_string(),
                collection: kind,
                tid,
                cid,
            });
        }
        for (tid, _) in diff.deletes {
            events.push(Event::ObjectDeleted {
                namespace: name.to_string(),
                collection: kind,
                tid,
            });
        }
    }

    let prev_rel = prev.map(|p| &p.relationships);
    if prev_rel != Some(&curr.relationships) {
        let diff = did_collection_diff(store, prev_rel, &curr.relationships).await?;
        events.extend(relationship_events(Some(name), diff));
    }

    let prev_profile = prev.and_then(|p| p.profile);
    if prev_profile != curr.profile {
        events.push(Event::ProfileUpdated {
            namespace: name.to_string(),
            cid: curr.profile,
        });
    }
    Ok(events)
}

/// Events describing the change between two repository roots.
///
/// Namespaces that appear in `curr` are expanded entry by entry; their
/// blocks must already be in `store`.
pub async fn root_diff(store: &BlockStore, prev: &RepoRoot, curr: &RepoRoot) -> RepoResult<Vec<Event>> {
    let mut events = Vec::new();
    let diff = id_map_diff(&prev.namespaces, &curr.namespaces);

    for (namespace, _) in diff.deletes {
        events.push(Event::NamespaceDeleted { namespace });
    }
    for (namespace, cid) in diff.adds {
        let root: NamespaceRoot = store.get(&cid).await?;
        events.extend(namespace_diff(store, &namespace, None, &root).await?);
    }
    for (namespace, old, new) in diff.updates {
        let old_root: NamespaceRoot = store.get(&old).await?;
        let new_root: NamespaceRoot = store.get(&new).await?;
        events.extend(namespace_diff(store, &namespace, Some(&old_root), &new_root).await?);
    }

    if prev.relationships != curr.relationships {
        let diff = did_collection_diff(store, Some(&prev.relationships), &curr.relationships).await?;
        events.extend(relationship_events(None, diff));
    }
    Ok(events)
}
