//! Per-application collections.
//!
//! Each mutation writes a new [`NamespaceRoot`] and records a
//! [`NamespaceUpdate`]. The owning [`Repo`](crate::Repo) drains those updates
//! and turns each into one signed commit.

use plume_auth::Segment;
use plume_store::{BlockStore, StoreResult};
use plume_types::{Cid, CidSet, Did, Tid};

use crate::config::TableThresholds;
use crate::delta::Event;
use crate::did_collection::DidCollection;
use crate::error::{CollectionError, CollectionResult};
use crate::schema::{CollectionKind, NamespaceRoot, RELATIONSHIPS};
use crate::table::Entry;
use crate::tid_collection::TidCollection;

/// One recorded namespace mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceUpdate {
    pub event: Event,
    /// Blocks first written by this mutation, including `root`.
    pub new_cids: CidSet,
    /// The namespace root after this mutation.
    pub root: Cid,
}

/// A loaded namespace and its pending updates.
#[derive(Clone, Debug)]
pub struct Namespace {
    store: BlockStore,
    name: String,
    cid: Cid,
    posts: TidCollection,
    interactions: TidCollection,
    relationships: DidCollection,
    profile: Option<Cid>,
    /// Blocks written at creation, reported with the first update.
    unreported: CidSet,
    pending: Vec<NamespaceUpdate>,
}

impl Namespace {
    /// Create and persist an empty namespace.
    pub async fn create(
        store: BlockStore,
        name: impl Into<String>,
        thresholds: TableThresholds,
    ) -> CollectionResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        let posts = TidCollection::create(store.clone(), thresholds).await?;
        let interactions = TidCollection::create(store.clone(), thresholds).await?;
        let relationships = DidCollection::create(store.clone()).await?;
        let root = NamespaceRoot {
            posts: posts.cid(),
            interactions: interactions.cid(),
            relationships: relationships.cid(),
            profile: None,
        };
        let cid = store.put(&root).await?;

        let mut unreported = CidSet::new();
        unreported
            .add(cid)
            .add(posts.cid())
            .add(interactions.cid())
            .add(relationships.cid());
        Ok(Self {
            store,
            name,
            cid,
            posts,
            interactions,
            relationships,
            profile: None,
            unreported,
            pending: Vec::new(),
        })
    }

    pub async fn load(
        store: BlockStore,
        name: impl Into<String>,
        cid: Cid,
        thresholds: TableThresholds,
    ) -> CollectionResult<Self> {
        let root: NamespaceRoot = store.get(&cid).await?;
        let posts = TidCollection::load(store.clone(), root.posts, thresholds).await?;
        let interactions = TidCollection::load(store.clone(), root.interactions, thresholds).await?;
        let relationships = DidCollection::load(store.clone(), root.relationships).await?;
        Ok(Self {
            store,
            name: name.into(),
            cid,
            posts,
            interactions,
            relationships,
            profile: root.profile,
            unreported: CidSet::new(),
            pending: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// CID of the current namespace root.
    pub fn cid(&self) -> Cid {
        self.cid
    }

    pub fn root(&self) -> NamespaceRoot {
        NamespaceRoot {
            posts: self.posts.cid(),
            interactions: self.interactions.cid(),
            relationships: self.relationships.cid(),
            profile: self.profile,
        }
    }

    pub fn collection(&self, kind: CollectionKind) -> &TidCollection {
        match kind {
            CollectionKind::Posts => &self.posts,
            CollectionKind::Interactions => &self.interactions,
        }
    }

    fn collection_mut(&mut self, kind: CollectionKind) -> &mut TidCollection {
        match kind {
            CollectionKind::Posts => &mut self.posts,
            CollectionKind::Interactions => &mut self.interactions,
        }
    }

    pub fn relationships(&self) -> &DidCollection {
        &self.relationships
    }

    pub fn profile(&self) -> Option<Cid> {
        self.profile
    }

    /// Updates recorded since the last call, oldest first.
    pub fn take_updates(&mut self) -> Vec<NamespaceUpdate> {
        std::mem::take(&mut self.pending)
    }

    pub fn has_pending_updates(&self) -> bool {
        !self.pending.is_empty()
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    pub async fn add_entry(&mut self, kind: CollectionKind, tid: Tid, cid: Cid) -> CollectionResult<()> {
        let new_cids = self.collection_mut(kind).add_entry(tid, cid).await?;
        let event = Event::ObjectAdded {
            namespace: self.name.clone(),
            collection: kind,
            tid,
            cid,
        };
        self.record(event, new_cids).await
    }

    /// Store `value` and add it under a fresh identifier.
    pub async fn create_entry<T: serde::Serialize + ?Sized>(
        &mut self,
        kind: CollectionKind,
        value: &T,
    ) -> CollectionResult<Tid> {
        let cid = self.store.put(value).await?;
        let tid = Tid::next();
        self.add_entry(kind, tid, cid).await?;
        Ok(tid)
    }

    pub async fn edit_entry(&mut self, kind: CollectionKind, tid: Tid, cid: Cid) -> CollectionResult<()> {
        let new_cids = self.collection_mut(kind).edit_entry(tid, cid).await?;
        let event = Event::ObjectEdited {
            namespace: self.name.clone(),
            collection: kind,
            tid,
            cid,
        };
        self.record(event, new_cids).await
    }

    pub async fn delete_entry(&mut self, kind: CollectionKind, tid: Tid) -> CollectionResult<()> {
        let new_cids = self.collection_mut(kind).delete_entry(&tid).await?;
        let event = Event::ObjectDeleted {
            namespace: self.name.clone(),
            collection: kind,
            tid,
        };
        self.record(event, new_cids).await
    }

    pub async fn add_relationship(&mut self, did: Did, cid: Cid) -> CollectionResult<()> {
        let new_cids = self.relationships.add_entry(did.clone(), cid).await?;
        let event = Event::RelationshipAdded {
            namespace: Some(self.name.clone()),
            did,
            cid,
        };
        self.record(event, new_cids).await
    }

    pub async fn edit_relationship(&mut self, did: Did, cid: Cid) -> CollectionResult<()> {
        let new_cids = self.relationships.edit_entry(&did, cid).await?;
        let event = Event::RelationshipEdited {
            namespace: Some(self.name.clone()),
            did,
            cid,
        };
        self.record(event, new_cids).await
    }

    pub async fn delete_relationship(&mut self, did: Did) -> CollectionResult<()> {
        let new_cids = self.relationships.delete_entry(&did).await?;
        let event = Event::RelationshipDeleted {
            namespace: Some(self.name.clone()),
            did,
        };
        self.record(event, new_cids).await
    }

    /// Point the namespace profile at `cid`, or clear it.
    pub async fn set_profile(&mut self, cid: Option<Cid>) -> CollectionResult<()> {
        self.profile = cid;
        let mut new_cids = CidSet::new();
        new_cids.extend(cid);
        let event = Event::ProfileUpdated {
            namespace: self.name.clone(),
            cid,
        };
        self.record(event, new_cids).await
    }

    /// Write the new root and queue the update. A mutation that leaves the
    /// root unchanged records nothing.
    async fn record(&mut self, event: Event, mut new_cids: CidSet) -> CollectionResult<()> {
        let cid = self.store.put(&self.root()).await?;
        if cid == self.cid {
            return Ok(());
        }
        new_cids.add(cid);
        if !self.unreported.is_empty() {
            new_cids.add_set(&std::mem::take(&mut self.unreported));
        }
        self.cid = cid;
        self.pending.push(NamespaceUpdate {
            event,
            new_cids,
            root: cid,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_entry(&self, kind: CollectionKind, tid: &Tid) -> CollectionResult<Option<Cid>> {
        self.collection(kind).get_entry(tid).await
    }

    /// Up to `count` entries newest first, strictly older than `from`.
    pub async fn get_entries(
        &self,
        kind: CollectionKind,
        count: usize,
        from: Option<Tid>,
    ) -> CollectionResult<Vec<Entry>> {
        self.collection(kind).get_entries(count, from).await
    }

    pub async fn get_relationship(&self, did: &Did) -> CollectionResult<Option<Cid>> {
        self.relationships.get_entry(did).await
    }

    /// Every block reachable from this namespace's root.
    pub async fn cids(&self) -> CollectionResult<CidSet> {
        let mut set = CidSet::new();
        set.add(self.cid);
        set.add_set(&self.posts.cids().await?);
        set.add_set(&self.interactions.cids().await?);
        set.add_set(&self.relationships.cids().await?);
        set.extend(self.profile);
        Ok(set)
    }

    /// Blocks reachable from the namespace root at `cid` that `store` lacks.
    pub async fn missing_cids(store: &BlockStore, cid: &Cid) -> StoreResult<CidSet> {
        let mut missing = CidSet::new();
        if !store.has(cid).await? {
            missing.add(*cid);
            return Ok(missing);
        }
        let root: NamespaceRoot = store.get(cid).await?;
        missing.add_set(&TidCollection::missing_cids(store, &root.posts).await?);
        missing.add_set(&TidCollection::missing_cids(store, &root.interactions).await?);
        missing.add_set(&DidCollection::missing_cids(store, &root.relationships).await?);
        if let Some(profile) = root.profile {
            if !store.has(&profile).await? {
                missing.add(profile);
            }
        }
        Ok(missing)
    }
}

/// Namespace names become capability segments, so they must be literal and
/// must not shadow the repository-level relationships scope.
pub fn validate_name(name: &str) -> CollectionResult<()> {
    if Segment::is_literal(name) && name != RELATIONSHIPS {
        Ok(())
    } else {
        Err(CollectionError::InvalidNamespace(name.to_string()))
    }
}
