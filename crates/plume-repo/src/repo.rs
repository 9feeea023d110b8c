//! The signed commit chain.
//!
//! A [`Repo`] is a mutable pointer to its latest commit. Every mutation
//! produces a new [`RepoRoot`] whose `prev` is the old commit, signed by the
//! writer's key and authorized by a capability token from its
//! [`TokenStore`].

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;

use plume_auth::{unix_now, Capability, TokenStore};
use plume_car::CarWriter;
use plume_crypto::SigningKey;
use plume_store::{BlockStore, StoreError};
use plume_types::{Cid, CidSet, Did};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::RepoConfig;
use crate::delta::{capability_for_event, Event};
use crate::did_collection::DidCollection;
use crate::error::{RepoError, RepoResult};
use crate::namespace::{validate_name, Namespace};
use crate::schema::{Commit, RepoRoot};

/// Future returned by closures passed to [`Repo::run_on_namespace`].
pub type NamespaceFuture<'a, T> = Pin<Box<dyn Future<Output = RepoResult<T>> + Send + 'a>>;

#[derive(Clone, Debug)]
struct Signer {
    key: SigningKey,
    tokens: TokenStore,
}

/// A repository owned by one DID.
///
/// Single writer: callers serialize mutations on one instance. A failed
/// mutation drops the namespace it touched from the cache, so the next call
/// reloads it from the last commit.
#[derive(Debug)]
pub struct Repo {
    store: BlockStore,
    config: RepoConfig,
    cid: Cid,
    root: RepoRoot,
    relationships: DidCollection,
    namespaces: HashMap<String, Namespace>,
    signer: Option<Signer>,
    events: Vec<Event>,
}

impl Repo {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a repository for `did` with an empty genesis commit.
    ///
    /// `key` must hold a `MAINTENANCE` capability over `did` in `tokens`.
    pub async fn create(
        store: BlockStore,
        did: Did,
        key: &SigningKey,
        tokens: TokenStore,
        config: RepoConfig,
    ) -> RepoResult<Self> {
        let needed = Capability::maintenance(&did);
        let token = tokens
            .find_with_capability(&key.did(), &needed, unix_now())
            .ok_or(RepoError::Unauthorized(needed))?;

        let relationships = DidCollection::create(store.clone()).await?;
        let token_cid = store.put(&token).await?;
        let mut new_cids = relationships.cids().await?;
        new_cids.add(token_cid);

        let root = RepoRoot {
            did,
            prev: None,
            new_cids,
            auth_token: token_cid,
            namespaces: BTreeMap::new(),
            relationships: relationships.cid(),
        };
        let cid = write_commit(&store, key, &root).await?;
        info!(did = %root.did, commit = %cid, "created repository");

        Ok(Self {
            store,
            config,
            cid,
            root,
            relationships,
            namespaces: HashMap::new(),
            signer: Some(Signer {
                key: key.clone(),
                tokens,
            }),
            events: Vec::new(),
        })
    }

    /// Open the repository at `commit` read-only. History is not verified.
    pub async fn load(store: BlockStore, commit: Cid, config: RepoConfig) -> RepoResult<Self> {
        let (root, relationships) = load_state(&store, &commit).await?;
        Ok(Self {
            store,
            config,
            cid: commit,
            root,
            relationships,
            namespaces: HashMap::new(),
            signer: None,
            events: Vec::new(),
        })
    }

    /// Ingest an archive and open its root read-only.
    pub async fn from_car_file(
        archive: &[u8],
        store: BlockStore,
        config: RepoConfig,
    ) -> RepoResult<Self> {
        let root = store.load_car(archive).await?;
        Self::load(store, root, config).await
    }

    /// Attach a signing key and the tokens that authorize it.
    pub fn with_signer(mut self, key: SigningKey, tokens: TokenStore) -> Self {
        self.signer = Some(Signer { key, tokens });
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// CID of the current commit.
    pub fn cid(&self) -> Cid {
        self.cid
    }

    pub fn did(&self) -> &Did {
        &self.root.did
    }

    pub fn get_root(&self) -> &RepoRoot {
        &self.root
    }

    pub async fn get_commit(&self) -> RepoResult<Commit> {
        Ok(self.store.get(&self.cid).await?)
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn is_read_only(&self) -> bool {
        self.signer.is_none()
    }

    /// Events of the commits made through this instance since the last call.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Move to another commit, trusting its contents.
    pub async fn load_root(&mut self, commit: Cid) -> RepoResult<()> {
        let (root, relationships) = load_state(&self.store, &commit).await?;
        self.cid = commit;
        self.root = root;
        self.relationships = relationships;
        self.namespaces.clear();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    pub async fn put<T: Serialize + ?Sized>(&self, value: &T) -> RepoResult<Cid> {
        Ok(self.store.put(value).await?)
    }

    pub async fn get<T: DeserializeOwned>(&self, cid: &Cid) -> RepoResult<T> {
        Ok(self.store.get(cid).await?)
    }

    // ------------------------------------------------------------------
    // Namespaces
    // ------------------------------------------------------------------

    pub fn namespace_names(&self) -> Vec<String> {
        self.root.namespaces.keys().cloned().collect()
    }

    /// Load a namespace as of the current commit.
    pub async fn namespace(&self, name: &str) -> RepoResult<Namespace> {
        let cid = self
            .root
            .namespaces
            .get(name)
            .ok_or_else(|| RepoError::NamespaceNotFound(name.to_string()))?;
        Ok(Namespace::load(self.store.clone(), name, *cid, self.config.tables).await?)
    }

    /// Run `f` against a namespace, creating it if absent, then commit each
    /// update it recorded.
    ///
    /// ```ignore
    /// repo.run_on_namespace("app", |ns| Box::pin(async move {
    ///     ns.add_entry(CollectionKind::Posts, tid, cid).await?;
    ///     Ok(())
    /// })).await?;
    /// ```
    pub async fn run_on_namespace<T, F>(&mut self, name: &str, f: F) -> RepoResult<T>
    where
        F: for<'a> FnOnce(&'a mut Namespace) -> NamespaceFuture<'a, T>,
    {
        if self.signer.is_none() {
            return Err(RepoError::ReadOnlyRepository);
        }
        validate_name(name)?;
        let mut ns = match self.namespaces.remove(name) {
            Some(ns) => ns,
            None => match self.root.namespaces.get(name) {
                Some(cid) => {
                    Namespace::load(self.store.clone(), name, *cid, self.config.tables).await?
                }
                None => Namespace::create(self.store.clone(), name, self.config.tables).await?,
            },
        };

        let out = f(&mut ns).await?;
        for update in ns.take_updates() {
            let mut namespaces = self.root.namespaces.clone();
            namespaces.insert(name.to_string(), update.root);
            let relationships = self.root.relationships;
            self.commit(update.event, update.new_cids, namespaces, relationships)
                .await?;
        }
        if self.root.namespaces.contains_key(name) {
            self.namespaces.insert(name.to_string(), ns);
        }
        Ok(out)
    }

    pub async fn delete_namespace(&mut self, name: &str) -> RepoResult<Cid> {
        self.ensure_writable()?;
        let mut namespaces = self.root.namespaces.clone();
        if namespaces.remove(name).is_none() {
            return Err(RepoError::NamespaceNotFound(name.to_string()));
        }
        let event = Event::NamespaceDeleted {
            namespace: name.to_string(),
        };
        let relationships = self.root.relationships;
        let cid = self
            .commit(event, CidSet::new(), namespaces, relationships)
            .await?;
        self.namespaces.remove(name);
        Ok(cid)
    }

    // ------------------------------------------------------------------
    // Repository-level relationships
    // ------------------------------------------------------------------

    pub fn relationships(&self) -> &DidCollection {
        &self.relationships
    }

    pub async fn get_relationship(&self, did: &Did) -> RepoResult<Option<Cid>> {
        Ok(self.relationships.get_entry(did).await?)
    }

    pub async fn add_relationship(&mut self, did: Did, cid: Cid) -> RepoResult<Cid> {
        self.ensure_writable()?;
        let mut relationships = self.relationships.clone();
        let new_cids = relationships.add_entry(did.clone(), cid).await?;
        let event = Event::RelationshipAdded {
            namespace: None,
            did,
            cid,
        };
        self.commit_relationships(relationships, new_cids, event).await
    }

    pub async fn edit_relationship(&mut self, did: Did, cid: Cid) -> RepoResult<Cid> {
        self.ensure_writable()?;
        let mut relationships = self.relationships.clone();
        let new_cids = relationships.edit_entry(&did, cid).await?;
        let event = Event::RelationshipEdited {
            namespace: None,
            did,
            cid,
        };
        self.commit_relationships(relationships, new_cids, event).await
    }

    pub async fn delete_relationship(&mut self, did: Did) -> RepoResult<Cid> {
        self.ensure_writable()?;
        let mut relationships = self.relationships.clone();
        let new_cids = relationships.delete_entry(&did).await?;
        let event = Event::RelationshipDeleted {
            namespace: None,
            did,
        };
        self.commit_relationships(relationships, new_cids, event).await
    }

    async fn commit_relationships(
        &mut self,
        relationships: DidCollection,
        new_cids: CidSet,
        event: Event,
    ) -> RepoResult<Cid> {
        if relationships.cid() == self.root.relationships {
            return Ok(self.cid);
        }
        let namespaces = self.root.namespaces.clone();
        let cid = self
            .commit(event, new_cids, namespaces, relationships.cid())
            .await?;
        self.relationships = relationships;
        Ok(cid)
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    fn ensure_writable(&self) -> RepoResult<&Signer> {
        self.signer.as_ref().ok_or(RepoError::ReadOnlyRepository)
    }

    /// Authorize `event`, then write and sign a root on top of the current
    /// commit. State advances only once the commit block is stored.
    async fn commit(
        &mut self,
        event: Event,
        mut new_cids: CidSet,
        namespaces: BTreeMap<String, Cid>,
        relationships: Cid,
    ) -> RepoResult<Cid> {
        let signer = self.ensure_writable()?;
        let needed = capability_for_event(&self.root.did, &event);
        let token = signer
            .tokens
            .find_with_capability(&signer.key.did(), &needed, unix_now())
            .ok_or(RepoError::Unauthorized(needed))?;
        let token_cid = self.store.put(&token).await?;
        new_cids.add(token_cid);

        let root = RepoRoot {
            did: self.root.did.clone(),
            prev: Some(self.cid),
            new_cids,
            auth_token: token_cid,
            namespaces,
            relationships,
        };
        let cid = write_commit(&self.store, &signer.key, &root).await?;
        info!(
            did = %root.did,
            commit = %cid,
            blocks = root.new_cids.len(),
            "committed"
        );

        self.cid = cid;
        self.root = root;
        self.events.push(event);
        Ok(cid)
    }

    // ------------------------------------------------------------------
    // Archives
    // ------------------------------------------------------------------

    /// Every commit back to genesis, with the blocks each introduced.
    pub async fn get_full_history(&self) -> RepoResult<Vec<u8>> {
        self.get_diff_car(None).await
    }

    /// Commits newer than `since` with the blocks each introduced.
    ///
    /// Fails with [`RepoError::CommitNotFound`] if `since` is not an
    /// ancestor of the current commit.
    pub async fn get_diff_car(&self, since: Option<Cid>) -> RepoResult<Vec<u8>> {
        let mut writer = CarWriter::new(self.cid);
        let mut cursor = Some(self.cid);
        let mut commits = 0usize;
        while let Some(commit_cid) = cursor {
            if Some(commit_cid) == since {
                break;
            }
            let commit: Commit = self.store.get(&commit_cid).await?;
            let root: RepoRoot = self.store.get(&commit.root).await?;
            self.store.add_to_car(&mut writer, &commit_cid).await?;
            self.store.add_to_car(&mut writer, &commit.root).await?;
            for cid in root.new_cids.iter() {
                self.store.add_to_car(&mut writer, cid).await?;
            }
            commits += 1;
            cursor = root.prev;
            if cursor.is_none() {
                if let Some(since) = since {
                    return Err(RepoError::CommitNotFound(since));
                }
            }
        }
        debug!(head = %self.cid, commits, blocks = writer.len(), "exported diff");
        Ok(writer.finish().map_err(StoreError::from)?)
    }

    /// The current commit and every block reachable from it, without
    /// earlier commits.
    pub async fn get_car_no_history(&self) -> RepoResult<Vec<u8>> {
        let commit: Commit = self.store.get(&self.cid).await?;
        let mut cids = CidSet::new();
        cids.add(self.cid).add(commit.root).add(self.root.auth_token);
        cids.add_set(&self.relationships.cids().await?);
        for name in self.root.namespaces.keys() {
            cids.add_set(&self.namespace(name).await?.cids().await?);
        }

        let mut writer = CarWriter::new(self.cid);
        for cid in cids.iter() {
            self.store.add_to_car(&mut writer, cid).await?;
        }
        debug!(head = %self.cid, blocks = writer.len(), "exported snapshot");
        Ok(writer.finish().map_err(StoreError::from)?)
    }

    /// Ingest an archive's blocks and return its root. The repository does
    /// not move.
    pub async fn load_car(&self, archive: &[u8]) -> RepoResult<Cid> {
        Ok(self.store.load_car(archive).await?)
    }

    /// Ingest an archive and move to its root without verifying it.
    pub async fn load_car_root(&mut self, archive: &[u8]) -> RepoResult<Cid> {
        let root = self.load_car(archive).await?;
        self.load_root(root).await?;
        Ok(root)
    }

    /// Blocks reachable from the current commit that the store lacks.
    pub async fn missing_cids(&self) -> RepoResult<CidSet> {
        let mut missing = CidSet::new();
        if !self.store.has(&self.root.auth_token).await? {
            missing.add(self.root.auth_token);
        }
        missing.add_set(&DidCollection::missing_cids(&self.store, &self.root.relationships).await?);
        for cid in self.root.namespaces.values() {
            missing.add_set(&Namespace::missing_cids(&self.store, cid).await?);
        }
        Ok(missing)
    }
}

async fn load_state(store: &BlockStore, commit: &Cid) -> RepoResult<(RepoRoot, DidCollection)> {
    let commit: Commit = store.get(commit).await?;
    let root: RepoRoot = store.get(&commit.root).await?;
    let relationships = DidCollection::load(store.clone(), root.relationships).await?;
    Ok((root, relationships))
}

async fn write_commit(store: &BlockStore, key: &SigningKey, root: &RepoRoot) -> RepoResult<Cid> {
    let root_cid = store.put(root).await?;
    let commit = Commit {
        root: root_cid,
        sig: key.sign(root_cid.as_bytes()),
    };
    Ok(store.put(&commit).await?)
}
