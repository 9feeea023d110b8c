use std::sync::Arc;

use plume_auth::{unix_now, Capability, CapabilityToken, DidResolver};
use plume_repo::{
    capability_for_event, id_map_diff, root_diff, Commit, DidCollection, Event, Namespace, Repo,
    RepoConfig, RepoRoot,
};
use plume_repo::namespace::validate_name;
use plume_store::BlockStore;
use plume_types::{Cid, CidSet};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::sink::EventSink;
use crate::types::SyncReport;

/// Verifies incoming commits against their capability tokens.
///
/// Token time bounds are checked against the verifier's clock, not the
/// commit's: a token that has expired since the commit was made no longer
/// authorizes it.
#[derive(Clone)]
pub struct DiffVerifier {
    resolver: Arc<dyn DidResolver>,
    now: Option<u64>,
}

impl std::fmt::Debug for DiffVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffVerifier")
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl DiffVerifier {
    pub fn new(resolver: Arc<dyn DidResolver>) -> Self {
        Self {
            resolver,
            now: None,
        }
    }

    /// Check token time bounds at `now` instead of the system clock.
    pub fn with_now(mut self, now: u64) -> Self {
        self.now = Some(now);
        self
    }

    fn now(&self) -> u64 {
        self.now.unwrap_or_else(unix_now)
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Ingest a diff archive into `repo`'s store and verify it.
    pub async fn load_and_verify_diff<S: EventSink + ?Sized>(
        &self,
        repo: &mut Repo,
        archive: &[u8],
        sink: &mut S,
    ) -> SyncResult<SyncReport> {
        let head = repo.store().load_car(archive).await?;
        self.verify_diff(repo, head, sink).await
    }

    /// Ingest a full-history archive and verify it from genesis.
    ///
    /// The genesis commit must be signed by the audience of a token holding
    /// `MAINTENANCE` over the repository DID, and must carry no namespaces
    /// or relationships. Every entry therefore arrives through a later
    /// commit whose changes are checked against `WRITE` capabilities.
    pub async fn load_and_verify_history<S: EventSink + ?Sized>(
        &self,
        store: BlockStore,
        archive: &[u8],
        config: RepoConfig,
        sink: &mut S,
    ) -> SyncResult<(Repo, SyncReport)> {
        let head = store.load_car(archive).await?;

        let mut cursor = head;
        let (genesis, root) = loop {
            let (commit, root) = load_commit(&store, &cursor).await?;
            match root.prev {
                Some(prev) => cursor = prev,
                None => break (commit, root),
            }
        };
        self.check_complete(&store, &root).await?;
        let token = self.check_signature(&store, cursor, &genesis, &root).await?;
        let needed = Capability::maintenance(&root.did);
        if !token.has_valid_capability(&root.did, &needed, self.now()) {
            warn!(commit = %cursor, capability = %needed, "genesis not authorized");
            return Err(SyncError::UnauthorizedChange {
                commit: cursor,
                capability: needed,
            });
        }
        let relationships = DidCollection::load(store.clone(), root.relationships).await?;
        if !root.namespaces.is_empty() || !relationships.get_entries().await?.is_empty() {
            warn!(commit = %cursor, namespaces = root.namespaces.len(), "genesis carries content");
            return Err(SyncError::NonEmptyGenesis(cursor));
        }

        let mut repo = Repo::load(store, cursor, config).await?;
        let report = self.verify_diff(&mut repo, head, sink).await?;
        Ok((repo, report))
    }

    /// Verify every commit from `repo`'s current commit up to `to`.
    ///
    /// Commits are processed oldest first. Each one is fully checked before
    /// its events reach `sink`, and `repo` advances to it only after the sink
    /// accepts them. On error, `repo` stays at the last accepted commit.
    pub async fn verify_diff<S: EventSink + ?Sized>(
        &self,
        repo: &mut Repo,
        to: Cid,
        sink: &mut S,
    ) -> SyncResult<SyncReport> {
        let from = repo.cid();
        let store = repo.store().clone();

        // walk back to `from`, newest first
        let mut chain = Vec::new();
        let mut cursor = to;
        while cursor != from {
            let (commit, root) = load_commit(&store, &cursor).await?;
            let prev = root.prev.ok_or(SyncError::MissingHistory(from))?;
            chain.push((cursor, commit, root));
            cursor = prev;
        }

        let mut report = SyncReport::starting_at(from);
        for (cid, commit, root) in chain.into_iter().rev() {
            let events = self.verify_commit(repo, &store, cid, &commit, &root).await?;
            sink.emit(cid, &events).await?;
            repo.load_root(cid).await?;

            report.commits_verified += 1;
            report.events_emitted += events.len() as u64;
            report.head = cid;
            debug!(commit = %cid, events = events.len(), "verified commit");
        }
        info!(
            did = %repo.did(),
            head = %report.head,
            commits = report.commits_verified,
            "diff verified"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Per-commit checks
    // ------------------------------------------------------------------

    async fn verify_commit(
        &self,
        repo: &Repo,
        store: &BlockStore,
        cid: Cid,
        commit: &Commit,
        root: &RepoRoot,
    ) -> SyncResult<Vec<Event>> {
        let prev = repo.get_root();
        if root.did != prev.did {
            warn!(commit = %cid, "repository DID changed");
            return Err(SyncError::DidChanged {
                commit: cid,
                expected: prev.did.clone(),
                found: root.did.clone(),
            });
        }

        self.check_complete(store, root).await?;
        let token = self.check_signature(store, cid, commit, root).await?;

        let mut missing = CidSet::new();
        for (name, ns_cid) in id_map_diff(&prev.namespaces, &root.namespaces).adds {
            validate_name(&name)?;
            missing.add_set(&Namespace::missing_cids(store, &ns_cid).await?);
        }
        if !missing.is_empty() {
            warn!(commit = %cid, missing = missing.len(), "namespace subtree incomplete");
            return Err(SyncError::IncompleteSync(missing));
        }

        let events = root_diff(store, prev, root).await?;
        for content in events.iter().filter_map(Event::content_cid) {
            if !store.has(&content).await? {
                missing.add(content);
            }
        }
        if !missing.is_empty() {
            warn!(commit = %cid, missing = missing.len(), "event content missing");
            return Err(SyncError::IncompleteSync(missing));
        }

        let now = self.now();
        for event in &events {
            let needed = capability_for_event(&root.did, event);
            if !token.has_valid_capability(&root.did, &needed, now) {
                warn!(commit = %cid, capability = %needed, "unauthorized change");
                return Err(SyncError::UnauthorizedChange {
                    commit: cid,
                    capability: needed,
                });
            }
        }
        Ok(events)
    }

    /// Every block the commit claims to introduce must be present.
    async fn check_complete(&self, store: &BlockStore, root: &RepoRoot) -> SyncResult<()> {
        let mut missing = CidSet::new();
        for cid in root.new_cids.iter().chain(std::iter::once(&root.auth_token)) {
            if !store.has(cid).await? {
                missing.add(*cid);
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SyncError::IncompleteSync(missing))
        }
    }

    /// Validate the root's token and check the commit was signed by the
    /// token's audience.
    async fn check_signature(
        &self,
        store: &BlockStore,
        cid: Cid,
        commit: &Commit,
        root: &RepoRoot,
    ) -> SyncResult<CapabilityToken> {
        let token: CapabilityToken = store.get(&root.auth_token).await?;
        token.validate(self.resolver.as_ref())?;
        let key = self.resolver.resolve(token.audience())?;
        if key.verify(commit.root.as_bytes(), &commit.sig).is_err() {
            warn!(commit = %cid, signer = %token.audience(), "bad commit signature");
            return Err(SyncError::InvalidSignature(cid));
        }
        Ok(token)
    }
}

/// A commit or root absent from the store means the archive was cut short.
async fn load_commit(store: &BlockStore, cid: &Cid) -> SyncResult<(Commit, RepoRoot)> {
    let commit: Commit = get_present(store, cid).await?;
    let root: RepoRoot = get_present(store, &commit.root).await?;
    Ok((commit, root))
}

async fn get_present<T: serde::de::DeserializeOwned>(store: &BlockStore, cid: &Cid) -> SyncResult<T> {
    if !store.has(cid).await? {
        let mut missing = CidSet::new();
        missing.add(*cid);
        return Err(SyncError::IncompleteSync(missing));
    }
    Ok(store.get(cid).await?)
}

/// Ingest `archive` into `repo`'s store and verify it with a fresh
/// [`DiffVerifier`] over `resolver`.
pub async fn load_and_verify_diff<S: EventSink + ?Sized>(
    repo: &mut Repo,
    archive: &[u8],
    resolver: Arc<dyn DidResolver>,
    sink: &mut S,
) -> SyncResult<SyncReport> {
    DiffVerifier::new(resolver)
        .load_and_verify_diff(repo, archive, sink)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_auth::{MemoryDidResolver, TokenBuilder, TokenStore, DEFAULT_LIFETIME_SECS};
    use plume_crypto::SigningKey;
    use plume_repo::{CollectionError, CollectionKind, TableThresholds};
    use plume_store::MemoryBackend;
    use std::collections::BTreeMap;
    use plume_types::{Did, Tid};

    struct Owner {
        did: Did,
        key: SigningKey,
        resolver: Arc<MemoryDidResolver>,
        tokens: TokenStore,
        store: BlockStore,
    }

    impl Owner {
        fn new() -> Self {
            let did = Did::parse("did:example:alice").unwrap();
            let key = SigningKey::generate();
            let resolver = Arc::new(MemoryDidResolver::new());
            resolver.register(did.clone(), key.verifying_key());
            let tokens = TokenStore::from_tokens([self_token(&did, &key)]);
            Self {
                did,
                key,
                resolver,
                tokens,
                store: BlockStore::memory(),
            }
        }

        fn verifier(&self) -> DiffVerifier {
            DiffVerifier::new(self.resolver.clone())
        }

        async fn repo(&self) -> Repo {
            Repo::create(
                self.store.clone(),
                self.did.clone(),
                &self.key,
                self.tokens.clone(),
                config(),
            )
            .await
            .unwrap()
        }

        /// A second key allowed to write only `app/posts`.
        fn posts_device(&self) -> (SigningKey, TokenStore) {
            let device = SigningKey::generate();
            let token = TokenBuilder::new()
                .issued_by(self.did.clone(), &self.key)
                .to_audience(device.did())
                .claim_capability(Capability::write(&self.did, &["app", "posts"]))
                .build()
                .unwrap();
            (device, TokenStore::from_tokens([token]))
        }
    }

    fn self_token(did: &Did, key: &SigningKey) -> CapabilityToken {
        TokenBuilder::new()
            .issued_by(did.clone(), key)
            .to_audience(key.did())
            .claim_capability(Capability::maintenance(did))
            .claim_capability(Capability::write(did, &[]))
            .build()
            .unwrap()
    }

    fn config() -> RepoConfig {
        RepoConfig {
            tables: TableThresholds::uniform(2),
        }
    }

    fn tid(n: u64) -> Tid {
        Tid::new(20_000 + n, 2)
    }

    async fn post(repo: &mut Repo, kind: CollectionKind, n: u64) {
        let cid = repo.put(&format!("entry {n}")).await.unwrap();
        repo.run_on_namespace("app", |ns| {
            Box::pin(async move {
                ns.add_entry(kind, tid(n), cid).await?;
                Ok(())
            })
        })
        .await
        .unwrap();
    }

    /// Hand-build a commit on top of `repo` that adds an entry, signed by
    /// `key` and citing `repo`'s current token.
    async fn forge_commit(repo: &Repo, key: &SigningKey, kind: CollectionKind, n: u64) -> Cid {
        let store = repo.store();
        let root = repo.get_root().clone();
        let mut ns = Namespace::load(store.clone(), "app", root.namespaces["app"], config().tables)
            .await
            .unwrap();
        let content = store.put(&format!("forged {n}")).await.unwrap();
        ns.add_entry(kind, tid(n), content).await.unwrap();
        let update = ns.take_updates().pop().unwrap();

        let mut namespaces = root.namespaces.clone();
        namespaces.insert("app".into(), update.root);
        let forged = RepoRoot {
            did: root.did.clone(),
            prev: Some(repo.cid()),
            new_cids: update.new_cids,
            auth_token: root.auth_token,
            namespaces,
            relationships: root.relationships,
        };
        sign_root(store, key, &forged).await
    }

    async fn sign_root(store: &BlockStore, key: &SigningKey, root: &RepoRoot) -> Cid {
        let root_cid = store.put(root).await.unwrap();
        let commit = Commit {
            root: root_cid,
            sig: key.sign(root_cid.as_bytes()),
        };
        store.put(&commit).await.unwrap()
    }

    /// Hand-build a genesis signed by `key` that already holds either a
    /// post or a repository relationship.
    async fn forge_genesis(
        owner: &Owner,
        key: &SigningKey,
        token: &CapabilityToken,
        with_post: bool,
    ) -> Cid {
        let store = &owner.store;
        let token_cid = store.put(token).await.unwrap();
        let mut relationships = DidCollection::create(store.clone()).await.unwrap();
        let mut new_cids = relationships.cids().await.unwrap();
        new_cids.add(token_cid);
        let mut namespaces = BTreeMap::new();
        if with_post {
            let mut ns = Namespace::create(store.clone(), "app", config().tables)
                .await
                .unwrap();
            let content = store.put("smuggled").await.unwrap();
            ns.add_entry(CollectionKind::Posts, tid(1), content).await.unwrap();
            let update = ns.take_updates().pop().unwrap();
            new_cids.add_set(&update.new_cids);
            namespaces.insert("app".to_string(), update.root);
        } else {
            let bob = Did::parse("did:example:bob").unwrap();
            let follow = store.put("follow").await.unwrap();
            new_cids.add_set(&relationships.add_entry(bob, follow).await.unwrap());
        }
        let root = RepoRoot {
            did: owner.did.clone(),
            prev: None,
            new_cids,
            auth_token: token_cid,
            namespaces,
            relationships: relationships.cid(),
        };
        sign_root(store, key, &root).await
    }

    async fn copy_blocks(from: &BlockStore, to: &BlockStore, cids: &[Cid]) {
        for cid in cids {
            let bytes = from.get_bytes(cid).await.unwrap();
            to.put_bytes(*cid, bytes).await.unwrap();
        }
    }

    async fn receiver_at(owner: &Owner, head: Cid) -> Repo {
        let source = Repo::load(owner.store.clone(), head, config()).await.unwrap();
        let archive = source.get_full_history().await.unwrap();
        let mut sink: Vec<Event> = Vec::new();
        let (repo, _) = owner
            .verifier()
            .load_and_verify_history(BlockStore::memory(), &archive, config(), &mut sink)
            .await
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn history_replay_matches_live_events() {
        let owner = Owner::new();
        let mut repo = owner.repo().await;
        for n in 1..=9 {
            post(&mut repo, CollectionKind::Posts, n).await;
        }
        post(&mut repo, CollectionKind::Interactions, 10).await;

        let edited = repo.put("edited").await.unwrap();
        let bob = Did::parse("did:example:bob").unwrap();
        let follow = repo.put("follow").await.unwrap();
        let profile = repo.put("profile").await.unwrap();
        let bob_ns = bob.clone();
        repo.run_on_namespace("app", |ns| {
            Box::pin(async move {
                ns.edit_entry(CollectionKind::Posts, tid(2), edited).await?;
                ns.delete_entry(CollectionKind::Posts, tid(3)).await?;
                ns.add_relationship(bob_ns, follow).await?;
                ns.set_profile(Some(profile)).await?;
                Ok(())
            })
        })
        .await
        .unwrap();
        repo.add_relationship(bob.clone(), follow).await.unwrap();
        repo.edit_relationship(bob.clone(), edited).await.unwrap();
        post(&mut repo, CollectionKind::Posts, 11).await;
        repo.delete_namespace("app").await.unwrap();
        post(&mut repo, CollectionKind::Posts, 12).await;
        let live = repo.take_events();

        let archive = repo.get_full_history().await.unwrap();
        let mut replayed: Vec<Event> = Vec::new();
        let (copy, report) = owner
            .verifier()
            .load_and_verify_history(BlockStore::memory(), &archive, config(), &mut replayed)
            .await
            .unwrap();

        assert_eq!(replayed, live);
        assert_eq!(report.head, repo.cid());
        assert_eq!(report.commits_verified, live.len() as u64);
        assert_eq!(report.events_emitted, live.len() as u64);
        assert_eq!(copy.cid(), repo.cid());
    }

    #[tokio::test]
    async fn incremental_diff_advances_receiver() {
        let owner = Owner::new();
        let mut repo = owner.repo().await;
        post(&mut repo, CollectionKind::Posts, 1).await;
        let mut receiver = receiver_at(&owner, repo.cid()).await;
        repo.take_events();

        post(&mut repo, CollectionKind::Posts, 2).await;
        post(&mut repo, CollectionKind::Posts, 3).await;
        let live = repo.take_events();

        let diff = repo.get_diff_car(Some(receiver.cid())).await.unwrap();
        let mut grouped: Vec<(Cid, Vec<Event>)> = Vec::new();
        let report = load_and_verify_diff(&mut receiver, &diff, owner.resolver.clone(), &mut grouped)
            .await
            .unwrap();

        assert_eq!(report.commits_verified, 2);
        assert_eq!(receiver.cid(), repo.cid());
        let events: Vec<Event> = grouped.into_iter().flat_map(|(_, e)| e).collect();
        assert_eq!(events, live);
    }

    #[tokio::test]
    async fn escalated_write_is_rejected_after_valid_progress() {
        let owner = Owner::new();
        let genesis = owner.repo().await;
        let mut receiver = receiver_at(&owner, genesis.cid()).await;

        let (device, tokens) = owner.posts_device();
        let mut repo = Repo::load(owner.store.clone(), genesis.cid(), config())
            .await
            .unwrap()
            .with_signer(SigningKey::from_bytes(*device.as_bytes()), tokens);
        post(&mut repo, CollectionKind::Posts, 1).await;
        let valid = repo.cid();

        let forged = forge_commit(&repo, &device, CollectionKind::Interactions, 2).await;
        repo.load_root(forged).await.unwrap();
        let diff = repo.get_diff_car(Some(receiver.cid())).await.unwrap();

        let mut sink: Vec<(Cid, Vec<Event>)> = Vec::new();
        let err = owner
            .verifier()
            .load_and_verify_diff(&mut receiver, &diff, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::UnauthorizedChange { commit, .. } if commit == forged
        ));
        assert_eq!(receiver.cid(), valid);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].0, valid);
    }

    #[tokio::test]
    async fn genesis_must_be_empty() {
        let owner = Owner::new();
        let device = SigningKey::generate();
        let token = TokenBuilder::new()
            .issued_by(owner.did.clone(), &owner.key)
            .to_audience(device.did())
            .claim_capability(Capability::maintenance(&owner.did))
            .build()
            .unwrap();

        for with_post in [true, false] {
            let genesis = forge_genesis(&owner, &device, &token, with_post).await;
            let archive = Repo::load(owner.store.clone(), genesis, config())
                .await
                .unwrap()
                .get_full_history()
                .await
                .unwrap();

            let mut sink: Vec<Event> = Vec::new();
            let err = owner
                .verifier()
                .load_and_verify_history(BlockStore::memory(), &archive, config(), &mut sink)
                .await
                .unwrap_err();
            assert!(matches!(err, SyncError::NonEmptyGenesis(c) if c == genesis));
            assert!(sink.is_empty());
        }
    }

    #[tokio::test]
    async fn added_namespace_must_be_complete() {
        let owner = Owner::new();
        let genesis = owner.repo().await;
        let mut receiver = receiver_at(&owner, genesis.cid()).await;

        let store = &owner.store;
        let mut ns = Namespace::create(store.clone(), "app", config().tables)
            .await
            .unwrap();
        let content = store.put("entry").await.unwrap();
        ns.add_entry(CollectionKind::Posts, tid(1), content).await.unwrap();
        let update = ns.take_updates().pop().unwrap();

        // new_cids omits the namespace so only its root is sent
        let mut root = genesis.get_root().clone();
        root.prev = Some(genesis.cid());
        root.new_cids = CidSet::new();
        root.namespaces.insert("app".into(), update.root);
        let commit = sign_root(store, &owner.key, &root).await;
        let root_cid = store.put(&root).await.unwrap();
        copy_blocks(store, receiver.store(), &[commit, root_cid, update.root, content]).await;

        let mut sink: Vec<Event> = Vec::new();
        let err = owner
            .verifier()
            .verify_diff(&mut receiver, commit, &mut sink)
            .await
            .unwrap_err();
        match err {
            SyncError::IncompleteSync(missing) => {
                assert!(missing.contains(&ns.collection(CollectionKind::Posts).cid()));
                assert!(!missing.contains(&update.root));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(receiver.cid(), genesis.cid());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn wildcard_namespace_name_is_rejected() {
        let owner = Owner::new();
        let genesis = owner.repo().await;
        let mut receiver = receiver_at(&owner, genesis.cid()).await;

        let store = &owner.store;
        let ns = Namespace::create(store.clone(), "app", config().tables)
            .await
            .unwrap();
        let mut root = genesis.get_root().clone();
        root.prev = Some(genesis.cid());
        root.new_cids = CidSet::new();
        root.namespaces.insert("*".into(), ns.cid());
        let commit = sign_root(receiver.store(), &owner.key, &root).await;

        let mut sink: Vec<Event> = Vec::new();
        let err = owner
            .verifier()
            .verify_diff(&mut receiver, commit, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Collection(CollectionError::InvalidNamespace(name)) if name == "*"
        ));
        assert_eq!(receiver.cid(), genesis.cid());
    }

    #[tokio::test]
    async fn changed_did_is_rejected() {
        let owner = Owner::new();
        let mut repo = owner.repo().await;
        post(&mut repo, CollectionKind::Posts, 1).await;
        let mut receiver = receiver_at(&owner, repo.cid()).await;

        let mallory = Did::parse("did:example:mallory").unwrap();
        let mut root = repo.get_root().clone();
        root.did = mallory.clone();
        root.prev = Some(repo.cid());
        root.new_cids = CidSet::new();
        let commit = sign_root(receiver.store(), &owner.key, &root).await;

        let mut sink: Vec<Event> = Vec::new();
        let err = owner
            .verifier()
            .verify_diff(&mut receiver, commit, &mut sink)
            .await
            .unwrap_err();
        match err {
            SyncError::DidChanged { commit: c, expected, found } => {
                assert_eq!(c, commit);
                assert_eq!(expected, owner.did);
                assert_eq!(found, mallory);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(receiver.cid(), repo.cid());
    }

    #[tokio::test]
    async fn wrong_signer_is_rejected() {
        let owner = Owner::new();
        let mut repo = owner.repo().await;
        post(&mut repo, CollectionKind::Posts, 1).await;
        let mut receiver = receiver_at(&owner, repo.cid()).await;

        let stranger = SigningKey::generate();
        let forged = forge_commit(&repo, &stranger, CollectionKind::Posts, 2).await;
        repo.load_root(forged).await.unwrap();
        let diff = repo.get_diff_car(Some(receiver.cid())).await.unwrap();

        let mut sink: Vec<Event> = Vec::new();
        let err = owner
            .verifier()
            .load_and_verify_diff(&mut receiver, &diff, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidSignature(c) if c == forged));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn unrelated_history_is_missing() {
        let owner = Owner::new();
        let mut receiver = receiver_at(&owner, owner.repo().await.cid()).await;

        let other = Owner::new();
        let mut unrelated = other.repo().await;
        post(&mut unrelated, CollectionKind::Posts, 1).await;
        let archive = unrelated.get_full_history().await.unwrap();

        let mut sink: Vec<Event> = Vec::new();
        let err = other
            .verifier()
            .load_and_verify_diff(&mut receiver, &archive, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingHistory(_)));
    }

    #[tokio::test]
    async fn dropped_blocks_are_incomplete() {
        let owner = Owner::new();
        let mut repo = owner.repo().await;
        post(&mut repo, CollectionKind::Posts, 1).await;

        let backend = Arc::new(MemoryBackend::new());
        let store = BlockStore::from_arc(backend.clone());
        let archive = repo.get_full_history().await.unwrap();
        let mut sink: Vec<Event> = Vec::new();
        let (mut receiver, _) = owner
            .verifier()
            .load_and_verify_history(store.clone(), &archive, config(), &mut sink)
            .await
            .unwrap();

        post(&mut repo, CollectionKind::Posts, 2).await;
        let content = repo.put(&format!("entry {}", 2)).await.unwrap();
        let diff = repo.get_diff_car(Some(receiver.cid())).await.unwrap();
        let head = store.load_car(&diff).await.unwrap();
        assert!(backend.remove(&content));

        let err = owner
            .verifier()
            .verify_diff(&mut receiver, head, &mut sink)
            .await
            .unwrap_err();
        match err {
            SyncError::IncompleteSync(missing) => assert!(missing.contains(&content)),
            other => panic!("unexpected error: {other}"),
        }
        assert_ne!(receiver.cid(), head);
    }

    #[tokio::test]
    async fn expired_tokens_no_longer_authorize() {
        let owner = Owner::new();
        let mut repo = owner.repo().await;
        post(&mut repo, CollectionKind::Posts, 1).await;
        let archive = repo.get_full_history().await.unwrap();

        let later = unix_now() + 2 * DEFAULT_LIFETIME_SECS;
        let mut sink: Vec<Event> = Vec::new();
        let err = owner
            .verifier()
            .with_now(later)
            .load_and_verify_history(BlockStore::memory(), &archive, config(), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnauthorizedChange { .. }));
    }
}
