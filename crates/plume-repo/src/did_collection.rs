//! Relationship collections keyed by DID.
//!
//! A hashed trie with 16-way fan-out over the key's `TRIE_KEY` digest. A
//! bucket holds up to [`BUCKET_SIZE`] entries inline and splits into a child
//! node past that. Deletes collapse any child that shrinks back to
//! [`BUCKET_SIZE`] leaf entries, so the shape depends only on the key set.

use std::collections::BTreeMap;

use bytes::Bytes;
use plume_crypto::ContentHasher;
use plume_store::{BlockStore, StoreResult};
use plume_types::{Cid, CidSet, Did};
use serde::{Deserialize, Serialize};

use crate::error::{CollectionError, CollectionResult};

/// Entries held inline per bucket before it splits.
pub const BUCKET_SIZE: usize = 3;

/// One nibble per level of a 32-byte digest.
const MAX_DEPTH: usize = 64;

/// A `(did, cid)` pair stored in a [`DidCollection`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DidEntry {
    pub did: Did,
    pub cid: Cid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Bucket {
    Leaf(Vec<DidEntry>),
    Node(Cid),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct TrieNode {
    buckets: BTreeMap<u8, Bucket>,
}

impl TrieNode {
    fn has_children(&self) -> bool {
        self.buckets.values().any(|b| matches!(b, Bucket::Node(_)))
    }

    fn leaf_entries(&self) -> impl Iterator<Item = &DidEntry> {
        self.buckets.values().flat_map(|b| match b {
            Bucket::Leaf(entries) => entries.as_slice(),
            Bucket::Node(_) => &[],
        })
    }
}

fn key_digest(did: &Did) -> [u8; 32] {
    ContentHasher::TRIE_KEY.digest(did.as_str().as_bytes())
}

fn nibble(digest: &[u8; 32], depth: usize) -> u8 {
    let byte = digest[depth / 2];
    if depth % 2 == 0 {
        byte >> 4
    } else {
        byte & 0x0f
    }
}

/// Nodes visited from the root down to the node holding a key's bucket.
struct TriePath {
    digest: [u8; 32],
    /// Ancestors with the nibble that leads to the next node.
    ancestors: Vec<(TrieNode, u8)>,
    node: TrieNode,
}

impl TriePath {
    fn depth(&self) -> usize {
        self.ancestors.len()
    }

    fn nibble(&self) -> u8 {
        nibble(&self.digest, self.depth())
    }

    fn leaf_mut(&mut self) -> Option<&mut Vec<DidEntry>> {
        let nib = self.nibble();
        match self.node.buckets.get_mut(&nib) {
            Some(Bucket::Leaf(entries)) => Some(entries),
            _ => None,
        }
    }
}

/// Blocks produced by one mutation, written after the new shape is built.
#[derive(Default)]
struct PendingBlocks(Vec<(Cid, Bytes)>);

impl PendingBlocks {
    fn encode(&mut self, node: &TrieNode) -> StoreResult<Cid> {
        let (cid, data) = BlockStore::encode(node)?;
        self.0.push((cid, data));
        Ok(cid)
    }

    async fn write(self, store: &BlockStore, new_cids: &mut CidSet) -> StoreResult<()> {
        for (cid, data) in self.0 {
            store.put_bytes(cid, data).await?;
            new_cids.add(cid);
        }
        Ok(())
    }
}

/// A DID-keyed collection stored as a hashed trie.
#[derive(Clone, Debug)]
pub struct DidCollection {
    store: BlockStore,
    cid: Cid,
    root: TrieNode,
}

impl DidCollection {
    pub async fn create(store: BlockStore) -> CollectionResult<Self> {
        let root = TrieNode::default();
        let cid = store.put(&root).await?;
        Ok(Self { store, cid, root })
    }

    pub async fn load(store: BlockStore, cid: Cid) -> CollectionResult<Self> {
        let root = store.get(&cid).await?;
        Ok(Self { store, cid, root })
    }

    /// CID of the root trie node.
    pub fn cid(&self) -> Cid {
        self.cid
    }

    async fn find(&self, did: &Did) -> CollectionResult<TriePath> {
        let digest = key_digest(did);
        let mut ancestors = Vec::new();
        let mut node = self.root.clone();
        loop {
            let nib = nibble(&digest, ancestors.len());
            let child = match node.buckets.get(&nib) {
                Some(Bucket::Node(child)) => *child,
                _ => break,
            };
            let next: TrieNode = self.store.get(&child).await?;
            ancestors.push((node, nib));
            node = next;
        }
        Ok(TriePath {
            digest,
            ancestors,
            node,
        })
    }

    pub async fn get_entry(&self, did: &Did) -> CollectionResult<Option<Cid>> {
        let mut path = self.find(did).await?;
        Ok(path
            .leaf_mut()
            .and_then(|entries| entries.iter().find(|e| e.did == *did))
            .map(|e| e.cid))
    }

    pub async fn has_entry(&self, did: &Did) -> CollectionResult<bool> {
        Ok(self.get_entry(did).await?.is_some())
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    pub async fn add_entry(&mut self, did: Did, cid: Cid) -> CollectionResult<CidSet> {
        let mut path = self.find(&did).await?;
        let depth = path.depth();
        let nib = path.nibble();
        let mut blocks = PendingBlocks::default();

        let mut entries = match path.node.buckets.remove(&nib) {
            Some(Bucket::Leaf(entries)) => entries,
            _ => Vec::new(),
        };
        if entries.iter().any(|e| e.did == did) {
            return Err(CollectionError::DuplicateKey(did.to_string()));
        }
        entries.push(DidEntry { did, cid });
        entries.sort_by(|a, b| a.did.cmp(&b.did));

        let bucket = if entries.len() > BUCKET_SIZE && depth + 1 < MAX_DEPTH {
            let child = split(entries, depth + 1);
            Bucket::Node(encode_subtree(child, depth + 1, &mut blocks)?)
        } else {
            Bucket::Leaf(entries)
        };
        path.node.buckets.insert(nib, bucket);

        self.commit(path, blocks, Some(cid)).await
    }

    pub async fn edit_entry(&mut self, did: &Did, cid: Cid) -> CollectionResult<CidSet> {
        let mut path = self.find(did).await?;
        let entry = path
            .leaf_mut()
            .and_then(|entries| entries.iter_mut().find(|e| e.did == *did))
            .ok_or_else(|| CollectionError::NotFound(did.to_string()))?;
        entry.cid = cid;
        self.commit(path, PendingBlocks::default(), Some(cid)).await
    }

    pub async fn delete_entry(&mut self, did: &Did) -> CollectionResult<CidSet> {
        let mut path = self.find(did).await?;
        let nib = path.nibble();
        let entries = path
            .leaf_mut()
            .ok_or_else(|| CollectionError::NotFound(did.to_string()))?;
        let before = entries.len();
        entries.retain(|e| e.did != *did);
        if entries.len() == before {
            return Err(CollectionError::NotFound(did.to_string()));
        }
        if entries.is_empty() {
            path.node.buckets.remove(&nib);
        }
        self.commit(path, PendingBlocks::default(), None).await
    }

    /// Re-encode the path bottom-up, collapsing children that fit in a
    /// single bucket, then write the blocks and adopt the new root.
    async fn commit(
        &mut self,
        path: TriePath,
        mut blocks: PendingBlocks,
        value: Option<Cid>,
    ) -> CollectionResult<CidSet> {
        let TriePath {
            ancestors, mut node, ..
        } = path;
        for (mut parent, nib) in ancestors.into_iter().rev() {
            if !node.has_children() && node.leaf_entries().count() <= BUCKET_SIZE {
                let mut entries: Vec<DidEntry> = node.leaf_entries().cloned().collect();
                entries.sort_by(|a, b| a.did.cmp(&b.did));
                if entries.is_empty() {
                    parent.buckets.remove(&nib);
                } else {
                    parent.buckets.insert(nib, Bucket::Leaf(entries));
                }
            } else {
                let cid = blocks.encode(&node)?;
                parent.buckets.insert(nib, Bucket::Node(cid));
            }
            node = parent;
        }
        let root_cid = blocks.encode(&node)?;

        let mut new_cids = CidSet::new();
        if let Some(value) = value {
            new_cids.add(value);
        }
        blocks.write(&self.store, &mut new_cids).await?;
        self.root = node;
        self.cid = root_cid;
        Ok(new_cids)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Every entry, sorted by DID.
    pub async fn get_entries(&self) -> CollectionResult<Vec<DidEntry>> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(node) = stack.pop() {
            for bucket in node.buckets.values() {
                match bucket {
                    Bucket::Leaf(entries) => out.extend(entries.iter().cloned()),
                    Bucket::Node(cid) => stack.push(self.store.get(cid).await?),
                }
            }
        }
        out.sort_by(|a, b| a.did.cmp(&b.did));
        Ok(out)
    }

    /// Every entry as a map.
    pub async fn entry_map(&self) -> CollectionResult<BTreeMap<Did, Cid>> {
        Ok(self
            .get_entries()
            .await?
            .into_iter()
            .map(|e| (e.did, e.cid))
            .collect())
    }

    /// Trie nodes and entry values reachable from the root.
    pub async fn cids(&self) -> CollectionResult<CidSet> {
        let mut set = CidSet::new();
        set.add(self.cid);
        let mut stack = vec![self.root.clone()];
        while let Some(node) = stack.pop() {
            for bucket in node.buckets.values() {
                match bucket {
                    Bucket::Leaf(entries) => set.extend(entries.iter().map(|e| e.cid)),
                    Bucket::Node(cid) => {
                        set.add(*cid);
                        stack.push(self.store.get(cid).await?);
                    }
                }
            }
        }
        Ok(set)
    }

    /// Blocks reachable from the trie at `cid` that `store` lacks.
    pub async fn missing_cids(store: &BlockStore, cid: &Cid) -> StoreResult<CidSet> {
        let mut missing = CidSet::new();
        let mut stack = vec![*cid];
        while let Some(node_cid) = stack.pop() {
            if !store.has(&node_cid).await? {
                missing.add(node_cid);
                continue;
            }
            let node: TrieNode = store.get(&node_cid).await?;
            for bucket in node.buckets.values() {
                match bucket {
                    Bucket::Leaf(entries) => {
                        for entry in entries {
                            if !store.has(&entry.cid).await? {
                                missing.add(entry.cid);
                            }
                        }
                    }
                    Bucket::Node(child) => stack.push(*child),
                }
            }
        }
        Ok(missing)
    }
}

/// Distribute entries over a fresh node at `depth`.
fn split(entries: Vec<DidEntry>, depth: usize) -> TrieNode {
    let mut node = TrieNode::default();
    for entry in entries {
        let nib = nibble(&key_digest(&entry.did), depth);
        match node
            .buckets
            .entry(nib)
            .or_insert_with(|| Bucket::Leaf(Vec::new()))
        {
            Bucket::Leaf(list) => list.push(entry),
            Bucket::Node(_) => {}
        }
    }
    node
}

/// Encode `node`, splitting any overfull bucket further down first.
fn encode_subtree(
    mut node: TrieNode,
    depth: usize,
    blocks: &mut PendingBlocks,
) -> StoreResult<Cid> {
    let overfull: Vec<u8> = node
        .buckets
        .iter()
        .filter(|(_, b)| matches!(b, Bucket::Leaf(e) if e.len() > BUCKET_SIZE))
        .map(|(nib, _)| *nib)
        .collect();
    if depth + 1 < MAX_DEPTH {
        for nib in overfull {
            if let Some(Bucket::Leaf(entries)) = node.buckets.remove(&nib) {
                let child = split(entries, depth + 1);
                let cid = encode_subtree(child, depth + 1, blocks)?;
                node.buckets.insert(nib, Bucket::Node(cid));
            }
        }
    }
    blocks.encode(&node)
}
