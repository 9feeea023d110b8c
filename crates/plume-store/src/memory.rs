use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use plume_types::Cid;

use crate::backend::BlockBackend;
use crate::error::StoreResult;

/// In-memory, HashMap-based block backend.
///
/// Intended for tests and embedding. Blocks are held behind a `RwLock`;
/// `Bytes` makes reads a reference-count bump rather than a copy.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blocks: RwLock<HashMap<Cid, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blocks.
    pub fn total_bytes(&self) -> usize {
        self.blocks
            .read()
            .expect("lock poisoned")
            .values()
            .map(Bytes::len)
            .sum()
    }

    /// Remove one block. Only used to simulate partial transfers.
    pub fn remove(&self, cid: &Cid) -> bool {
        self.blocks.write().expect("lock poisoned").remove(cid).is_some()
    }

    /// Sorted list of all stored CIDs.
    pub fn all_cids(&self) -> Vec<Cid> {
        let map = self.blocks.read().expect("lock poisoned");
        let mut cids: Vec<Cid> = map.keys().copied().collect();
        cids.sort();
        cids
    }
}

#[async_trait]
impl BlockBackend for MemoryBackend {
    async fn get(&self, cid: &Cid) -> StoreResult<Option<Bytes>> {
        Ok(self.blocks.read().expect("lock poisoned").get(cid).cloned())
    }

    async fn put(&self, cid: Cid, data: Bytes) -> StoreResult<()> {
        self.blocks
            .write()
            .expect("lock poisoned")
            .entry(cid)
            .or_insert(data);
        Ok(())
    }

    async fn has(&self, cid: &Cid) -> StoreResult<bool> {
        Ok(self.blocks.read().expect("lock poisoned").contains_key(cid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u8) -> Cid {
        Cid::from_hash([n; 32])
    }

    #[tokio::test]
    async fn put_get_has() {
        let backend = MemoryBackend::new();
        assert!(!backend.has(&cid(1)).await.unwrap());
        backend.put(cid(1), Bytes::from_static(b"one")).await.unwrap();
        assert!(backend.has(&cid(1)).await.unwrap());
        assert_eq!(
            backend.get(&cid(1)).await.unwrap(),
            Some(Bytes::from_static(b"one"))
        );
        assert_eq!(backend.get(&cid(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_is_write_once() {
        let backend = MemoryBackend::new();
        backend.put(cid(1), Bytes::from_static(b"first")).await.unwrap();
        backend.put(cid(1), Bytes::from_static(b"second")).await.unwrap();
        assert_eq!(backend.len(), 1);
        assert_eq!(
            backend.get(&cid(1)).await.unwrap(),
            Some(Bytes::from_static(b"first"))
        );
    }

    #[tokio::test]
    async fn has_many_and_remove() {
        let backend = MemoryBackend::new();
        backend.put(cid(1), Bytes::from_static(b"a")).await.unwrap();
        backend.put(cid(2), Bytes::from_static(b"bb")).await.unwrap();
        assert_eq!(backend.total_bytes(), 3);
        assert!(backend.remove(&cid(1)));
        assert_eq!(
            backend.has_many(&[cid(1), cid(2)]).await.unwrap(),
            vec![false, true]
        );
        assert_eq!(backend.all_cids(), vec![cid(2)]);
    }
}
