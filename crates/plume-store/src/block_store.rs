use std::sync::Arc;

use bytes::Bytes;
use plume_car::{CarReader, CarWriter};
use plume_crypto::ContentHasher;
use plume_types::Cid;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::backend::BlockBackend;
use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryBackend;

/// Typed facade over a [`BlockBackend`].
///
/// Values are encoded as canonical JSON and identified by
/// `ContentHasher::BLOCK`. Decoding into the wrong shape is reported as
/// [`StoreError::SchemaMismatch`]. Cloning shares the backend.
#[derive(Clone)]
pub struct BlockStore {
    backend: Arc<dyn BlockBackend>,
}

impl BlockStore {
    pub fn new(backend: impl BlockBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<dyn BlockBackend>) -> Self {
        Self { backend }
    }

    /// Store backed by a fresh [`MemoryBackend`].
    pub fn memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    pub fn backend(&self) -> &Arc<dyn BlockBackend> {
        &self.backend
    }

    /// Encode a value without storing it.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> StoreResult<(Cid, Bytes)> {
        let data =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok((ContentHasher::BLOCK.hash(&data), Bytes::from(data)))
    }

    /// Encode and store a value, returning its CID.
    pub async fn put<T: Serialize + ?Sized>(&self, value: &T) -> StoreResult<Cid> {
        let (cid, data) = Self::encode(value)?;
        self.backend.put(cid, data).await?;
        Ok(cid)
    }

    /// Load and decode a block.
    pub async fn get<T: DeserializeOwned>(&self, cid: &Cid) -> StoreResult<T> {
        let data = self.get_bytes(cid).await?;
        serde_json::from_slice(&data).map_err(|e| StoreError::SchemaMismatch {
            cid: *cid,
            reason: e.to_string(),
        })
    }

    pub async fn has(&self, cid: &Cid) -> StoreResult<bool> {
        self.backend.has(cid).await
    }

    /// Ingest raw bytes received from elsewhere, checking them against `cid`.
    pub async fn put_bytes(&self, cid: Cid, data: Bytes) -> StoreResult<()> {
        if !ContentHasher::BLOCK.verify(&data, &cid) {
            return Err(StoreError::HashMismatch(cid));
        }
        self.backend.put(cid, data).await
    }

    pub async fn get_bytes(&self, cid: &Cid) -> StoreResult<Bytes> {
        self.backend
            .get(cid)
            .await?
            .ok_or(StoreError::NotFound(*cid))
    }

    /// Copy one block into an archive being built.
    pub async fn add_to_car(&self, writer: &mut CarWriter, cid: &Cid) -> StoreResult<()> {
        if writer.contains(cid) {
            return Ok(());
        }
        let data = self.get_bytes(cid).await?;
        writer.add(*cid, data);
        Ok(())
    }

    /// Ingest every block of an archive and return its declared root.
    pub async fn load_car(&self, archive: &[u8]) -> StoreResult<Cid> {
        let reader = CarReader::from_bytes(archive)?;
        let root = reader.root();
        let blocks = reader.into_blocks();
        let count = blocks.len();
        for (cid, data) in blocks {
            // the reader already re-hashed every block
            self.backend.put(cid, data).await?;
        }
        debug!(root = %root, blocks = count, "archive imported");
        Ok(root)
    }
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Pair {
        left: String,
        right: u32,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Other {
        missing: Vec<u8>,
    }

    #[tokio::test]
    async fn put_get_typed() {
        let store = BlockStore::memory();
        let value = Pair {
            left: "a".into(),
            right: 3,
        };
        let cid = store.put(&value).await.unwrap();
        assert!(store.has(&cid).await.unwrap());
        let back: Pair = store.get(&cid).await.unwrap();
        assert_eq!(back, value);
    }

    #[tokio::test]
    async fn identical_values_share_a_cid() {
        let store = BlockStore::memory();
        let mut a = BTreeMap::new();
        a.insert("x", 1);
        a.insert("y", 2);
        let mut b = BTreeMap::new();
        b.insert("y", 2);
        b.insert("x", 1);
        assert_eq!(store.put(&a).await.unwrap(), store.put(&b).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_shape_is_schema_mismatch() {
        let store = BlockStore::memory();
        let cid = store
            .put(&Pair {
                left: "a".into(),
                right: 1,
            })
            .await
            .unwrap();
        let err = store.get::<Other>(&cid).await.unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { .. }));
    }

    #[tokio::test]
    async fn missing_block_is_not_found() {
        let store = BlockStore::memory();
        let cid = Cid::from_hash([1; 32]);
        assert!(matches!(
            store.get::<Pair>(&cid).await,
            Err(StoreError::NotFound(c)) if c == cid
        ));
    }

    #[tokio::test]
    async fn put_bytes_checks_hash() {
        let store = BlockStore::memory();
        let (cid, data) = BlockStore::encode("hello").unwrap();
        store.put_bytes(cid, data).await.unwrap();
        let err = store
            .put_bytes(cid, Bytes::from_static(b"\"other\""))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch(_)));
    }

    #[tokio::test]
    async fn archive_export_import() {
        let source = BlockStore::memory();
        let a = source.put("first").await.unwrap();
        let b = source.put("second").await.unwrap();

        let mut writer = CarWriter::new(a);
        source.add_to_car(&mut writer, &a).await.unwrap();
        source.add_to_car(&mut writer, &b).await.unwrap();
        source.add_to_car(&mut writer, &b).await.unwrap();
        assert_eq!(writer.len(), 2);
        let archive = writer.finish().unwrap();

        let dest = BlockStore::memory();
        let root = dest.load_car(&archive).await.unwrap();
        assert_eq!(root, a);
        let second: String = dest.get(&b).await.unwrap();
        assert_eq!(second, "second");
    }
}
