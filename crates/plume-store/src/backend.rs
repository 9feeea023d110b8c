use async_trait::async_trait;
use bytes::Bytes;
use plume_types::Cid;

use crate::error::StoreResult;

/// Raw content-addressed block storage.
///
/// Implementations must satisfy these invariants:
/// - A block is immutable once written. Writing a CID that already exists is
///   a no-op.
/// - Callers are responsible for the CID matching the bytes; the typed
///   [`BlockStore`](crate::BlockStore) facade guarantees this.
/// - Concurrent reads and concurrent writes of distinct CIDs are safe.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait BlockBackend: Send + Sync {
    /// Read a block. Returns `Ok(None)` if absent.
    async fn get(&self, cid: &Cid) -> StoreResult<Option<Bytes>>;

    /// Write a block under its CID.
    async fn put(&self, cid: Cid, data: Bytes) -> StoreResult<()>;

    /// Check whether a block exists.
    async fn has(&self, cid: &Cid) -> StoreResult<bool>;

    /// Check presence of many blocks. Default calls `has()` for each.
    async fn has_many(&self, cids: &[Cid]) -> StoreResult<Vec<bool>> {
        let mut out = Vec::with_capacity(cids.len());
        for cid in cids {
            out.push(self.has(cid).await?);
        }
        Ok(out)
    }
}
