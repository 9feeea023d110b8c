use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use plume_types::Cid;
use tracing::debug;

use crate::backend::BlockBackend;
use crate::error::StoreResult;

/// File-backed block storage: one file per block.
///
/// Layout mirrors a git object directory: `<root>/<first 2 hex>/<rest>`.
/// Writes go to a temporary sibling and are renamed into place, so a reader
/// never observes a partially written block.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Open (creating if needed) a block directory.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn block_path(&self, cid: &Cid) -> PathBuf {
        let hex = cid.to_string();
        // skip the one-character text prefix
        let digest = &hex[1..];
        self.root.join(&digest[..2]).join(&digest[2..])
    }
}

#[async_trait]
impl BlockBackend for FileBackend {
    async fn get(&self, cid: &Cid) -> StoreResult<Option<Bytes>> {
        match tokio::fs::read(self.block_path(cid)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, cid: Cid, data: Bytes) -> StoreResult<()> {
        let path = self.block_path(&cid);
        if tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension(format!("tmp{}", std::process::id()));
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(cid = %cid, bytes = data.len(), "block written");
        Ok(())
    }

    async fn has(&self, cid: &Cid) -> StoreResult<bool> {
        Ok(tokio::fs::try_exists(self.block_path(cid)).await?)
    }
}
