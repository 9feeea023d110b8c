use std::collections::HashSet;

use bytes::Bytes;
use plume_types::Cid;
use tracing::debug;

use crate::error::{CarError, CarResult};
use crate::varint::encode_varint;
use crate::{CarHeader, MAGIC, VERSION};

/// Builds a single-root archive in memory.
///
/// Blocks are written in insertion order; adding the same CID twice keeps
/// only the first copy.
#[derive(Debug)]
pub struct CarWriter {
    root: Cid,
    blocks: Vec<(Cid, Bytes)>,
    seen: HashSet<Cid>,
}

impl CarWriter {
    pub fn new(root: Cid) -> Self {
        Self {
            root,
            blocks: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn root(&self) -> Cid {
        self.root
    }

    /// Queue a block. Returns `false` if it was already queued.
    pub fn add(&mut self, cid: Cid, data: Bytes) -> bool {
        if !self.seen.insert(cid) {
            return false;
        }
        self.blocks.push((cid, data));
        true
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.seen.contains(cid)
    }

    /// Number of blocks queued.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Encode the archive.
    pub fn finish(self) -> CarResult<Vec<u8>> {
        let header = CarHeader {
            version: VERSION,
            roots: vec![self.root],
        };
        let header_bytes =
            serde_json::to_vec(&header).map_err(|e| CarError::Header(e.to_string()))?;

        let mut out = Vec::with_capacity(
            MAGIC.len()
                + header_bytes.len()
                + self.blocks.iter().map(|(_, b)| b.len() + 40).sum::<usize>(),
        );
        out.extend_from_slice(MAGIC);
        encode_varint(&mut out, header_bytes.len() as u64);
        out.extend_from_slice(&header_bytes);

        for (cid, data) in &self.blocks {
            encode_varint(&mut out, (32 + data.len()) as u64);
            out.extend_from_slice(cid.as_bytes());
            out.extend_from_slice(data);
        }

        debug!(root = %self.root, blocks = self.blocks.len(), bytes = out.len(), "archive written");
        Ok(out)
    }
}
