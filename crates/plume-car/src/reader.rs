use bytes::Bytes;
use plume_crypto::ContentHasher;
use plume_types::Cid;
use tracing::debug;

use crate::error::{CarError, CarResult};
use crate::varint::decode_varint;
use crate::{CarHeader, MAGIC, VERSION};

/// A fully parsed and hash-checked archive.
#[derive(Debug, Clone)]
pub struct CarReader {
    root: Cid,
    blocks: Vec<(Cid, Bytes)>,
}

impl CarReader {
    /// Parse an archive, verifying every block against its identifier.
    pub fn from_bytes(data: &[u8]) -> CarResult<Self> {
        if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
            let end = data.len().min(MAGIC.len());
            return Err(CarError::InvalidMagic {
                expected: String::from_utf8_lossy(MAGIC).into(),
                actual: String::from_utf8_lossy(&data[..end]).into(),
            });
        }
        let mut offset = MAGIC.len();

        let header_bytes = read_frame(data, &mut offset)?;
        let header: CarHeader =
            serde_json::from_slice(header_bytes).map_err(|e| CarError::Header(e.to_string()))?;
        if header.version != VERSION {
            return Err(CarError::UnsupportedVersion(header.version));
        }
        let root = match header.roots.as_slice() {
            [root] => *root,
            roots => return Err(CarError::SingleRootRequired(roots.len())),
        };

        let mut blocks = Vec::new();
        while offset < data.len() {
            let frame_start = offset;
            let frame = read_frame(data, &mut offset)?;
            if frame.len() < 32 {
                return Err(CarError::Corrupt {
                    offset: frame_start,
                    reason: format!("block frame of {} bytes has no room for a cid", frame.len()),
                });
            }
            let (digest, body) = frame.split_at(32);
            let cid = Cid::from_slice(digest).map_err(|e| CarError::Corrupt {
                offset: frame_start,
                reason: e.to_string(),
            })?;
            if !ContentHasher::BLOCK.verify(body, &cid) {
                return Err(CarError::HashMismatch(cid));
            }
            blocks.push((cid, Bytes::copy_from_slice(body)));
        }

        debug!(root = %root, blocks = blocks.len(), "archive parsed");
        Ok(Self { root, blocks })
    }

    pub fn root(&self) -> Cid {
        self.root
    }

    /// Blocks in archive order.
    pub fn blocks(&self) -> &[(Cid, Bytes)] {
        &self.blocks
    }

    pub fn get(&self, cid: &Cid) -> Option<&Bytes> {
        self.blocks.iter().find(|(c, _)| c == cid).map(|(_, b)| b)
    }

    pub fn into_blocks(self) -> Vec<(Cid, Bytes)> {
        self.blocks
    }
}

/// Read one varint-prefixed frame, advancing `offset` past it.
fn read_frame<'a>(data: &'a [u8], offset: &mut usize) -> CarResult<&'a [u8]> {
    let start = *offset;
    let (len, consumed) = decode_varint(&data[start..]).ok_or_else(|| CarError::Corrupt {
        offset: start,
        reason: "truncated length prefix".into(),
    })?;
    let body_start = start + consumed;
    let body_end = usize::try_from(len)
        .ok()
        .and_then(|len| body_start.checked_add(len))
        .filter(|end| *end <= data.len())
        .ok_or_else(|| CarError::Corrupt {
            offset: start,
            reason: format!("frame of {len} bytes runs past end of archive"),
        })?;
    *offset = body_end;
    Ok(&data[body_start..body_end])
}
