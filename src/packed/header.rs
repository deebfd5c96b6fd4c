//! Fixed-size header of a packed tree image.
//!
//! ```text
//! [magic:4 "RXCT"][version:1][mode:1][storage:1][stride:1][budget:1]
//! [widths:5 head-to-tail][reserved:2]
//! [nodes:u32 LE][chunks:u32 LE][empties:u32 LE]
//! ```
//!
//! `nodes` is enough to answer `size()` without touching any node.

use crate::analysis::ChunkMode;
use crate::error::{Error, Result};
use crate::layout::Widths;

use super::{NodeStorage, WordWidth};

pub(crate) const MAGIC: [u8; 4] = *b"RXCT";
pub(crate) const VERSION: u8 = 1;
pub(crate) const HEADER_LEN: usize = 28;

/// Largest node count the header can describe.
pub const MAX_NODES: usize = u32::MAX as usize;
/// Largest crammed buffer the header can describe.
pub const MAX_CHUNK_BYTES: usize = u32::MAX as usize;

const STORAGE_W32: u8 = 0;
const STORAGE_W64: u8 = 1;
const STORAGE_BYTES: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub mode: ChunkMode,
    pub storage: NodeStorage,
    pub budget: u32,
    pub widths: Widths,
    pub nodes: usize,
    pub chunks: usize,
    pub empties: usize,
}

/// Checks node and chunk counts against the given limits.
pub(crate) fn check_limits(
    nodes: usize,
    chunks: usize,
    max_nodes: usize,
    max_chunks: usize,
) -> Result<()> {
    if nodes > max_nodes {
        return Err(Error::NodesOverflow { nodes, max: max_nodes });
    }
    if chunks > max_chunks {
        return Err(Error::ChunksOverflow { len: chunks, max: max_chunks });
    }
    Ok(())
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> usize {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

impl Header {
    pub fn write(&self, out: &mut Vec<u8>) {
        let (tag, stride) = match self.storage {
            NodeStorage::InlineWord(WordWidth::W32) => (STORAGE_W32, 4),
            NodeStorage::InlineWord(WordWidth::W64) => (STORAGE_W64, 8),
            NodeStorage::ByteBody(n) => (STORAGE_BYTES, n),
        };
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(match self.mode {
            ChunkMode::Whole => 0,
            ChunkMode::Firstless => 1,
        });
        out.push(tag);
        out.push(stride);
        out.push(self.budget as u8);
        out.extend(self.widths.to_array().iter().map(|&w| w as u8));
        out.extend_from_slice(&[0; 2]);
        // Counts were checked against MAX_NODES / MAX_CHUNK_BYTES at build time.
        out.extend_from_slice(&(self.nodes as u32).to_le_bytes());
        out.extend_from_slice(&(self.chunks as u32).to_le_bytes());
        out.extend_from_slice(&(self.empties as u32).to_le_bytes());
    }

    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
            return Err(Error::BadMagic);
        }
        if bytes.len() < HEADER_LEN {
            return Err(Error::Truncated {
                needed: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        if bytes[4] != VERSION {
            return Err(Error::UnsupportedVersion(bytes[4]));
        }
        let mode = match bytes[5] {
            0 => ChunkMode::Whole,
            1 => ChunkMode::Firstless,
            _ => return Err(Error::Corrupt("unknown chunk mode")),
        };
        let storage = match (bytes[6], bytes[7]) {
            (STORAGE_W32, 4) => NodeStorage::InlineWord(WordWidth::W32),
            (STORAGE_W64, 8) => NodeStorage::InlineWord(WordWidth::W64),
            (STORAGE_BYTES, n) => NodeStorage::ByteBody(n),
            (STORAGE_W32 | STORAGE_W64, _) => {
                return Err(Error::Corrupt("word storage with wrong stride"))
            }
            _ => return Err(Error::Corrupt("unknown node storage")),
        };
        let budget = u32::from(bytes[8]);
        let mut w = [0u32; 5];
        for (i, slot) in w.iter_mut().enumerate() {
            *slot = u32::from(bytes[9 + i]);
        }
        let header = Self {
            mode,
            storage,
            budget,
            widths: Widths::from_array(w),
            nodes: read_u32(bytes, 16),
            chunks: read_u32(bytes, 20),
            empties: read_u32(bytes, 24),
        };
        if header.mode == ChunkMode::Whole && header.empties != 0 {
            return Err(Error::Corrupt("empty-chunk list outside firstless mode"));
        }
        if header.empties > header.nodes {
            return Err(Error::Corrupt("more empty chunks than nodes"));
        }
        Ok(header)
    }
}
