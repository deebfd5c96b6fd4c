//! Immutable packed radix tree.
//!
//! Every node is one fixed-width word built by [`ShiftLayout::encode`]. All
//! nodes share one crammed chunk buffer. In [`ChunkMode::Firstless`] the
//! leading byte of every chunk lives in a separate one-byte-per-node table,
//! together with the (usually tiny) list of nodes whose chunk is empty.
//!
//! Words are held in one of the [`NodeStorage`] strategies, which replaces a
//! family of fixed-width compactors (24, 32 and 64 bit words, 3 and 4 byte
//! strings, generic N-bit variants) with one codec.
//!
//! Decoding never fails: an out-of-range node has no value, an empty chunk and
//! no children.

pub mod header;

use std::borrow::Cow;
use std::ops::{ControlFlow, Range};

use tracing::debug;

use crate::analysis::{Analysis, ChunkMode};
use crate::bits::{read_le, write_le};
use crate::error::{Error, Result};
use crate::layout::{PackedFields, ShiftLayout};
use crate::{Footprint, SizeHint, Switcher, Tree};

use header::{check_limits, Header, HEADER_LEN, MAX_CHUNK_BYTES, MAX_NODES};

/// Native word sizes for [`NodeStorage::InlineWord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordWidth {
    /// `u32` per node.
    W32,
    /// `u64` per node.
    W64,
}

/// How packed node words are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStorage {
    /// One native word per node.
    InlineWord(WordWidth),
    /// One little-endian group of `n` bytes per node (`n` in `1..=8`) inside a
    /// shared byte body.
    ByteBody(u8),
}

impl NodeStorage {
    /// Bits available per node.
    pub fn capacity(self) -> u32 {
        match self {
            NodeStorage::InlineWord(WordWidth::W32) => 32,
            NodeStorage::InlineWord(WordWidth::W64) => 64,
            NodeStorage::ByteBody(n) => u32::from(n) * 8,
        }
    }

    /// Bytes per node in the serialized image.
    pub fn stride(self) -> usize {
        match self {
            NodeStorage::InlineWord(WordWidth::W32) => 4,
            NodeStorage::InlineWord(WordWidth::W64) => 8,
            NodeStorage::ByteBody(n) => usize::from(n),
        }
    }

    fn validate(self) -> Result<()> {
        match self {
            NodeStorage::ByteBody(n) if n == 0 || n > 8 => Err(Error::InvalidNodeWidth {
                requested: self.capacity(),
                capacity: 64,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
enum Nodes {
    W32(Box<[u32]>),
    W64(Box<[u64]>),
    Bytes { stride: usize, data: Box<[u8]> },
}

impl Nodes {
    fn from_words(storage: NodeStorage, words: impl ExactSizeIterator<Item = u64>) -> Self {
        match storage {
            // Layout guarantees every word fits in 32 bits here.
            NodeStorage::InlineWord(WordWidth::W32) => {
                Nodes::W32(words.map(|w| w as u32).collect())
            }
            NodeStorage::InlineWord(WordWidth::W64) => Nodes::W64(words.collect()),
            NodeStorage::ByteBody(n) => {
                let stride = usize::from(n);
                let mut data = vec![0u8; words.len() * stride];
                for (w, out) in words.zip(data.chunks_exact_mut(stride)) {
                    write_le(w, out);
                }
                Nodes::Bytes {
                    stride,
                    data: data.into_boxed_slice(),
                }
            }
        }
    }

    fn from_le_bytes(storage: NodeStorage, bytes: &[u8]) -> Self {
        let stride = storage.stride();
        Self::from_words(storage, bytes.chunks_exact(stride).map(read_le))
    }

    #[inline]
    fn len(&self) -> usize {
        match self {
            Nodes::W32(w) => w.len(),
            Nodes::W64(w) => w.len(),
            Nodes::Bytes { stride, data } => data.len() / stride,
        }
    }

    #[inline]
    fn word(&self, n: usize) -> Option<u64> {
        match self {
            Nodes::W32(w) => w.get(n).map(|&w| u64::from(w)),
            Nodes::W64(w) => w.get(n).copied(),
            Nodes::Bytes { stride, data } => {
                let at = n.checked_mul(*stride)?;
                data.get(at..at.checked_add(*stride)?).map(read_le)
            }
        }
    }

    fn write_le_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Nodes::W32(w) => w.iter().for_each(|w| out.extend_from_slice(&w.to_le_bytes())),
            Nodes::W64(w) => w.iter().for_each(|w| out.extend_from_slice(&w.to_le_bytes())),
            Nodes::Bytes { data, .. } => out.extend_from_slice(data),
        }
    }
}

/// Read-only packed radix tree.
#[derive(Clone, PartialEq, Eq)]
pub struct PackedTree {
    mode: ChunkMode,
    storage: NodeStorage,
    layout: ShiftLayout,
    /// Leading chunk byte per node (firstless mode only).
    leads: Box<[u8]>,
    /// Ascending indices of nodes with an empty chunk (firstless mode only).
    empties: Box<[u32]>,
    chunks: Box<[u8]>,
    nodes: Nodes,
}

impl std::fmt::Debug for PackedTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackedTree")
            .field("mode", &self.mode)
            .field("storage", &self.storage)
            .field("layout", &self.layout)
            .field("nodes", &self.nodes.len())
            .field("chunk_bytes", &self.chunks.len())
            .finish()
    }
}

impl PackedTree {
    /// Packs `analysis` into `budget` bits per node using `storage`.
    pub fn build(analysis: &Analysis, storage: NodeStorage, budget: u32) -> Result<Self> {
        storage.validate()?;
        let layout = ShiftLayout::compute(budget, storage.capacity(), analysis)?;
        check_limits(analysis.len(), analysis.crammed().len(), MAX_NODES, MAX_CHUNK_BYTES)?;

        let records = analysis.records();
        let nodes = Nodes::from_words(
            storage,
            records.iter().enumerate().map(|(i, r)| layout.encode(i, r)),
        );

        let (leads, empties): (Box<[u8]>, Box<[u32]>) = match analysis.mode() {
            ChunkMode::Whole => (Box::default(), Box::default()),
            ChunkMode::Firstless => (
                records.iter().map(|r| r.lead.unwrap_or(0)).collect(),
                records
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.chunk_is_empty())
                    .map(|(i, _)| i as u32)
                    .collect(),
            ),
        };

        let tree = Self {
            mode: analysis.mode(),
            storage,
            layout,
            leads,
            empties,
            chunks: analysis.crammed().into(),
            nodes,
        };
        debug!(
            nodes = tree.size(),
            ?storage,
            budget,
            image_bytes = tree.image_len(),
            "packed tree"
        );
        Ok(tree)
    }

    /// Packs `analysis` using the full capacity of `storage`.
    pub fn pack(analysis: &Analysis, storage: NodeStorage) -> Result<Self> {
        Self::build(analysis, storage, storage.capacity())
    }

    /// Chunk storage mode.
    pub fn mode(&self) -> ChunkMode {
        self.mode
    }

    /// Node word storage.
    pub fn storage(&self) -> NodeStorage {
        self.storage
    }

    /// Shift table in use.
    pub fn layout(&self) -> &ShiftLayout {
        &self.layout
    }

    /// Shared chunk buffer.
    pub fn chunk_buffer(&self) -> &[u8] {
        &self.chunks
    }

    /// Raw packed word of `node`.
    #[inline]
    pub fn word(&self, node: usize) -> Option<u64> {
        self.nodes.word(node)
    }

    /// Decoded fields of `node`.
    #[inline]
    pub fn fields(&self, node: usize) -> Option<PackedFields> {
        self.word(node).map(|w| self.layout.decode(w))
    }

    #[inline]
    fn body(&self, f: &PackedFields) -> &[u8] {
        let start = f.chunk_pos as usize;
        self.chunks
            .get(start..start.saturating_add(f.chunk_len as usize))
            .unwrap_or(&[])
    }

    #[inline]
    fn chunk_is_empty(&self, node: usize) -> bool {
        u32::try_from(node).map_or(false, |n| self.empties.binary_search(&n).is_ok())
    }

    /// First byte of `node`'s chunk.
    #[inline]
    pub fn lead_of(&self, node: usize) -> Option<u8> {
        match self.mode {
            ChunkMode::Whole => self.fields(node).and_then(|f| self.body(&f).first().copied()),
            ChunkMode::Firstless => {
                if self.chunk_is_empty(node) {
                    None
                } else {
                    self.leads.get(node).copied()
                }
            }
        }
    }

    /// Child indices of `node`, `first..first + amount`.
    pub fn children_range(&self, node: usize) -> Range<usize> {
        let Some(f) = self.fields(node) else {
            return 0..0;
        };
        if f.children_amount == 0 {
            return 0..0;
        }
        let size = self.size();
        let first = (f.children_start as usize)
            .saturating_add(node)
            .saturating_add(1)
            .min(size);
        let end = first.saturating_add(f.children_amount as usize).min(size);
        first..end
    }

    fn image_len(&self) -> usize {
        HEADER_LEN
            + self.leads.len()
            + self.empties.len() * 4
            + self.chunks.len()
            + self.nodes.len() * self.storage.stride()
    }

    /// Serializes the tree into its self-describing image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.image_len());
        Header {
            mode: self.mode,
            storage: self.storage,
            budget: self.layout.budget(),
            widths: self.layout.widths(),
            nodes: self.nodes.len(),
            chunks: self.chunks.len(),
            empties: self.empties.len(),
        }
        .write(&mut out);
        out.extend_from_slice(&self.leads);
        for e in self.empties.iter() {
            out.extend_from_slice(&e.to_le_bytes());
        }
        out.extend_from_slice(&self.chunks);
        self.nodes.write_le_bytes(&mut out);
        debug_assert_eq!(out.len(), self.image_len());
        out
    }

    /// Loads an image written by [`PackedTree::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let h = Header::read(bytes)?;
        h.storage.validate()?;
        let layout = ShiftLayout::from_widths(h.budget, h.storage.capacity(), h.widths)?;

        let leads_len = match h.mode {
            ChunkMode::Whole => 0,
            ChunkMode::Firstless => h.nodes,
        };
        let stride = h.storage.stride();
        let needed = [leads_len, h.empties * 4, h.chunks, h.nodes * stride]
            .iter()
            .try_fold(HEADER_LEN, |acc, &n| acc.checked_add(n))
            .ok_or(Error::Corrupt("section sizes overflow"))?;
        if bytes.len() < needed {
            return Err(Error::Truncated {
                needed,
                actual: bytes.len(),
            });
        }
        if bytes.len() > needed {
            return Err(Error::Corrupt("trailing bytes after node array"));
        }

        let mut at = HEADER_LEN;
        let mut take = move |n: usize| {
            let s = &bytes[at..at + n];
            at += n;
            s
        };

        let leads: Box<[u8]> = take(leads_len).into();
        let empties: Box<[u32]> = take(h.empties * 4)
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if empties.windows(2).any(|w| w[0] >= w[1])
            || empties.last().map_or(false, |&e| e as usize >= h.nodes)
        {
            return Err(Error::Corrupt("empty-chunk list not ascending or out of range"));
        }
        let chunks: Box<[u8]> = take(h.chunks).into();
        let nodes = Nodes::from_le_bytes(h.storage, take(h.nodes * stride));

        debug!(nodes = h.nodes, storage = ?h.storage, "loaded packed tree image");
        Ok(Self {
            mode: h.mode,
            storage: h.storage,
            layout,
            leads,
            empties,
            chunks,
            nodes,
        })
    }
}

impl Tree for PackedTree {
    #[inline]
    fn size(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    fn value_of(&self, node: usize) -> Option<u64> {
        match self.fields(node)?.value {
            0 => None,
            v => Some(v - 1),
        }
    }

    fn chunk_of(&self, node: usize) -> Cow<'_, [u8]> {
        let Some(f) = self.fields(node) else {
            return Cow::Borrowed(&[]);
        };
        let body = self.body(&f);
        match self.mode {
            ChunkMode::Whole => Cow::Borrowed(body),
            ChunkMode::Firstless => match self.lead_of(node) {
                None => Cow::Borrowed(&[]),
                Some(lead) => {
                    let mut chunk = Vec::with_capacity(body.len() + 1);
                    chunk.push(lead);
                    chunk.extend_from_slice(body);
                    Cow::Owned(chunk)
                }
            },
        }
    }

    fn each_child(&self, node: usize, visit: &mut dyn FnMut(usize) -> ControlFlow<()>) {
        for c in self.children_range(node) {
            if visit(c).is_break() {
                break;
            }
        }
    }

    fn as_switcher(&self) -> Option<&dyn Switcher> {
        Some(self)
    }
}

impl Switcher for PackedTree {
    /// Binary search over the children of `node`, which are sorted by lead
    /// byte because reindexing sorted every sibling group.
    fn switch_byte(&self, node: usize, byte: u8) -> Option<(usize, &[u8])> {
        let Range { mut start, mut end } = self.children_range(node);
        while start < end {
            let mid = start + (end - start) / 2;
            match self.lead_of(mid).cmp(&Some(byte)) {
                std::cmp::Ordering::Less => start = mid + 1,
                std::cmp::Ordering::Greater => end = mid,
                std::cmp::Ordering::Equal => {
                    let f = self.fields(mid)?;
                    let body = self.body(&f);
                    let rest = match self.mode {
                        ChunkMode::Whole => body.get(1..).unwrap_or(&[]),
                        ChunkMode::Firstless => body,
                    };
                    return Some((mid, rest));
                }
            }
        }
        None
    }
}

impl Footprint for PackedTree {
    /// Exact size of the serialized image.
    fn approximate_size(&self) -> (usize, SizeHint) {
        (self.image_len(), SizeHint::Exact)
    }
}
