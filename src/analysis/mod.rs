//! Structural analysis of a radix tree.
//!
//! One breadth-first pass (see [`reindex`](crate::reindex)) produces a
//! [`NodeRecord`] per node, indexed by the new breadth-first index, together
//! with the global [`Stats`] that size every bit field of a packed node.
//! Afterwards all chunks are crammed into a single shared buffer.
//!
//! In [`ChunkMode::Firstless`] the first byte of every chunk is kept out of
//! the shared buffer, because representations that store it separately use it
//! as a dispatch key. Both modes go through the same statistics code; the only
//! difference is how many leading bytes are peeled off each chunk.

pub mod cram;

use std::ops::Range;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::reindex::reindex_with;
use crate::Tree;

pub use cram::{cram, Crammed};

/// How chunks are stored in the shared buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChunkMode {
    /// Chunks are stored whole.
    #[default]
    Whole,
    /// Chunks are stored without their first byte, which is kept per node.
    Firstless,
}

impl ChunkMode {
    /// Bytes of every chunk consumed before the stored body.
    #[inline]
    pub const fn lead_bytes(self) -> usize {
        match self {
            ChunkMode::Whole => 0,
            ChunkMode::Firstless => 1,
        }
    }
}

/// Everything the packer needs to know about one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Stored value.
    pub value: Option<u64>,
    /// First byte of the full chunk, `None` if the chunk is empty.
    pub lead: Option<u8>,
    /// Chunk bytes as they go into the shared buffer.
    pub chunk: SmallVec<[u8; 16]>,
    /// Breadth-first index of the parent (0 for the root).
    pub parent: usize,
    /// Breadth-first indices of the children.
    pub children: Range<usize>,
    /// Offset of `chunk` in the crammed buffer.
    pub chunk_pos: usize,
}

impl NodeRecord {
    /// Returns true if the full chunk is empty.
    #[inline]
    pub fn chunk_is_empty(&self) -> bool {
        self.lead.is_none()
    }

    /// Number of children.
    #[inline]
    pub fn children_count(&self) -> usize {
        self.children.len()
    }
}

/// Global statistics used to size the bit fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Longest stored chunk (after peeling the lead byte in firstless mode).
    pub max_chunk_len: usize,
    /// Most children of any node.
    pub max_children: usize,
    /// Largest `first_child - parent` over all nodes with children.
    pub max_child_delta: usize,
    /// Largest stored value.
    pub max_value: u64,
}

/// Output of [`Analyzer::analyze`]. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    mode: ChunkMode,
    crammed: Vec<u8>,
    stats: Stats,
    records: Vec<NodeRecord>,
}

impl Analysis {
    /// Chunk storage mode used.
    pub fn mode(&self) -> ChunkMode {
        self.mode
    }

    /// Shared, deduplicated chunk buffer.
    pub fn crammed(&self) -> &[u8] {
        &self.crammed
    }

    /// Sizing statistics.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Per-node records, by breadth-first index.
    pub fn records(&self) -> &[NodeRecord] {
        &self.records
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the analyzed tree was empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The stored chunk of node `i`, read back from the crammed buffer.
    pub fn stored_chunk(&self, i: usize) -> &[u8] {
        self.records
            .get(i)
            .and_then(|r| self.crammed.get(r.chunk_pos..r.chunk_pos + r.chunk.len()))
            .unwrap_or(&[])
    }
}

/// Computes an [`Analysis`] for any [`Tree`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Analyzer {
    mode: ChunkMode,
}

impl Analyzer {
    /// Analyzer for the given chunk mode.
    pub fn new(mode: ChunkMode) -> Self {
        Self { mode }
    }

    /// Analyzer that peels off the first byte of every chunk.
    pub fn firstless() -> Self {
        Self::new(ChunkMode::Firstless)
    }

    /// Runs the breadth-first pass, collects statistics and crams chunks.
    pub fn analyze<T: Tree + ?Sized>(&self, tree: &T) -> Analysis {
        let skip = self.mode.lead_bytes();
        let mut records: Vec<NodeRecord> = Vec::with_capacity(tree.size());
        let mut stats = Stats::default();

        reindex_with(tree, |node| {
            let i = node.index;
            let full = node.chunk.as_ref();
            let body = &full[skip.min(full.len())..];

            stats.max_chunk_len = stats.max_chunk_len.max(body.len());
            if let Some(v) = node.value {
                stats.max_value = stats.max_value.max(v);
            }

            if i > 0 {
                let parent = &mut records[node.parent];
                if parent.children.is_empty() {
                    parent.children = i..i + 1;
                    stats.max_child_delta = stats.max_child_delta.max(i - node.parent);
                } else {
                    debug_assert_eq!(parent.children.end, i, "siblings must be contiguous");
                    parent.children.end = i + 1;
                }
                stats.max_children = stats.max_children.max(parent.children.len());
            }

            trace!(index = i, original = node.original, parent = node.parent, "analyzed node");

            records.push(NodeRecord {
                value: node.value,
                lead: full.first().copied(),
                chunk: SmallVec::from_slice(body),
                parent: node.parent,
                children: 0..0,
                chunk_pos: 0,
            });
            i
        });

        let crammed = cram(&records.iter().map(|r| r.chunk.as_slice()).collect::<Vec<_>>());
        for (r, &pos) in records.iter_mut().zip(&crammed.positions) {
            r.chunk_pos = pos;
        }

        debug!(
            nodes = records.len(),
            mode = ?self.mode,
            max_chunk_len = stats.max_chunk_len,
            max_children = stats.max_children,
            max_child_delta = stats.max_child_delta,
            max_value = stats.max_value,
            crammed_bytes = crammed.buffer.len(),
            "analysis complete"
        );

        Analysis {
            mode: self.mode,
            crammed: crammed.buffer,
            stats,
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmptyTree, RadixBuilder};

    fn headers() -> RadixBuilder {
        [
            ("auth", 4u64),
            ("author", 2),
            ("authentication", 3),
            ("authorization", 1),
            ("authority", 0),
            ("content-type", 5),
            ("content-length", 6),
            ("content-disposition", 7),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_empty() {
        let a = Analyzer::default().analyze(&EmptyTree);
        assert!(a.is_empty());
        assert!(a.crammed().is_empty());
        assert_eq!(*a.stats(), Stats::default());
    }

    #[test]
    fn test_single_root() {
        let mut b = RadixBuilder::new();
        b.insert(b"", 9);
        let a = Analyzer::default().analyze(&b);
        assert_eq!(a.len(), 1);
        assert_eq!(a.records()[0].value, Some(9));
        assert!(a.records()[0].chunk_is_empty());
        assert_eq!(a.records()[0].children, 0..0);
        assert_eq!(a.stats().max_value, 9);
        assert_eq!(a.stats().max_children, 0);
    }

    #[test]
    fn test_headers_stats() {
        let b = headers();
        let a = Analyzer::default().analyze(&b);
        assert_eq!(a.len(), b.size());

        let s = a.stats();
        assert_eq!(s.max_value, 7);
        // "content-" has "disposition", "length" and "type"
        assert_eq!(s.max_children, 3);
        assert_eq!(s.max_chunk_len, "disposition".len());

        let raw: usize = a.records().iter().map(|r| r.chunk.len()).sum();
        assert!(a.crammed().len() < raw, "cramming should save bytes");

        for (i, r) in a.records().iter().enumerate() {
            assert_eq!(a.stored_chunk(i), r.chunk.as_slice());
            for c in r.children.clone() {
                assert_eq!(a.records()[c].parent, i);
            }
            if !r.children.is_empty() {
                assert!(r.children.start > i);
                assert!(r.children.start - i <= s.max_child_delta);
            }
        }
    }

    #[test]
    fn test_firstless_peels_lead_byte() {
        let b = headers();
        let whole = Analyzer::default().analyze(&b);
        let firstless = Analyzer::firstless().analyze(&b);
        assert_eq!(firstless.mode(), ChunkMode::Firstless);
        assert_eq!(
            firstless.stats().max_chunk_len + 1,
            whole.stats().max_chunk_len
        );

        for (w, f) in whole.records().iter().zip(firstless.records()) {
            assert_eq!(w.lead, f.lead);
            assert_eq!(w.children, f.children);
            match w.lead {
                Some(lead) => {
                    assert_eq!(w.chunk[0], lead);
                    assert_eq!(&w.chunk[1..], f.chunk.as_slice());
                }
                None => assert!(f.chunk.is_empty()),
            }
        }
    }

    #[test]
    fn test_stored_chunk_out_of_range_is_empty() {
        let a = Analyzer::default().analyze(&headers());
        assert!(a.stored_chunk(a.len()).is_empty());
        assert!(Analyzer::default().analyze(&crate::EmptyTree).stored_chunk(0).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let b = headers();
        let a1 = Analyzer::default().analyze(&b);
        let a2 = Analyzer::default().analyze(&b);
        assert_eq!(a1, a2);
    }

    #[test]
    fn test_concurrent_analyses_agree() {
        let b = headers();
        let expected = Analyzer::default().analyze(&b);
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| Analyzer::default().analyze(&b)))
                .collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), expected);
            }
        });
    }
}
