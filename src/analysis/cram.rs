//! Chunk cramming: deduplicating chunk bytes into one shared buffer.
//!
//! Chunks are processed longest first, ties broken lexicographically. Each one
//! is looked up as a contiguous substring of the buffer built so far and only
//! appended when it is not already there. This is a greedy heuristic, not a
//! shortest-common-superstring solver: it never merges overlapping ends of two
//! chunks, it only reuses whole occurrences.
//!
//! The output depends only on the multiset of chunks, never on the order they
//! were handed in.

use std::cmp::Reverse;

use tracing::debug;

/// Shared chunk buffer plus the offset of every input chunk in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Crammed {
    /// Deduplicated chunk bytes.
    pub buffer: Vec<u8>,
    /// `positions[i]` is where input chunk `i` starts in `buffer`.
    pub positions: Vec<usize>,
}

impl Crammed {
    /// Bytes of chunk `i`, given its length. Out-of-range requests give an
    /// empty slice.
    pub fn slice(&self, i: usize, len: usize) -> &[u8] {
        self.positions
            .get(i)
            .and_then(|&pos| self.buffer.get(pos..pos.checked_add(len)?))
            .unwrap_or(&[])
    }
}

#[inline]
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Crams `chunks` into one buffer.
pub fn cram<C: AsRef<[u8]>>(chunks: &[C]) -> Crammed {
    let mut order: Vec<usize> = (0..chunks.len()).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (chunks[a].as_ref(), chunks[b].as_ref());
        (Reverse(a.len()), a).cmp(&(Reverse(b.len()), b))
    });

    let mut buffer: Vec<u8> = Vec::new();
    let mut positions = vec![0usize; chunks.len()];
    let mut prev: Option<usize> = None;

    for &i in &order {
        let chunk = chunks[i].as_ref();
        // Identical chunks are adjacent after sorting.
        if let Some(p) = prev.filter(|&p| chunks[p].as_ref() == chunk) {
            positions[i] = positions[p];
            prev = Some(i);
            continue;
        }
        positions[i] = match find(&buffer, chunk) {
            Some(pos) => pos,
            None => {
                let pos = buffer.len();
                buffer.extend_from_slice(chunk);
                pos
            }
        };
        prev = Some(i);
    }

    let raw: usize = chunks.iter().map(|c| c.as_ref().len()).sum();
    debug!(
        chunks = chunks.len(),
        raw_bytes = raw,
        crammed_bytes = buffer.len(),
        "crammed chunks"
    );

    Crammed { buffer, positions }
}
