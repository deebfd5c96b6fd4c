//! # radix-cram
//!
//! Compacts radix trees into minimal, lookup-optimized bit-packed encodings.
//!
//! The pipeline is:
//!
//! 1. [`reindex()`]: breadth-first renumbering so that the children of every
//!    node occupy one contiguous index range, sorted by the first byte of
//!    their chunks.
//! 2. [`Analyzer`]: per-node records, the global statistics that size each bit
//!    field, and chunk cramming into one shared byte buffer.
//! 3. [`ShiftLayout`]: the minimal-width shift table for a given bit budget.
//! 4. [`PackedTree`]: one fixed-width word per node, readable through the same
//!    [`Tree`] capability as its input.
//! 5. [`Matcher`]: a byte-at-a-time automaton over any [`Tree`], using binary
//!    search dispatch when the tree is also a [`Switcher`].
//!
//! ## Example
//!
//! ```rust
//! use radix_cram::{compact, Config, Matcher, RadixBuilder, Tree};
//!
//! let mut builder = RadixBuilder::new();
//! builder.insert(b"author", 2);
//! builder.insert(b"authority", 0);
//! builder.insert(b"content-type", 5);
//!
//! let packed = compact(&builder, &Config::default()).unwrap();
//! assert_eq!(packed.size(), builder.size());
//!
//! let mut m = Matcher::new(&packed);
//! assert!(m.feed_all(b"author"));
//! assert!(m.found());
//! assert_eq!(m.value(), Some(2));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod bits;
pub mod builder;
pub mod error;
pub mod layout;
pub mod lookup;
pub mod packed;
pub mod reindex;

pub use analysis::{Analysis, Analyzer, ChunkMode, NodeRecord, Stats};
pub use builder::RadixBuilder;
pub use error::{Error, Result};
pub use layout::{Field, PackedFields, ShiftLayout, Widths};
pub use lookup::{contains, get, Matcher};
pub use packed::{NodeStorage, PackedTree, WordWidth};
pub use reindex::{reindex, reindex_with, ReindexedNode};

use std::borrow::Cow;
use std::ops::ControlFlow;

// =============================================================================
// Capabilities
// =============================================================================

/// Read access to a radix tree addressed by node index.
///
/// Index 0 is the root whenever `size() > 0`. For any node with two or more
/// children, no two child chunks may start with the same byte. That invariant
/// is assumed, never checked.
pub trait Tree {
    /// Number of nodes.
    fn size(&self) -> usize;

    /// Value stored at `node`, or `None` if it has none or is out of range.
    fn value_of(&self, node: usize) -> Option<u64>;

    /// Chunk labelling the edge into `node`; empty if out of range.
    fn chunk_of(&self, node: usize) -> Cow<'_, [u8]>;

    /// Calls `visit` once per child of `node`, stopping on `Break`.
    fn each_child(&self, node: usize, visit: &mut dyn FnMut(usize) -> ControlFlow<()>);

    /// The accelerated dispatch capability, if this tree has one.
    fn as_switcher(&self) -> Option<&dyn Switcher> {
        None
    }
}

/// Sorted-children dispatch by first byte.
pub trait Switcher {
    /// Child of `node` whose chunk starts with `byte`, with the rest of that
    /// chunk after `byte`.
    fn switch_byte(&self, node: usize, byte: u8) -> Option<(usize, &[u8])>;
}

/// Whether a reported footprint is exact or a lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeHint {
    /// The byte count is exact.
    Exact,
    /// The structure uses at least this many bytes.
    AtLeast,
}

/// Memory footprint reporting, for diagnostics and benchmarks.
pub trait Footprint {
    /// Approximate number of bytes used.
    fn approximate_size(&self) -> (usize, SizeHint);
}

impl<T: Tree + ?Sized> Tree for &T {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn value_of(&self, node: usize) -> Option<u64> {
        (**self).value_of(node)
    }

    fn chunk_of(&self, node: usize) -> Cow<'_, [u8]> {
        (**self).chunk_of(node)
    }

    fn each_child(&self, node: usize, visit: &mut dyn FnMut(usize) -> ControlFlow<()>) {
        (**self).each_child(node, visit)
    }

    fn as_switcher(&self) -> Option<&dyn Switcher> {
        (**self).as_switcher()
    }
}

impl<T: Tree + ?Sized> Tree for Box<T> {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn value_of(&self, node: usize) -> Option<u64> {
        (**self).value_of(node)
    }

    fn chunk_of(&self, node: usize) -> Cow<'_, [u8]> {
        (**self).chunk_of(node)
    }

    fn each_child(&self, node: usize, visit: &mut dyn FnMut(usize) -> ControlFlow<()>) {
        (**self).each_child(node, visit)
    }

    fn as_switcher(&self) -> Option<&dyn Switcher> {
        (**self).as_switcher()
    }
}

/// A tree with no nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyTree;

impl Tree for EmptyTree {
    fn size(&self) -> usize {
        0
    }

    fn value_of(&self, _node: usize) -> Option<u64> {
        None
    }

    fn chunk_of(&self, _node: usize) -> Cow<'_, [u8]> {
        Cow::Borrowed(&[])
    }

    fn each_child(&self, _node: usize, _visit: &mut dyn FnMut(usize) -> ControlFlow<()>) {}
}

impl Footprint for EmptyTree {
    fn approximate_size(&self) -> (usize, SizeHint) {
        (0, SizeHint::Exact)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Options for [`compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Whether chunks keep their first byte in the shared buffer.
    pub mode: ChunkMode,
    /// How packed words are stored.
    pub storage: NodeStorage,
    /// Bits per node; `None` uses the whole storage capacity.
    pub bit_budget: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ChunkMode::Whole,
            storage: NodeStorage::InlineWord(WordWidth::W64),
            bit_budget: None,
        }
    }
}

/// Analyzes `tree` and packs it according to `config`.
pub fn compact<T: Tree + ?Sized>(tree: &T, config: &Config) -> Result<PackedTree> {
    let analysis = Analyzer::new(config.mode).analyze(tree);
    let budget = config
        .bit_budget
        .unwrap_or_else(|| config.storage.capacity());
    PackedTree::build(&analysis, config.storage, budget)
}


#[cfg(test)]
mod proptests;
