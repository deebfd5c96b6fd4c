//! Breadth-first reindexing.
//!
//! Nodes are visited in FIFO order starting from the root. Before a node's
//! children are queued they are sorted by the first byte of their chunk, so
//! the new indices of any node's children form one contiguous, ascending
//! block, and every ancestor gets a smaller index than its descendants.
//!
//! Two siblings sharing a first byte break the radix invariant. Reindexing
//! still completes, but binary-search dispatch over the result is unreliable.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::ops::ControlFlow;

use smallvec::SmallVec;

use crate::Tree;

/// A node as seen by the breadth-first pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexedNode<'t> {
    /// Sequential breadth-first index.
    pub index: usize,
    /// Index in the source tree.
    pub original: usize,
    /// Tag returned by the visitor for the parent; 0 for the root.
    pub parent: usize,
    /// Chunk labelling the edge into this node.
    pub chunk: Cow<'t, [u8]>,
    /// Value stored at this node.
    pub value: Option<u64>,
}

/// Walks `tree` breadth-first, handing each node to `visit`.
///
/// The tag `visit` returns is attached to the node's children and shows up as
/// their [`ReindexedNode::parent`]. Returning the node's own `index` gives the
/// usual parent links. Does nothing for an empty tree.
pub fn reindex_with<'t, T, F>(tree: &'t T, mut visit: F)
where
    T: Tree + ?Sized,
    F: FnMut(ReindexedNode<'t>) -> usize,
{
    let size = tree.size();
    if size == 0 {
        return;
    }

    let mut queue: VecDeque<(usize, usize)> = VecDeque::with_capacity(size.min(1024));
    queue.push_back((0, 0));

    let mut children: SmallVec<[(Option<u8>, usize); 8]> = SmallVec::new();
    let mut next = 0usize;

    while let Some((original, parent)) = queue.pop_front() {
        let index = next;
        next += 1;

        let tag = visit(ReindexedNode {
            index,
            original,
            parent,
            chunk: tree.chunk_of(original),
            value: tree.value_of(original),
        });

        children.clear();
        tree.each_child(original, &mut |c| {
            children.push((tree.chunk_of(c).first().copied(), c));
            ControlFlow::Continue(())
        });
        // Stable, so siblings with equal first bytes keep their source order.
        children.sort_by_key(|&(first, _)| first);
        queue.extend(children.iter().map(|&(_, c)| (c, tag)));
    }

    debug_assert_eq!(next, size, "tree size disagrees with reachable nodes");
}

/// Collects the breadth-first pass with each node's parent set to its
/// parent's new index.
pub fn reindex<T: Tree + ?Sized>(tree: &T) -> Vec<ReindexedNode<'_>> {
    let mut out = Vec::with_capacity(tree.size());
    reindex_with(tree, |node| {
        let index = node.index;
        out.push(node);
        index
    });
    out
}
