//! Mutable radix tree built by incremental insertion.
//!
//! This is the unoptimized input to the compaction pipeline. Nodes are kept in
//! insertion order and children are listed in the order they were created, so
//! nothing here is sorted; [`reindex`](crate::reindex::reindex) takes care of that.

use std::borrow::Cow;
use std::ops::ControlFlow;

use smallvec::SmallVec;

use crate::{Footprint, SizeHint, Tree};

#[derive(Clone, Debug, Default)]
struct BuilderNode {
    chunk: Vec<u8>,
    value: Option<u64>,
    children: SmallVec<[usize; 4]>,
}

/// Radix tree under construction. The root always has an empty chunk.
#[derive(Clone, Debug, Default)]
pub struct RadixBuilder {
    nodes: Vec<BuilderNode>,
    len: usize,
}

#[inline]
fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

impl RadixBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no key has been inserted.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert `key`, returning the value it replaced.
    pub fn insert(&mut self, key: impl AsRef<[u8]>, value: u64) -> Option<u64> {
        let mut rest = key.as_ref();
        if self.nodes.is_empty() {
            self.nodes.push(BuilderNode::default());
        }

        let mut cur = 0usize;
        loop {
            let Some(&first) = rest.first() else {
                let old = self.nodes[cur].value.replace(value);
                if old.is_none() {
                    self.len += 1;
                }
                return old;
            };

            let found = self.nodes[cur]
                .children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].chunk.first() == Some(&first));

            let Some(child) = found else {
                let idx = self.nodes.len();
                self.nodes.push(BuilderNode {
                    chunk: rest.to_vec(),
                    value: Some(value),
                    children: SmallVec::new(),
                });
                self.nodes[cur].children.push(idx);
                self.len += 1;
                return None;
            };

            let shared = common_prefix_len(&self.nodes[child].chunk, rest);
            if shared < self.nodes[child].chunk.len() {
                self.split(child, shared);
            }
            cur = child;
            rest = &rest[shared..];
        }
    }

    /// Cut the edge into `node` after `at` bytes. `node` keeps its index and
    /// the head of the chunk; a new node takes the tail, the value and the
    /// children.
    fn split(&mut self, node: usize, at: usize) {
        let tail_idx = self.nodes.len();
        let n = &mut self.nodes[node];
        let tail = BuilderNode {
            chunk: n.chunk.split_off(at),
            value: n.value.take(),
            children: std::mem::take(&mut n.children),
        };
        n.children.push(tail_idx);
        self.nodes.push(tail);
    }

    /// Value stored under `key`.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<u64> {
        let mut rest = key.as_ref();
        if self.nodes.is_empty() {
            return None;
        }
        let mut cur = 0usize;
        loop {
            let Some(&first) = rest.first() else {
                return self.nodes[cur].value;
            };
            let child = self.nodes[cur]
                .children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].chunk.first() == Some(&first))?;
            rest = rest.strip_prefix(self.nodes[child].chunk.as_slice())?;
            cur = child;
        }
    }
}

impl<K: AsRef<[u8]>> FromIterator<(K, u64)> for RadixBuilder {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        let mut b = Self::new();
        for (k, v) in iter {
            b.insert(k, v);
        }
        b
    }
}

impl Tree for RadixBuilder {
    fn size(&self) -> usize {
        self.nodes.len()
    }

    fn value_of(&self, node: usize) -> Option<u64> {
        self.nodes.get(node).and_then(|n| n.value)
    }

    fn chunk_of(&self, node: usize) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.nodes.get(node).map_or(&[][..], |n| n.chunk.as_slice()))
    }

    fn each_child(&self, node: usize, visit: &mut dyn FnMut(usize) -> ControlFlow<()>) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        for &c in &n.children {
            if visit(c).is_break() {
                break;
            }
        }
    }
}

impl Footprint for RadixBuilder {
    fn approximate_size(&self) -> (usize, SizeHint) {
        let per_node: usize = self
            .nodes
            .iter()
            .map(|n| {
                n.chunk.capacity()
                    + if n.children.spilled() {
                        n.children.capacity() * std::mem::size_of::<usize>()
                    } else {
                        0
                    }
            })
            .sum();
        (
            self.nodes.capacity() * std::mem::size_of::<BuilderNode>() + per_node,
            SizeHint::AtLeast,
        )
    }
}
