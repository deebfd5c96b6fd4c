//! Byte-at-a-time matching over any [`Tree`].
//!
//! The automaton is either alive at some node with a (possibly empty)
//! remaining chunk suffix, or dead. While the suffix is non-empty each byte
//! must match its head. Once it is exhausted the next byte selects a child:
//! by binary search when the tree is a [`Switcher`], otherwise by scanning
//! `each_child` for a chunk starting with that byte.

use std::borrow::Cow;
use std::ops::ControlFlow;

use crate::{Switcher, Tree};

enum State<'t> {
    Alive {
        node: usize,
        chunk: Cow<'t, [u8]>,
        /// Bytes of `chunk` already matched.
        offset: usize,
    },
    Dead,
}

/// Incremental key matcher over a borrowed tree.
///
/// Each matcher owns its own state; any number of them may run over the same
/// tree at once.
pub struct Matcher<'t, T: Tree + ?Sized> {
    tree: &'t T,
    switcher: Option<&'t dyn Switcher>,
    state: State<'t>,
}

impl<'t, T: Tree + ?Sized> Matcher<'t, T> {
    /// Matcher positioned at the root of `tree`.
    pub fn new(tree: &'t T) -> Self {
        let mut m = Self {
            tree,
            switcher: tree.as_switcher(),
            state: State::Dead,
        };
        m.reset();
        m
    }

    /// Returns to the initial state.
    pub fn reset(&mut self) {
        self.state = if self.tree.size() == 0 {
            State::Dead
        } else {
            State::Alive {
                node: 0,
                chunk: self.tree.chunk_of(0),
                offset: 0,
            }
        };
    }

    /// Consumes one byte. Returns false once the input can no longer be a
    /// prefix of any stored key; the matcher then stays dead until `reset`.
    pub fn feed(&mut self, byte: u8) -> bool {
        let State::Alive { node, chunk, offset } = &mut self.state else {
            return false;
        };

        if let Some(&expected) = chunk.get(*offset) {
            if expected == byte {
                *offset += 1;
                return true;
            }
            self.state = State::Dead;
            return false;
        }

        let node = *node;
        let next = match self.switcher {
            Some(s) => s
                .switch_byte(node, byte)
                .map(|(child, rest)| (child, Cow::Borrowed(rest), 0)),
            None => scan_children(self.tree, node, byte).map(|(child, chunk)| (child, chunk, 1)),
        };

        match next {
            Some((node, chunk, offset)) => {
                self.state = State::Alive { node, chunk, offset };
                true
            }
            None => {
                self.state = State::Dead;
                false
            }
        }
    }

    /// Feeds every byte of `bytes`, stopping at the first mismatch.
    pub fn feed_all(&mut self, bytes: &[u8]) -> bool {
        bytes.iter().all(|&b| self.feed(b))
    }

    /// Returns true if the bytes fed so far form a stored key.
    pub fn found(&self) -> bool {
        match &self.state {
            State::Alive { node, chunk, offset } => {
                *offset == chunk.len() && self.tree.value_of(*node).is_some()
            }
            State::Dead => false,
        }
    }

    /// Value of the key fed so far, if it is stored.
    pub fn value(&self) -> Option<u64> {
        match &self.state {
            State::Alive { node, chunk, offset } if *offset == chunk.len() => {
                self.tree.value_of(*node)
            }
            _ => None,
        }
    }

    /// Current node, while alive.
    pub fn node(&self) -> Option<usize> {
        match self.state {
            State::Alive { node, .. } => Some(node),
            State::Dead => None,
        }
    }

    /// Returns true unless a byte has failed to match.
    pub fn is_alive(&self) -> bool {
        matches!(self.state, State::Alive { .. })
    }
}

fn scan_children<'t, T: Tree + ?Sized>(
    tree: &'t T,
    node: usize,
    byte: u8,
) -> Option<(usize, Cow<'t, [u8]>)> {
    let mut hit = None;
    tree.each_child(node, &mut |c| {
        let chunk = tree.chunk_of(c);
        if chunk.first() == Some(&byte) {
            hit = Some((c, chunk));
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    hit
}

/// Value stored under `key` in `tree`.
pub fn get<T: Tree + ?Sized>(tree: &T, key: impl AsRef<[u8]>) -> Option<u64> {
    let mut m = Matcher::new(tree);
    if m.feed_all(key.as_ref()) {
        m.value()
    } else {
        None
    }
}

/// Returns true if `key` is stored in `tree`.
pub fn contains<T: Tree + ?Sized>(tree: &T, key: impl AsRef<[u8]>) -> bool {
    get(tree, key).is_some()
}
