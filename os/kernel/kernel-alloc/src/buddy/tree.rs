//! # Block Tree
//!
//! The implicit complete binary tree behind the buddy allocator, stored as
//! one state byte per node in a flat slice (index 0 is the root).
//!
//! ```text
//! depth 0            0                 order = max_order
//! depth 1      1           2
//! depth 2   3     4     5     6
//!          ...
//! ```
//!
//! - children of `i`: `2i + 1` (left), `2i + 2` (right)
//! - parent of `i`: `(i - 1) / 2`
//! - depth of `i`: `floor(log2(i + 1))`, order `max_order - depth`
//!
//! A node's state is always the aggregate of its children
//! (`Free + Free → Free`, `Full + Full → Full`, otherwise `Partial`), except
//! for nodes handed out as blocks: those are `Full` while their subtree stays
//! `Free`. Freeing a block and re-aggregating the ancestors is all the
//! coalescing there is.

use super::BuddyError;
use log::trace;

/// State of one tree node.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum NodeState {
    /// The whole subtree is available.
    #[default]
    Free = 0,
    /// Some but not all of the subtree is in use.
    Partial = 1,
    /// The whole subtree is in use, either as one block or through its children.
    Full = 2,
}

impl NodeState {
    #[inline]
    const fn aggregate(left: Self, right: Self) -> Self {
        match (left, right) {
            (Self::Free, Self::Free) => Self::Free,
            (Self::Full, Self::Full) => Self::Full,
            _ => Self::Partial,
        }
    }
}

/// Number of nodes of a tree whose root has order `max_order`.
#[inline]
#[must_use]
pub const fn node_count(max_order: u8) -> usize {
    (2 << max_order) - 1
}

#[inline]
const fn depth(index: usize) -> u32 {
    (index + 1).ilog2()
}

#[inline]
const fn left(index: usize) -> usize {
    2 * index + 1
}

#[inline]
const fn parent(index: usize) -> usize {
    (index - 1) / 2
}

#[inline]
const fn is_left(index: usize) -> bool {
    index % 2 == 1
}

/// The buddy of a non-root node.
#[inline]
#[must_use]
pub const fn buddy(index: usize) -> usize {
    if is_left(index) { index + 1 } else { index - 1 }
}

/// The state array plus the bookkeeping derived from it.
pub struct BlockTree<'s> {
    states: &'s mut [NodeState],
    max_order: u8,
    allocated_pages: usize,
}

impl<'s> BlockTree<'s> {
    /// Build an all-free tree with root order `max_order` over `states`.
    ///
    /// # Errors
    /// [`BuddyError::MetadataTooSmall`] if `states` holds fewer than
    /// [`node_count(max_order)`](node_count) entries.
    pub fn new(states: &'s mut [NodeState], max_order: u8) -> Result<Self, BuddyError> {
        let needed = node_count(max_order);
        let got = states.len();
        let Some(states) = states.get_mut(..needed) else {
            return Err(BuddyError::MetadataTooSmall { needed, got });
        };
        states.fill(NodeState::Free);
        Ok(Self {
            states,
            max_order,
            allocated_pages: 0,
        })
    }

    #[inline]
    #[must_use]
    pub const fn max_order(&self) -> u8 {
        self.max_order
    }

    /// Pages currently handed out through [`allocate`](Self::allocate).
    #[inline]
    #[must_use]
    pub const fn allocated_pages(&self) -> usize {
        self.allocated_pages
    }

    #[inline]
    #[must_use]
    pub fn state(&self, index: usize) -> Option<NodeState> {
        self.states.get(index).copied()
    }

    /// Order of the block tracked by `index`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn order_of_node(&self, index: usize) -> u8 {
        self.max_order - depth(index) as u8
    }

    /// Position of `index` among the nodes of its order, counted from the left.
    #[inline]
    #[must_use]
    pub const fn position_in_order(index: usize) -> usize {
        index + 1 - (1 << depth(index))
    }

    /// Node index of the `position`-th block of `order`.
    #[inline]
    #[must_use]
    pub const fn node_at(&self, order: u8, position: usize) -> usize {
        (1 << (self.max_order - order)) - 1 + position
    }

    /// Whether `index` is a block handed out as a whole.
    ///
    /// Such a node is `Full` while its children are still `Free`; a node that
    /// is `Full` through its children is not a block of its own.
    #[must_use]
    pub fn is_allocated(&self, index: usize) -> bool {
        match self.state(index) {
            Some(NodeState::Full) => self
                .state(left(index))
                .is_none_or(|child| child == NodeState::Free),
            _ => false,
        }
    }

    /// Leftmost node of `order` whose subtree is free, found by a left-first
    /// depth-first walk that never enters `Full` subtrees.
    ///
    /// Backtracks out of dead ends, so it succeeds whenever a descent that
    /// retries the right buddy once would, and picks the same node then.
    fn find_free(&self, order: u8) -> Option<usize> {
        let target = u32::from(self.max_order - order);
        let mut index = 0;
        loop {
            let state = self.states[index];
            let descend = if depth(index) == target {
                if state == NodeState::Free {
                    return Some(index);
                }
                false
            } else {
                state != NodeState::Full
            };

            if descend {
                index = left(index);
                continue;
            }

            // next candidate: the right sibling of the nearest left-child ancestor
            loop {
                if index == 0 {
                    return None;
                }
                if is_left(index) {
                    index += 1;
                    break;
                }
                index = parent(index);
            }
        }
    }

    /// Set `index` directly and re-aggregate its ancestors.
    fn set_state(&mut self, mut index: usize, state: NodeState) {
        self.states[index] = state;
        while index != 0 {
            let p = parent(index);
            let l = left(p);
            let aggregate = NodeState::aggregate(self.states[l], self.states[l + 1]);
            if self.states[p] == aggregate {
                break;
            }
            self.states[p] = aggregate;
            index = p;
        }
    }

    /// Take the leftmost free block of `order` and return its node index.
    ///
    /// # Errors
    /// - [`BuddyError::OrderTooLarge`] if `order` exceeds the root order.
    /// - [`BuddyError::OutOfMemory`] if no free block of `order` exists.
    pub fn allocate(&mut self, order: u8) -> Result<usize, BuddyError> {
        if order > self.max_order {
            return Err(BuddyError::OrderTooLarge {
                order,
                max_order: self.max_order,
            });
        }
        let index = self
            .find_free(order)
            .ok_or(BuddyError::OutOfMemory { order })?;
        self.set_state(index, NodeState::Full);
        self.allocated_pages += 1 << order;
        trace!("block tree: node {index} (order {order}) taken");
        Ok(index)
    }

    /// Mark the `position`-th block of `order` as permanently in use without
    /// counting it as allocated.
    pub(super) fn reserve(&mut self, order: u8, position: usize) {
        let index = self.node_at(order, position);
        self.set_state(index, NodeState::Full);
    }

    /// Release the block at `index` and return its order.
    ///
    /// # Errors
    /// - [`BuddyError::InvalidBlock`] if `index` is outside the tree.
    /// - [`BuddyError::NotAllocated`] if `index` is not a block currently
    ///   handed out; the tree is left untouched.
    pub fn free(&mut self, index: usize) -> Result<u8, BuddyError> {
        if index >= self.states.len() {
            return Err(BuddyError::InvalidBlock { index });
        }
        if !self.is_allocated(index) {
            return Err(BuddyError::NotAllocated { index });
        }
        let order = self.order_of_node(index);
        self.set_state(index, NodeState::Free);
        self.allocated_pages -= 1 << order;
        trace!("block tree: node {index} (order {order}) released");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(states: &mut Vec<NodeState>, max_order: u8) -> BlockTree<'_> {
        states.resize(node_count(max_order), NodeState::Full);
        BlockTree::new(states, max_order).unwrap()
    }

    #[test]
    fn index_arithmetic() {
        assert_eq!(node_count(3), 15);
        assert_eq!(depth(0), 0);
        assert_eq!(depth(2), 1);
        assert_eq!(depth(7), 3);
        assert_eq!(buddy(3), 4);
        assert_eq!(buddy(4), 3);
        assert_eq!(parent(4), 1);
        assert_eq!(BlockTree::position_in_order(9), 2);
    }

    #[test]
    fn new_resets_stale_states() {
        let mut states = Vec::new();
        let t = tree(&mut states, 2);
        assert!((0..node_count(2)).all(|i| t.state(i) == Some(NodeState::Free)));
    }

    #[test]
    fn rejects_short_metadata() {
        let mut states = vec![NodeState::Free; 6];
        assert_eq!(
            BlockTree::new(&mut states, 2).err(),
            Some(BuddyError::MetadataTooSmall { needed: 7, got: 6 })
        );
    }

    #[test]
    fn leaves_are_handed_out_left_to_right() {
        let mut states = Vec::new();
        let mut t = tree(&mut states, 3);
        let got: Vec<_> = (0..8).map(|_| t.allocate(0).unwrap()).collect();
        assert_eq!(got, (7..15).collect::<Vec<_>>());
        assert_eq!(t.allocate(0), Err(BuddyError::OutOfMemory { order: 0 }));
        assert_eq!(t.state(0), Some(NodeState::Full));
    }

    #[test]
    fn ancestors_aggregate() {
        let mut states = Vec::new();
        let mut t = tree(&mut states, 2);
        let a = t.allocate(0).unwrap();
        assert_eq!(t.state(1), Some(NodeState::Partial));
        assert_eq!(t.state(0), Some(NodeState::Partial));
        let b = t.allocate(0).unwrap();
        assert_eq!(t.state(1), Some(NodeState::Full));
        t.free(a).unwrap();
        t.free(b).unwrap();
        assert_eq!(t.state(1), Some(NodeState::Free));
        assert_eq!(t.state(0), Some(NodeState::Free));
    }

    #[test]
    fn holes_are_found_left_to_right() {
        let mut states = Vec::new();
        let mut t = tree(&mut states, 2);
        // leaves: [x x][x .] then release the first pair's right leaf: [x .][x .]
        let l0 = t.allocate(0).unwrap();
        let l1 = t.allocate(0).unwrap();
        let l2 = t.allocate(0).unwrap();
        assert_eq!((l0, l1, l2), (3, 4, 5));
        t.free(l1).unwrap();

        // order 1: both halves are partial, nothing fits
        assert_eq!(t.allocate(1), Err(BuddyError::OutOfMemory { order: 1 }));
        // order 0: leftmost hole first, then the one in the right half
        assert_eq!(t.allocate(0), Ok(4));
        assert_eq!(t.allocate(0), Ok(6));
    }

    #[test]
    fn search_continues_past_a_partial_buddy() {
        let mut states = Vec::new();
        let mut t = tree(&mut states, 3);
        // leaves [x x][x .][. .][. .]: the first quarter is full, its buddy partial
        for _ in 0..3 {
            t.allocate(0).unwrap();
        }
        assert_eq!(t.allocate(1), Ok(5));
        assert_eq!(t.allocate(2), Err(BuddyError::OutOfMemory { order: 2 }));
    }

    #[test]
    fn aggregate_full_node_is_not_a_block() {
        let mut states = Vec::new();
        let mut t = tree(&mut states, 1);
        t.allocate(0).unwrap();
        t.allocate(0).unwrap();
        assert_eq!(t.state(0), Some(NodeState::Full));
        assert_eq!(t.free(0), Err(BuddyError::NotAllocated { index: 0 }));
        assert_eq!(t.free(2), Ok(0));
        assert_eq!(t.free(2), Err(BuddyError::NotAllocated { index: 2 }));
        assert_eq!(t.free(3), Err(BuddyError::InvalidBlock { index: 3 }));
        assert_eq!(t.allocated_pages(), 1);
    }

    #[test]
    fn reserved_blocks_are_skipped_but_not_counted() {
        let mut states = Vec::new();
        let mut t = tree(&mut states, 2);
        t.reserve(1, 0);
        assert_eq!(t.allocated_pages(), 0);
        assert_eq!(t.allocate(1), Ok(2));
        assert_eq!(t.allocate(0), Err(BuddyError::OutOfMemory { order: 0 }));
    }

    #[test]
    fn order_too_large() {
        let mut states = Vec::new();
        let mut t = tree(&mut states, 2);
        assert_eq!(
            t.allocate(3),
            Err(BuddyError::OrderTooLarge {
                order: 3,
                max_order: 2
            })
        );
    }
}
