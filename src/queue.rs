//! Depth-ordered pending sets shared by depth repair and the evaluation loop.

use std::collections::BTreeSet;

use ahash::AHashMap;

use crate::node::NodeId;

/// A priority set ordered by ascending depth, ties broken by insertion order.
///
/// Supports insert-if-absent and extract-minimum. Re-inserting a queued node
/// at a different depth repositions it; re-inserting at the same depth is a
/// no-op.
#[derive(Debug, Default)]
pub(crate) struct DepthQueue {
    ordered: BTreeSet<(u32, u64, NodeId)>,
    queued: AHashMap<NodeId, (u32, u64)>,
    seq: u64,
}

impl DepthQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues `id` at `depth`. Returns false if it was already queued there.
    pub(crate) fn insert(&mut self, depth: u32, id: NodeId) -> bool {
        if let Some(&(queued_depth, queued_seq)) = self.queued.get(&id) {
            if queued_depth == depth {
                return false;
            }
            self.ordered.remove(&(queued_depth, queued_seq, id));
        }
        let seq = self.seq;
        self.seq += 1;
        self.ordered.insert((depth, seq, id));
        self.queued.insert(id, (depth, seq));
        true
    }

    /// Removes and returns the lowest-depth node.
    pub(crate) fn pop(&mut self) -> Option<(u32, NodeId)> {
        let entry = *self.ordered.iter().next()?;
        self.ordered.remove(&entry);
        let (depth, _, id) = entry;
        self.queued.remove(&id);
        Some((depth, id))
    }

    pub(crate) fn len(&self) -> usize {
        self.ordered.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_ascending_depth_order() {
        let mut queue = DepthQueue::new();
        queue.insert(3, NodeId(0));
        queue.insert(1, NodeId(1));
        queue.insert(2, NodeId(2));
        assert_eq!(queue.pop(), Some((1, NodeId(1))));
        assert_eq!(queue.pop(), Some((2, NodeId(2))));
        assert_eq!(queue.pop(), Some((3, NodeId(0))));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut queue = DepthQueue::new();
        queue.insert(1, NodeId(5));
        queue.insert(1, NodeId(2));
        queue.insert(1, NodeId(9));
        assert_eq!(queue.pop(), Some((1, NodeId(5))));
        assert_eq!(queue.pop(), Some((1, NodeId(2))));
        assert_eq!(queue.pop(), Some((1, NodeId(9))));
    }

    #[test]
    fn reinsert_at_same_depth_is_a_noop() {
        let mut queue = DepthQueue::new();
        assert!(queue.insert(1, NodeId(0)));
        assert!(!queue.insert(1, NodeId(0)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn reinsert_at_new_depth_repositions() {
        let mut queue = DepthQueue::new();
        queue.insert(5, NodeId(0));
        queue.insert(1, NodeId(1));
        assert!(queue.insert(0, NodeId(0)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some((0, NodeId(0))));
        assert_eq!(queue.pop(), Some((1, NodeId(1))));
    }
}
