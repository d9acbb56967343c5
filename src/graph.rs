//! Arena-backed dependency graph: links, acyclicity, cached depth.
//!
//! Parent lists are authoritative operand lists fixed when a node is built
//! and rewritten only by the commit layer and the optimizer. Child sets are
//! derived: a staged (illegitimate) node appears in the child sets of other
//! staged parents immediately, but is registered with already-committed
//! parents only when it is legitimized, so an abandoned formula never touches
//! the live graph.

use slab::Slab;

use crate::error::SlateError;
use crate::node::{NodeData, NodeId, NodeKind};
use crate::queue::DepthQueue;

#[derive(Debug, Default)]
pub(crate) struct Graph {
    nodes: Slab<NodeData>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Creates a node with the given operand list.
    ///
    /// Depth is computed from the parents. Child links are registered eagerly
    /// on staged parents, and on committed parents only when the new node is
    /// itself legitimate.
    pub(crate) fn insert(
        &mut self,
        kind: NodeKind,
        parents: Vec<NodeId>,
        legitimate: bool,
    ) -> NodeId {
        let depth = parents
            .iter()
            .map(|p| self.nodes[p.index()].depth)
            .max()
            .map_or(0, |d| d + 1);
        let id = NodeId(self.nodes.insert(NodeData {
            kind,
            parents: parents.clone(),
            children: Vec::new(),
            depth,
            legitimate,
        }));
        for p in parents {
            if !self.nodes[p.index()].legitimate || legitimate {
                self.link_child(p, id);
            }
        }
        id
    }

    /// Deletes a node, scrubbing it from both sides of every link.
    pub(crate) fn remove(&mut self, id: NodeId) {
        if let Some(data) = self.nodes.try_remove(id.index()) {
            for p in data.parents {
                if self.contains(p) {
                    self.unlink_child(p, id);
                }
            }
            for c in data.children {
                if self.contains(c) {
                    self.nodes[c.index()].parents.retain(|p| *p != id);
                    self.repair_depths([c]);
                }
            }
        }
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id.index())
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|(index, _)| NodeId(index)).collect()
    }

    pub(crate) fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub(crate) fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.index()].kind
    }

    pub(crate) fn parents(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].parents
    }

    pub(crate) fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub(crate) fn depth(&self, id: NodeId) -> u32 {
        self.nodes[id.index()].depth
    }

    pub(crate) fn is_legitimate(&self, id: NodeId) -> bool {
        self.nodes[id.index()].legitimate
    }

    pub(crate) fn set_legitimate(&mut self, id: NodeId) {
        self.nodes[id.index()].legitimate = true;
    }

    /// Whether `ancestor` is reachable from `id` by walking parents.
    pub(crate) fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut queue: Vec<NodeId> = self.nodes[id.index()].parents.clone();
        let mut visited = ahash::AHashSet::new();
        while let Some(p) = queue.pop() {
            if p == ancestor {
                return true;
            }
            if visited.insert(p) {
                queue.extend_from_slice(&self.nodes[p.index()].parents);
            }
        }
        false
    }

    /// Registers `children` as dependents of `parent`.
    ///
    /// Fails with [`SlateError::GraphCycle`] if any candidate is already an
    /// ancestor of `parent`, in which case nothing is mutated. Duplicates are
    /// skipped.
    pub(crate) fn add_children(
        &mut self,
        parent: NodeId,
        children: &[NodeId],
    ) -> Result<(), SlateError> {
        for &c in children {
            if c == parent || self.is_ancestor(c, parent) {
                return Err(SlateError::GraphCycle { parent, child: c });
            }
        }
        for &c in children {
            self.link_child(parent, c);
        }
        self.repair_depths(children.iter().copied());
        Ok(())
    }

    /// Replaces the operand list of `child`, fixing child links on both the
    /// dropped and the added parents and repairing depth.
    pub(crate) fn set_parents(&mut self, child: NodeId, new_parents: Vec<NodeId>) {
        let old = std::mem::take(&mut self.nodes[child.index()].parents);
        let child_legit = self.nodes[child.index()].legitimate;
        for &p in &old {
            if !new_parents.contains(&p) && self.contains(p) {
                self.unlink_child(p, child);
            }
        }
        for &p in &new_parents {
            if !old.contains(&p) && (!self.nodes[p.index()].legitimate || child_legit) {
                self.link_child(p, child);
            }
        }
        self.nodes[child.index()].parents = new_parents;
        self.repair_depths([child]);
    }

    /// Replaces every occurrence of `old` in the operand list of `child`
    /// with `new`, preserving positions.
    pub(crate) fn replace_parent(&mut self, child: NodeId, old: NodeId, new: NodeId) {
        let mut parents = self.nodes[child.index()].parents.clone();
        for slot in parents.iter_mut() {
            if *slot == old {
                *slot = new;
            }
        }
        self.set_parents(child, parents);
    }

    /// Recomputes cached depths starting from `seeds`, walking dependents
    /// breadth-first in ascending current depth.
    ///
    /// A node whose recomputed depth equals its cached depth stops the
    /// propagation; a node whose depth changes re-queues its children.
    pub(crate) fn repair_depths(&mut self, seeds: impl IntoIterator<Item = NodeId>) {
        let mut queue = DepthQueue::new();
        for id in seeds {
            if self.contains(id) {
                queue.insert(self.nodes[id.index()].depth, id);
            }
        }
        while let Some((_, id)) = queue.pop() {
            if !self.contains(id) {
                continue;
            }
            let fresh = self.nodes[id.index()]
                .parents
                .iter()
                .map(|p| self.nodes[p.index()].depth)
                .max()
                .map_or(0, |d| d + 1);
            if fresh != self.nodes[id.index()].depth {
                self.nodes[id.index()].depth = fresh;
                let children = self.nodes[id.index()].children.clone();
                for c in children {
                    queue.insert(self.nodes[c.index()].depth, c);
                }
            }
        }
    }

    fn link_child(&mut self, parent: NodeId, child: NodeId) {
        let children = &mut self.nodes[parent.index()].children;
        if !children.contains(&child) {
            children.push(child);
        }
    }

    fn unlink_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.index()].children.retain(|c| *c != child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn input(graph: &mut Graph, value: i64) -> NodeId {
        graph.insert(NodeKind::Input(Value::Int(value)), Vec::new(), true)
    }

    fn func(graph: &mut Graph, parents: Vec<NodeId>) -> NodeId {
        graph.insert(
            NodeKind::Func {
                op: crate::op::OpKind::Sum,
                payload: crate::value::Payload::Value(Value::Int(0)),
            },
            parents,
            true,
        )
    }

    #[test]
    fn depth_is_one_plus_max_parent_depth() {
        let mut graph = Graph::new();
        let a = input(&mut graph, 1);
        let b = input(&mut graph, 2);
        let sum = func(&mut graph, vec![a, b]);
        let outer = func(&mut graph, vec![sum, b]);
        assert_eq!(graph.depth(a), 0);
        assert_eq!(graph.depth(sum), 1);
        assert_eq!(graph.depth(outer), 2);
    }

    #[test]
    fn legitimate_children_are_linked_on_creation() {
        let mut graph = Graph::new();
        let a = input(&mut graph, 1);
        let sum = func(&mut graph, vec![a]);
        assert_eq!(graph.children(a), &[sum]);
    }

    #[test]
    fn staged_children_are_not_linked_on_committed_parents() {
        let mut graph = Graph::new();
        let a = input(&mut graph, 1);
        let staged = graph.insert(
            NodeKind::Func {
                op: crate::op::OpKind::Sum,
                payload: crate::value::Payload::Value(Value::Int(0)),
            },
            vec![a],
            false,
        );
        assert!(graph.children(a).is_empty());
        assert_eq!(graph.parents(staged), &[a]);
    }

    #[test]
    fn cycle_attempts_are_rejected_and_leave_the_graph_unchanged() {
        let mut graph = Graph::new();
        let a = input(&mut graph, 1);
        let b = func(&mut graph, vec![a]);
        let c = func(&mut graph, vec![b]);
        let before = graph.children(c).to_vec();
        let err = graph.add_children(c, &[a]);
        assert_eq!(
            err,
            Err(SlateError::GraphCycle {
                parent: c,
                child: a
            })
        );
        assert_eq!(graph.children(c), before.as_slice());
        let err = graph.add_children(a, &[a]);
        assert!(matches!(err, Err(SlateError::GraphCycle { .. })));
    }

    #[test]
    fn add_children_deduplicates() {
        let mut graph = Graph::new();
        let a = input(&mut graph, 1);
        let s = func(&mut graph, vec![a]);
        graph.add_children(a, &[s]).unwrap();
        graph.add_children(a, &[s]).unwrap();
        assert_eq!(graph.children(a), &[s]);
    }

    #[test]
    fn depth_repair_propagates_to_descendants() {
        let mut graph = Graph::new();
        let a = input(&mut graph, 1);
        let b = input(&mut graph, 2);
        let mid = func(&mut graph, vec![b]);
        let top = func(&mut graph, vec![mid]);
        assert_eq!(graph.depth(top), 2);

        // Deepen mid by hanging it under another function of a.
        let deep = func(&mut graph, vec![a]);
        graph.set_parents(mid, vec![deep]);
        assert_eq!(graph.depth(mid), 2);
        assert_eq!(graph.depth(top), 3);
    }

    #[test]
    fn depth_repair_is_idempotent_at_unchanged_nodes() {
        let mut graph = Graph::new();
        let a = input(&mut graph, 1);
        let mid = func(&mut graph, vec![a]);
        let top = func(&mut graph, vec![mid]);
        graph.repair_depths([a]);
        assert_eq!(graph.depth(a), 0);
        assert_eq!(graph.depth(mid), 1);
        assert_eq!(graph.depth(top), 2);
    }

    #[test]
    fn remove_scrubs_links_on_both_sides() {
        let mut graph = Graph::new();
        let a = input(&mut graph, 1);
        let s = func(&mut graph, vec![a]);
        let t = func(&mut graph, vec![s]);
        graph.remove(s);
        assert!(graph.children(a).is_empty());
        assert!(graph.parents(t).is_empty());
        assert_eq!(graph.depth(t), 0);
    }

    #[test]
    fn replace_parent_preserves_position() {
        let mut graph = Graph::new();
        let a = input(&mut graph, 1);
        let b = input(&mut graph, 2);
        let c = input(&mut graph, 3);
        let s = graph.insert(
            NodeKind::Func {
                op: crate::op::OpKind::Concat,
                payload: crate::value::Payload::Value(Value::Int(0)),
            },
            vec![a, b],
            true,
        );
        graph.replace_parent(s, a, c);
        assert_eq!(graph.parents(s), &[c, b]);
        assert!(graph.children(a).is_empty());
        assert_eq!(graph.children(c), &[s]);
    }
}
