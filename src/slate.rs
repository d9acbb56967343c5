//! The evaluation engine: pending work, draining, and cycle bookkeeping.
//!
//! A [`Slate`] owns all shared mutable state of one live graph — the node
//! arena, the root namespace, the pending-evaluation queue, the append-only
//! constant cache, and the output notification buffer. Actions never touch
//! the queue directly; they go through the scheduling methods here.

use ahash::{AHashMap, AHashSet};

use crate::error::SlateError;
use crate::graph::Graph;
use crate::logger::Logger;
use crate::namespace::Namespace;
use crate::node::{NodeId, NodeKind};
use crate::op::OpKind;
use crate::queue::DepthQueue;
use crate::value::{Payload, PayloadType, Value};

/// One buffered output change, flushed at the end of an evaluation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The name the output was registered under.
    pub name: String,
    /// The payload the observed source settled on.
    pub payload: Payload,
}

/// The evaluation engine and owner of one live dataflow graph.
#[derive(Debug, Default)]
pub struct Slate {
    pub(crate) graph: Graph,
    pub(crate) names: Namespace,
    pending: DepthQueue,
    constants: AHashMap<Value, NodeId>,
    notifications: Vec<Notification>,
}

impl Slate {
    /// Creates an empty slate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a name in the live namespace.
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.names.get(name)
    }

    /// Whether `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.graph.contains(id)
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.graph.len()
    }

    /// The current value of a value-bearing node.
    pub fn value(&self, id: NodeId) -> Option<Value> {
        if !self.graph.contains(id) {
            return None;
        }
        self.graph.kind(id).value().cloned()
    }

    /// The provoked flag of a trigger-bearing node.
    pub fn provoked(&self, id: NodeId) -> Option<bool> {
        if !self.graph.contains(id) {
            return None;
        }
        self.graph.kind(id).provoked()
    }

    /// The cached depth of a node.
    pub fn depth(&self, id: NodeId) -> u32 {
        self.graph.depth(id)
    }

    /// The operand list of a node.
    pub fn parents(&self, id: NodeId) -> Vec<NodeId> {
        self.graph.parents(id).to_vec()
    }

    /// The dependent set of a node.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.graph.children(id).to_vec()
    }

    /// Looks up or creates the shared constant node for `value`.
    ///
    /// The cache is append-only and slate-wide, so equal literals anywhere in
    /// the graph share one node. Returns the handle and whether it was newly
    /// created.
    pub fn intern_constant(&mut self, value: Value) -> (NodeId, bool) {
        if let Some(&id) = self.constants.get(&value) {
            return (id, false);
        }
        let id = self
            .graph
            .insert(NodeKind::Constant(value.clone()), Vec::new(), true);
        self.constants.insert(value, id);
        (id, true)
    }

    /// Registers an output observing `source` and primes it with the current
    /// payload.
    ///
    /// Whenever the source settles on a new payload, one [`Notification`] is
    /// buffered per evaluation cycle and flushed at Finish.
    pub fn watch(
        &mut self,
        name: impl Into<String>,
        source: NodeId,
    ) -> Result<NodeId, SlateError> {
        let payload = self.payload_of(source).ok_or_else(|| SlateError::TypeMismatch {
            expected: "a value or trigger source".to_string(),
            found: "a node with no payload".to_string(),
        })?;
        let id = self.graph.insert(
            NodeKind::Output {
                name: name.into(),
                last: Some(payload),
                pending: false,
            },
            vec![source],
            true,
        );
        Ok(id)
    }

    /// Drains and returns the notifications buffered by finished cycles.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// The current payload of a node, if it carries one.
    pub(crate) fn payload_of(&self, id: NodeId) -> Option<Payload> {
        if !self.graph.contains(id) {
            return None;
        }
        let kind = self.graph.kind(id);
        if let Some(v) = kind.value() {
            return Some(Payload::Value(v.clone()));
        }
        kind.provoked().map(|provoked| Payload::Trigger { provoked })
    }

    // ------------------------------------------------------------------
    // Staged construction, used by the builder.
    // ------------------------------------------------------------------

    pub(crate) fn new_input(&mut self, value: Value) -> NodeId {
        self.graph.insert(NodeKind::Input(value), Vec::new(), false)
    }

    pub(crate) fn new_trigger(&mut self) -> NodeId {
        self.graph
            .insert(NodeKind::Trigger { provoked: false }, Vec::new(), false)
    }

    pub(crate) fn new_extern(&mut self, ty: PayloadType) -> NodeId {
        self.graph.insert(
            NodeKind::Extern {
                payload: ty.default_payload(),
            },
            Vec::new(),
            false,
        )
    }

    /// Creates a staged function node, checking operand types and computing
    /// its initial payload from the current parent payloads.
    pub(crate) fn new_func(
        &mut self,
        op: OpKind,
        parents: Vec<NodeId>,
    ) -> Result<NodeId, SlateError> {
        let mut types = Vec::with_capacity(parents.len());
        for &p in &parents {
            let ty = self
                .graph
                .kind(p)
                .payload_type()
                .ok_or_else(|| SlateError::TypeMismatch {
                    expected: "a value or trigger operand".to_string(),
                    found: format!("{}", p),
                })?;
            types.push(ty);
        }
        op.result_type(&types)?;
        let payload = self.compute(op, &parents);
        Ok(self
            .graph
            .insert(NodeKind::Func { op, payload }, parents, false))
    }

    // ------------------------------------------------------------------
    // Scheduling and draining.
    // ------------------------------------------------------------------

    /// Queues an evaluable node at its current depth. No-op otherwise.
    pub(crate) fn schedule(&mut self, id: NodeId, logger: &dyn Logger) {
        if self.graph.contains(id) && self.graph.kind(id).is_evaluable() {
            let depth = self.graph.depth(id);
            if self.pending.insert(depth, id) {
                logger.on_node_scheduled(id);
            }
        }
    }

    /// Queues the evaluable dependents of a node.
    pub(crate) fn schedule_children(&mut self, id: NodeId, logger: &dyn Logger) {
        for c in self.graph.children(id).to_vec() {
            self.schedule(c, logger);
        }
    }

    /// Pops pending nodes in ascending depth until the queue is empty.
    ///
    /// A node that reports a change queues its evaluable children, always at
    /// a depth no lower than its own, so the ascending order is the fixed
    /// point argument: every touched node sees fully settled ancestors.
    pub(crate) fn drain(&mut self, logger: &dyn Logger) {
        while let Some((_, id)) = self.pending.pop() {
            if !self.graph.contains(id) {
                continue;
            }
            let changed = self.evaluate(id);
            logger.on_node_evaluated(id, changed);
            if changed {
                self.schedule_children(id, logger);
            }
        }
    }

    /// Number of nodes currently awaiting recomputation.
    ///
    /// Zero after any formula performs: the trailing Finish drains the queue
    /// to its fixed point.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Recomputes one node from its parents. Returns whether its payload
    /// moved. Never fails: operand types were checked at construction.
    pub(crate) fn evaluate(&mut self, id: NodeId) -> bool {
        match self.graph.kind(id) {
            NodeKind::Func { op, .. } => {
                let op = *op;
                let parents = self.graph.parents(id).to_vec();
                let fresh = self.compute(op, &parents);
                if let NodeKind::Func { payload, .. } = self.graph.kind_mut(id) {
                    let changed = *payload != fresh;
                    *payload = fresh;
                    changed
                } else {
                    false
                }
            }
            NodeKind::Output { .. } => {
                let Some(&source) = self.graph.parents(id).first() else {
                    return false;
                };
                let Some(current) = self.payload_of(source) else {
                    return false;
                };
                if let NodeKind::Output { last, pending, .. } = self.graph.kind_mut(id) {
                    if last.as_ref() != Some(&current) {
                        *last = Some(current);
                        *pending = true;
                        return true;
                    }
                }
                false
            }
            _ => false,
        }
    }

    fn compute(&self, op: OpKind, parents: &[NodeId]) -> Payload {
        if op.is_trigger_op() {
            let flags: Vec<bool> = parents
                .iter()
                .map(|p| self.graph.kind(*p).provoked().unwrap_or(false))
                .collect();
            Payload::Trigger {
                provoked: op.apply_trigger(&flags),
            }
        } else {
            let values: Vec<Value> = parents
                .iter()
                .filter_map(|p| self.graph.kind(*p).value().cloned())
                .collect();
            Payload::Value(op.apply(&values))
        }
    }

    // ------------------------------------------------------------------
    // Commit-layer mutation.
    // ------------------------------------------------------------------

    /// Sets the value of a typed input (or a value extern placeholder).
    /// Returns whether the value moved.
    pub(crate) fn set_input(&mut self, id: NodeId, value: Value) -> Result<bool, SlateError> {
        match self.graph.kind_mut(id) {
            NodeKind::Input(current)
            | NodeKind::Extern {
                payload: Payload::Value(current),
            } => {
                if current.value_type() != value.value_type() {
                    return Err(SlateError::TypeMismatch {
                        expected: current.value_type().to_string(),
                        found: value.value_type().to_string(),
                    });
                }
                let changed = *current != value;
                *current = value;
                Ok(changed)
            }
            other => Err(SlateError::TypeMismatch {
                expected: "a typed input".to_string(),
                found: match other.payload_type() {
                    Some(ty) => format!("a non-input {} node", ty),
                    None => "an output node".to_string(),
                },
            }),
        }
    }

    /// Sets the provoked flag of a trigger input (or a trigger extern
    /// placeholder). Returns whether the flag moved.
    pub(crate) fn provoke_input(&mut self, id: NodeId) -> Result<bool, SlateError> {
        match self.graph.kind_mut(id) {
            NodeKind::Trigger { provoked }
            | NodeKind::Extern {
                payload: Payload::Trigger { provoked },
            } => {
                let changed = !*provoked;
                *provoked = true;
                Ok(changed)
            }
            other => Err(SlateError::TypeMismatch {
                expected: "a trigger input".to_string(),
                found: match other.payload_type() {
                    Some(ty) => format!("a non-input {} node", ty),
                    None => "an output node".to_string(),
                },
            }),
        }
    }

    /// Back-registers every staged node reachable from `root` into its
    /// parents' child sets, making the subgraph visible to propagation.
    ///
    /// Returns the nodes that were legitimized.
    pub(crate) fn legitimize(&mut self, root: NodeId) -> Result<Vec<NodeId>, SlateError> {
        let mut stack = vec![root];
        let mut visited = AHashSet::new();
        let mut staged = Vec::new();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) || !self.graph.contains(id) {
                continue;
            }
            if self.graph.is_legitimate(id) {
                continue;
            }
            staged.push(id);
            stack.extend_from_slice(self.graph.parents(id));
        }
        for &id in &staged {
            let parents = self.graph.parents(id).to_vec();
            for p in parents {
                self.graph.add_children(p, &[id])?;
            }
            self.graph.set_legitimate(id);
        }
        Ok(staged)
    }

    /// Deletes staged nodes that never got committed. Shared constants and
    /// anything already legitimized are left alone.
    pub(crate) fn discard_staged(&mut self, ids: &[NodeId]) {
        for &id in ids {
            if self.graph.contains(id) && !self.graph.is_legitimate(id) {
                self.graph.remove(id);
            }
        }
    }

    /// Ends an evaluation cycle: drains remaining work, flushes output
    /// notifications, and clears every provoked flag so the next cycle
    /// starts clean.
    pub(crate) fn finish(&mut self, logger: &dyn Logger) {
        self.drain(logger);
        for id in self.graph.node_ids() {
            if let NodeKind::Output {
                name,
                last,
                pending,
            } = self.graph.kind_mut(id)
            {
                if *pending {
                    *pending = false;
                    if let Some(payload) = last.clone() {
                        let name = name.clone();
                        self.notifications.push(Notification { name, payload });
                    }
                }
            }
        }
        let mut reset = 0usize;
        for id in self.graph.node_ids() {
            match self.graph.kind_mut(id) {
                NodeKind::Trigger { provoked }
                | NodeKind::Func {
                    payload: Payload::Trigger { provoked },
                    ..
                }
                | NodeKind::Extern {
                    payload: Payload::Trigger { provoked },
                } if *provoked => {
                    *provoked = false;
                    reset += 1;
                }
                // Outputs observing triggers mirror the silent clear, so the
                // next provocation registers as a change.
                NodeKind::Output {
                    last: Some(Payload::Trigger { provoked }),
                    ..
                } if *provoked => {
                    *provoked = false;
                }
                _ => {}
            }
        }
        logger.on_trigger_reset(reset);
    }
}
