//! Fixed-point rewriting of a staged subgraph before commit.
//!
//! The engine operates only on the new-node set handed over by the builder
//! and the designated root — never on the whole graph. Rules run in a fixed
//! order each pass; passes repeat until no rule reports a change, or the pass
//! cap trips and the whole operation aborts as an internal error.
//!
//! Rules receive an explicit context carrying the mutable current root, the
//! staged set, and the removed set. A rule that replaces a node must redirect
//! the root before removing it; the engine independently asserts root
//! liveness after every rule.

mod rules;

use ahash::AHashSet;

use crate::error::SlateError;
use crate::logger::Logger;
use crate::node::NodeId;
use crate::slate::Slate;

/// Hard cap on rewrite passes. Exceeding it means a rule keeps reporting
/// changes without converging, which is a bug, not a workload.
pub(crate) const MAX_PASSES: usize = 100;

type Rule = fn(&mut Slate, &mut OptimizeCx, &dyn Logger) -> Result<bool, SlateError>;

const RULES: [(&str, Rule); 5] = [
    ("constant-reduction", rules::constant_reduction),
    ("parent-incorporation", rules::parent_incorporation),
    ("constant-consolidation", rules::constant_consolidation),
    ("remove-unreachable", rules::remove_unreachable),
    ("action-validator", rules::action_validator),
];

/// Shared mutable state of one optimize run.
pub(crate) struct OptimizeCx {
    /// The current root; rules that replace it update this reference.
    pub(crate) root: NodeId,
    members: AHashSet<NodeId>,
    /// Insertion order of `members`, for deterministic iteration.
    order: Vec<NodeId>,
    removed: AHashSet<NodeId>,
}

impl OptimizeCx {
    fn new(root: NodeId, staged: Vec<NodeId>) -> Self {
        let members: AHashSet<NodeId> = staged.iter().copied().collect();
        Self {
            root,
            members,
            order: staged,
            removed: AHashSet::new(),
        }
    }

    /// Whether `id` is a live member of the new-node set.
    pub(crate) fn is_staged(&self, id: NodeId) -> bool {
        self.members.contains(&id) && !self.removed.contains(&id)
    }

    pub(crate) fn was_removed(&self, id: NodeId) -> bool {
        self.removed.contains(&id)
    }

    /// Live members in insertion order.
    pub(crate) fn staged_ids(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|id| !self.removed.contains(id))
            .collect()
    }

    /// Adds a node the optimizer created (e.g. an interned constant).
    pub(crate) fn add(&mut self, id: NodeId) {
        self.removed.remove(&id);
        if self.members.insert(id) {
            self.order.push(id);
        }
    }

    /// Drops `id` from the set without touching the arena. Used for shared
    /// constants that outlive this staging.
    pub(crate) fn drop_from_set(&mut self, id: NodeId) {
        self.removed.insert(id);
    }

    /// Drops `id` from the set and deletes it from the arena.
    pub(crate) fn remove_node(&mut self, slate: &mut Slate, id: NodeId) {
        self.removed.insert(id);
        slate.graph.remove(id);
    }
}

/// Rewrites the staged set reachable from `root` to a fixed point.
///
/// Returns the possibly replaced root and the surviving set members.
pub(crate) fn optimize(
    slate: &mut Slate,
    root: NodeId,
    staged: Vec<NodeId>,
    logger: &dyn Logger,
) -> Result<(NodeId, Vec<NodeId>), SlateError> {
    let mut cx = OptimizeCx::new(root, staged);
    for pass in 0..MAX_PASSES {
        logger.on_pass_start(pass);
        let mut changed = false;
        for (name, rule) in RULES {
            let rule_changed = rule(slate, &mut cx, logger)?;
            logger.on_rule_applied(name, rule_changed);
            if cx.was_removed(cx.root) || !slate.contains(cx.root) {
                return Err(SlateError::OptimizerInvariant {
                    detail: format!(
                        "rule {} removed the current root {} without redirecting it",
                        name, cx.root
                    ),
                });
            }
            changed |= rule_changed;
        }
        if !changed {
            return Ok((cx.root, cx.staged_ids()));
        }
    }
    Err(SlateError::OptimizerDiverged { passes: MAX_PASSES })
}
