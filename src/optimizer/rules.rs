//! The rewrite rules, in the order the engine runs them.

use ahash::{AHashMap, AHashSet};

use super::OptimizeCx;
use crate::error::SlateError;
use crate::logger::Logger;
use crate::node::{NodeId, NodeKind};
use crate::slate::Slate;
use crate::value::Value;

/// Folds every staged subtree whose reachable leaves are all constants into
/// a single constant node, deduplicated through the slate-wide cache.
pub(super) fn constant_reduction(
    slate: &mut Slate,
    cx: &mut OptimizeCx,
    logger: &dyn Logger,
) -> Result<bool, SlateError> {
    let mut changed = false;
    let mut memo: AHashMap<NodeId, bool> = AHashMap::new();
    let root = cx.root;
    fold(slate, cx, logger, root, &mut memo, &mut changed)?;
    Ok(changed)
}

/// Leaf-first walk. Returns whether `id` is (now) a constant.
fn fold(
    slate: &mut Slate,
    cx: &mut OptimizeCx,
    logger: &dyn Logger,
    id: NodeId,
    memo: &mut AHashMap<NodeId, bool>,
    changed: &mut bool,
) -> Result<bool, SlateError> {
    if let Some(&known) = memo.get(&id) {
        return Ok(known);
    }
    let folded = fold_uncached(slate, cx, logger, id, memo, changed)?;
    memo.insert(id, folded);
    Ok(folded)
}

fn fold_uncached(
    slate: &mut Slate,
    cx: &mut OptimizeCx,
    logger: &dyn Logger,
    id: NodeId,
    memo: &mut AHashMap<NodeId, bool>,
    changed: &mut bool,
) -> Result<bool, SlateError> {
    if !slate.contains(id) {
        return Ok(false);
    }
    if slate.graph.kind(id).is_constant() {
        return Ok(true);
    }
    if !cx.is_staged(id) {
        // Committed non-constant boundary: inputs, externs, live functions.
        return Ok(false);
    }
    let op = match slate.graph.kind(id) {
        NodeKind::Func { op, .. } if !op.is_trigger_op() => *op,
        _ => return Ok(false),
    };
    let mut all_constant = true;
    for p in slate.parents(id) {
        if !fold(slate, cx, logger, p, memo, changed)? {
            all_constant = false;
        }
    }
    if !all_constant {
        return Ok(false);
    }
    // Operands may have been replaced by cached constants while folding;
    // re-read them, evaluate once, and splice in the shared constant.
    let values: Vec<Value> = slate
        .parents(id)
        .iter()
        .filter_map(|p| slate.graph.kind(*p).value().cloned())
        .collect();
    let value = op.apply(&values);
    let (constant, created) = slate.intern_constant(value);
    if created {
        cx.add(constant);
        memo.insert(constant, true);
    }
    for child in slate.children(id) {
        slate.graph.replace_parent(child, id, constant);
    }
    if cx.root == id {
        cx.root = constant;
    }
    logger.on_constant_folded(id, constant);
    cx.remove_node(slate, id);
    *changed = true;
    Ok(true)
}

/// Splices same-kind sole-dependent operands into coalescable nodes, and
/// collapses a coalescable node left with a single operand onto it.
pub(super) fn parent_incorporation(
    slate: &mut Slate,
    cx: &mut OptimizeCx,
    _logger: &dyn Logger,
) -> Result<bool, SlateError> {
    let mut changed = false;
    for id in cx.staged_ids() {
        if !cx.is_staged(id) || !slate.contains(id) {
            continue;
        }
        let op = match slate.graph.kind(id) {
            NodeKind::Func { op, .. } if op.incorporates_parents() => *op,
            _ => continue,
        };
        let mut i = 0;
        while i < slate.graph.parents(id).len() {
            let p = slate.graph.parents(id)[i];
            let splice = cx.is_staged(p)
                && slate.contains(p)
                && matches!(slate.graph.kind(p), NodeKind::Func { op: parent_op, .. } if *parent_op == op)
                && slate.graph.children(p) == [id];
            if !splice {
                i += 1;
                continue;
            }
            // The child set is deduplicated, so the operand may occupy more
            // than one slot; every occurrence is spliced before the node is
            // discarded.
            let grand = slate.parents(p);
            let mut rebuilt = Vec::new();
            for q in slate.parents(id) {
                if q == p {
                    rebuilt.extend(grand.iter().copied());
                } else {
                    rebuilt.push(q);
                }
            }
            slate.graph.set_parents(id, rebuilt);
            cx.remove_node(slate, p);
            changed = true;
            // Stay at i: the first spliced operand may splice again.
        }
        if op.reduces_single_parent() && slate.graph.parents(id).len() == 1 {
            let sole = slate.graph.parents(id)[0];
            for child in slate.children(id) {
                slate.graph.replace_parent(child, id, sole);
            }
            if cx.root == id {
                cx.root = sole;
            }
            cx.remove_node(slate, id);
            changed = true;
        }
    }
    Ok(changed)
}

/// Precomputes multiple constant operands of a commutative coalescable node
/// into one shared constant, dropped entirely when it is the identity.
pub(super) fn constant_consolidation(
    slate: &mut Slate,
    cx: &mut OptimizeCx,
    _logger: &dyn Logger,
) -> Result<bool, SlateError> {
    let mut changed = false;
    for id in cx.staged_ids() {
        if !cx.is_staged(id) || !slate.contains(id) {
            continue;
        }
        let op = match slate.graph.kind(id) {
            NodeKind::Func { op, .. } if op.is_coalescable() && op.is_commutative() => *op,
            _ => continue,
        };
        let parents = slate.parents(id);
        let constant_at: Vec<bool> = parents
            .iter()
            .map(|p| slate.graph.kind(*p).is_constant())
            .collect();
        let constant_count = constant_at.iter().filter(|c| **c).count();
        if constant_count < 2 || constant_count == parents.len() {
            // Fully-constant nodes belong to constant reduction.
            continue;
        }
        let values: Vec<Value> = parents
            .iter()
            .zip(&constant_at)
            .filter(|(_, is_const)| **is_const)
            .filter_map(|(p, _)| slate.graph.kind(*p).value().cloned())
            .collect();
        let combined = op.apply(&values);
        let keep = op.identity(combined.value_type()).as_ref() != Some(&combined);
        let replacement = if keep {
            let (constant, created) = slate.intern_constant(combined);
            if created {
                cx.add(constant);
            }
            Some(constant)
        } else {
            None
        };
        let mut new_parents = Vec::with_capacity(parents.len());
        let mut placed = false;
        for (p, is_const) in parents.iter().zip(&constant_at) {
            if *is_const {
                if !placed {
                    placed = true;
                    if let Some(constant) = replacement {
                        new_parents.push(constant);
                    }
                }
            } else {
                new_parents.push(*p);
            }
        }
        slate.graph.set_parents(id, new_parents);
        changed = true;
    }
    Ok(changed)
}

/// Drops set members no longer reachable from the (possibly replaced) root.
pub(super) fn remove_unreachable(
    slate: &mut Slate,
    cx: &mut OptimizeCx,
    _logger: &dyn Logger,
) -> Result<bool, SlateError> {
    let mut reachable = AHashSet::new();
    let mut stack = vec![cx.root];
    while let Some(id) = stack.pop() {
        if !reachable.insert(id) || !slate.contains(id) {
            continue;
        }
        stack.extend(slate.parents(id));
    }
    let mut changed = false;
    for id in cx.staged_ids() {
        if reachable.contains(&id) {
            continue;
        }
        if slate.contains(id) && slate.graph.is_legitimate(id) {
            // Shared cache constants outlive this staging.
            cx.drop_from_set(id);
        } else {
            cx.remove_node(slate, id);
        }
        changed = true;
    }
    Ok(changed)
}

/// Consistency gate, never a rewrite: every staged node's links must be
/// mutually wired, alive, and invisible to the committed graph.
pub(super) fn action_validator(
    slate: &mut Slate,
    cx: &mut OptimizeCx,
    _logger: &dyn Logger,
) -> Result<bool, SlateError> {
    for id in cx.staged_ids() {
        if !slate.contains(id) {
            return Err(invariant(slate, cx, id, "staged node is not in the arena"));
        }
        for p in slate.parents(id) {
            if !slate.contains(p) {
                return Err(invariant(slate, cx, id, "parent handle is dangling"));
            }
            if cx.was_removed(p) {
                return Err(invariant(slate, cx, id, "parent was marked removed"));
            }
            let aware = slate.graph.children(p).contains(&id);
            if slate.graph.is_legitimate(p) && !slate.graph.is_legitimate(id) {
                if aware {
                    return Err(invariant(
                        slate,
                        cx,
                        id,
                        "committed parent already links an uncommitted child",
                    ));
                }
            } else if !aware {
                return Err(invariant(slate, cx, id, "staged parent is unaware of child"));
            }
        }
        for c in slate.children(id) {
            if !slate.contains(c) {
                return Err(invariant(slate, cx, id, "child handle is dangling"));
            }
            if cx.was_removed(c) {
                return Err(invariant(slate, cx, id, "child was marked removed"));
            }
            if !slate.graph.parents(c).contains(&id) {
                return Err(invariant(slate, cx, id, "child does not link back"));
            }
        }
    }
    Ok(false)
}

fn invariant(slate: &Slate, cx: &OptimizeCx, id: NodeId, message: &str) -> SlateError {
    let links = if slate.contains(id) {
        format!(
            "parents {:?}, children {:?}",
            slate.parents(id),
            slate.children(id)
        )
    } else {
        "removed from arena".to_string()
    };
    SlateError::OptimizerInvariant {
        detail: format!(
            "{} (node {}, {}, staged set {:?})",
            message,
            id,
            links,
            cx.staged_ids()
        ),
    }
}
