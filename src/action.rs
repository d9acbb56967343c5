//! Staged edits, validated at construction and committed by a formula.
//!
//! An [`Action`] is an immutable, already-validated edit with one transition:
//! `perform` takes the live slate, the mutable report, and a logger. Actions
//! are built only by [`FormulaBuilder`](crate::FormulaBuilder), which raises
//! every precondition violation at construction time; `perform` re-verifies
//! cheaply because independently built formulas may be joined.

use crate::error::SlateError;
use crate::logger::Logger;
use crate::node::{NodeId, NodeKind};
use crate::report::Report;
use crate::slate::Slate;
use crate::value::{Payload, PayloadType};

/// One staged edit of a formula.
#[derive(Debug, Clone)]
pub struct Action {
    pub(crate) kind: ActionKind,
}

#[derive(Debug, Clone)]
pub(crate) enum ActionKind {
    /// Bind `root` under `name`, replacing a matching extern if one is bound.
    Define {
        name: String,
        root: NodeId,
        staged: Vec<NodeId>,
    },
    /// Bind a placeholder under `name` unless an equivalent node exists.
    Extern {
        name: String,
        node: NodeId,
        ty: PayloadType,
        staged: Vec<NodeId>,
    },
    /// Evaluate `source` and write its value into the input `target`.
    Assign {
        target: NodeId,
        source: NodeId,
        staged: Vec<NodeId>,
    },
    /// Fire the trigger input `target`, optionally gated on `condition`.
    Provoke {
        target: NodeId,
        condition: Option<NodeId>,
        staged: Vec<NodeId>,
    },
    /// Copy the value of `node` into the report under `path`.
    GetValue {
        node: NodeId,
        path: String,
        staged: Vec<NodeId>,
    },
    /// Copy the provoked state of `node` into the report under `path`.
    GetTrigger {
        node: NodeId,
        path: String,
        staged: Vec<NodeId>,
    },
    /// Evaluate a named scratch subgraph without binding it persistently.
    Temp {
        name: String,
        root: NodeId,
        staged: Vec<NodeId>,
    },
    /// Drain remaining work, flush outputs, clear provoked flags.
    Finish,
}

impl Action {
    pub(crate) fn finish() -> Self {
        Action {
            kind: ActionKind::Finish,
        }
    }

    /// Short name used in logging.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            ActionKind::Define { .. } => "define",
            ActionKind::Extern { .. } => "extern",
            ActionKind::Assign { .. } => "assign",
            ActionKind::Provoke { .. } => "provoke",
            ActionKind::GetValue { .. } => "get-value",
            ActionKind::GetTrigger { .. } => "get-trigger",
            ActionKind::Temp { .. } => "temp",
            ActionKind::Finish => "finish",
        }
    }

    /// Whether this is the trailing evaluation/reset step.
    pub fn is_finish(&self) -> bool {
        matches!(self.kind, ActionKind::Finish)
    }

    /// The nodes this action staged; anything here left illegitimate after
    /// the formula completes is discarded.
    pub(crate) fn staged(&self) -> &[NodeId] {
        match &self.kind {
            ActionKind::Define { staged, .. }
            | ActionKind::Extern { staged, .. }
            | ActionKind::Assign { staged, .. }
            | ActionKind::Provoke { staged, .. }
            | ActionKind::GetValue { staged, .. }
            | ActionKind::GetTrigger { staged, .. }
            | ActionKind::Temp { staged, .. } => staged,
            ActionKind::Finish => &[],
        }
    }

    pub(crate) fn perform(
        &self,
        slate: &mut Slate,
        report: &mut Report,
        logger: &dyn Logger,
    ) -> Result<(), SlateError> {
        match &self.kind {
            ActionKind::Define { name, root, .. } => perform_define(slate, name, *root, logger),
            ActionKind::Extern { name, node, ty, .. } => {
                perform_extern(slate, name, *node, *ty, logger)
            }
            ActionKind::Assign {
                target,
                source,
                staged,
            } => {
                drain_staged(slate, staged, logger);
                let value =
                    slate
                        .value(*source)
                        .ok_or_else(|| SlateError::TypeMismatch {
                            expected: "a value source".to_string(),
                            found: format!("{}", source),
                        })?;
                let changed = slate.set_input(*target, value)?;
                if changed {
                    slate.schedule_children(*target, logger);
                }
                Ok(())
            }
            ActionKind::Provoke {
                target,
                condition,
                staged,
            } => {
                drain_staged(slate, staged, logger);
                let fire = match condition {
                    None => true,
                    Some(c) => slate.provoked(*c).ok_or_else(|| SlateError::TypeMismatch {
                        expected: "a trigger condition".to_string(),
                        found: format!("{}", c),
                    })?,
                };
                if fire {
                    let changed = slate.provoke_input(*target)?;
                    if changed {
                        slate.schedule_children(*target, logger);
                    }
                }
                Ok(())
            }
            ActionKind::GetValue { node, path, staged } => {
                drain_staged(slate, staged, logger);
                let value = slate.value(*node).ok_or_else(|| SlateError::TypeMismatch {
                    expected: "a value node".to_string(),
                    found: format!("{}", node),
                })?;
                report.insert_value(path.clone(), value);
                Ok(())
            }
            ActionKind::GetTrigger { node, path, staged } => {
                drain_staged(slate, staged, logger);
                let provoked =
                    slate
                        .provoked(*node)
                        .ok_or_else(|| SlateError::TypeMismatch {
                            expected: "a trigger node".to_string(),
                            found: format!("{}", node),
                        })?;
                report.insert_provoked(path.clone(), provoked);
                Ok(())
            }
            ActionKind::Temp { root: _, staged, .. } => {
                drain_staged(slate, staged, logger);
                Ok(())
            }
            ActionKind::Finish => {
                slate.finish(logger);
                Ok(())
            }
        }
    }
}

/// Queues an action's staged evaluables and drains the whole engine queue,
/// so the action reads fully settled payloads.
fn drain_staged(slate: &mut Slate, staged: &[NodeId], logger: &dyn Logger) {
    for &id in staged {
        slate.schedule(id, logger);
    }
    slate.drain(logger);
}

fn perform_define(
    slate: &mut Slate,
    name: &str,
    root: NodeId,
    logger: &dyn Logger,
) -> Result<(), SlateError> {
    let replaced = match slate.names.get(name) {
        None => None,
        Some(existing) => {
            if !slate.graph.kind(existing).is_extern() {
                return Err(SlateError::NameConflict {
                    name: name.to_string(),
                });
            }
            let expected = slate.graph.kind(existing).payload_type();
            let found = slate.graph.kind(root).payload_type();
            if expected != found {
                return Err(SlateError::TypeMismatch {
                    expected: expected.map_or("a payload".to_string(), |t| t.to_string()),
                    found: found.map_or("none".to_string(), |t| t.to_string()),
                });
            }
            Some(existing)
        }
    };

    // Migration must not close a loop. A definition whose own subgraph
    // reaches the placeholder would become its own ancestor, and so would a
    // committed dependent of the placeholder sitting above the new node.
    // Checked before anything mutates.
    if let Some(placeholder) = replaced {
        if placeholder == root || slate.graph.is_ancestor(placeholder, root) {
            return Err(SlateError::GraphCycle {
                parent: root,
                child: placeholder,
            });
        }
        for &c in slate.graph.children(placeholder) {
            if c == root || slate.graph.is_ancestor(c, root) {
                return Err(SlateError::GraphCycle {
                    parent: root,
                    child: c,
                });
            }
        }
    }

    let staged = slate.legitimize(root)?;

    if let Some(placeholder) = replaced {
        migrate_children(slate, placeholder, root, logger)?;
        if let NodeKind::Extern { payload } = slate.graph.kind(placeholder).clone() {
            copy_placeholder_payload(slate, root, payload);
        }
        slate.names.unbind(name);
        slate.graph.remove(placeholder);
    }

    slate.names.bind(name, root);
    logger.on_define(name, root);
    for id in staged {
        slate.schedule(id, logger);
    }
    Ok(())
}

/// Moves every dependent of `from` onto `to` and schedules it to pick up the
/// replacement's payload.
fn migrate_children(
    slate: &mut Slate,
    from: NodeId,
    to: NodeId,
    logger: &dyn Logger,
) -> Result<(), SlateError> {
    let children = slate.graph.children(from).to_vec();
    for &c in &children {
        slate.graph.replace_parent(c, from, to);
    }
    let committed: Vec<NodeId> = children
        .iter()
        .copied()
        .filter(|c| slate.graph.is_legitimate(*c))
        .collect();
    if !committed.is_empty() {
        slate.graph.add_children(to, &committed)?;
    }
    for c in children {
        slate.schedule(c, logger);
    }
    Ok(())
}

/// Carries assignments made against a placeholder over to an input that
/// replaces it. Computed replacements are recomputed anyway.
fn copy_placeholder_payload(slate: &mut Slate, root: NodeId, payload: Payload) {
    match (slate.graph.kind_mut(root), payload) {
        (NodeKind::Input(value), Payload::Value(placeholder_value)) => {
            *value = placeholder_value;
        }
        (NodeKind::Trigger { provoked }, Payload::Trigger { provoked: was }) => {
            *provoked = was;
        }
        _ => {}
    }
}

fn perform_extern(
    slate: &mut Slate,
    name: &str,
    node: NodeId,
    ty: PayloadType,
    logger: &dyn Logger,
) -> Result<(), SlateError> {
    match slate.names.get(name) {
        None => {
            slate.legitimize(node)?;
            slate.names.bind(name, node);
            logger.on_define(name, node);
            Ok(())
        }
        Some(existing) if existing == node => Ok(()),
        Some(existing) => {
            // An equivalent node is already bound: fold this placeholder's
            // dependents onto it and succeed as a no-op.
            let found = slate.graph.kind(existing).payload_type();
            if found != Some(ty) {
                return Err(SlateError::TypeMismatch {
                    expected: ty.to_string(),
                    found: found.map_or("none".to_string(), |t| t.to_string()),
                });
            }
            for &c in slate.graph.children(node) {
                if c == existing || slate.graph.is_ancestor(c, existing) {
                    return Err(SlateError::GraphCycle {
                        parent: existing,
                        child: c,
                    });
                }
            }
            migrate_children(slate, node, existing, logger)
        }
    }
}
