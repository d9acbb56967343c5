//! Two-phase staging: build nodes and actions against a shadow namespace,
//! commit them later by performing the built formula.
//!
//! Phase one happens here: expression nodes are created with their operand
//! lists wired but without registering themselves on committed parents, so an
//! abandoned builder leaves the live graph untouched. Phase two is
//! [`Formula::perform`], which legitimizes, binds, and schedules.
//!
//! Every precondition of the action table is checked here, at construction
//! time, against the virtual namespace — a later action of the same builder
//! sees the bindings of earlier ones.

use crate::action::{Action, ActionKind};
use crate::error::SlateError;
use crate::formula::Formula;
use crate::logger::{or_noop, Logger};
use crate::namespace::VirtualNamespace;
use crate::node::NodeId;
use crate::op::OpKind;
use crate::optimizer;
use crate::slate::Slate;
use crate::value::{PayloadType, Value};

/// Stages nodes and actions for one formula.
pub struct FormulaBuilder<'s> {
    slate: &'s mut Slate,
    logger: Option<&'s dyn Logger>,
    scope: VirtualNamespace,
    actions: Vec<Action>,
    /// Nodes created since the last action boundary; the next staging call
    /// hands them to the optimizer as its new-node set.
    staged: Vec<NodeId>,
}

impl<'s> FormulaBuilder<'s> {
    /// Starts staging a formula against `slate`.
    pub fn new(slate: &'s mut Slate) -> Self {
        Self {
            slate,
            logger: None,
            scope: VirtualNamespace::default(),
            actions: Vec::new(),
            staged: Vec::new(),
        }
    }

    /// Routes optimizer tracing through `logger`.
    pub fn with_logger(mut self, logger: &'s dyn Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Resolves a name against the staged scope, then the live namespace.
    pub fn lookup(&self, name: &str) -> Result<NodeId, SlateError> {
        self.resolve(name)
            .ok_or_else(|| SlateError::UnresolvedIdentifier {
                name: name.to_string(),
            })
    }

    fn resolve(&self, name: &str) -> Option<NodeId> {
        self.scope.resolve(&self.slate.names, name)
    }

    /// The shared constant node for `value`.
    pub fn constant(&mut self, value: impl Into<Value>) -> NodeId {
        let (id, created) = self.slate.intern_constant(value.into());
        if created {
            self.staged.push(id);
        }
        id
    }

    /// Stages a function node computing `op` over `parents`.
    ///
    /// Operand types are checked now; the node's initial payload is computed
    /// from the current parent payloads.
    pub fn func(&mut self, op: OpKind, parents: Vec<NodeId>) -> Result<NodeId, SlateError> {
        let id = self.slate.new_func(op, parents)?;
        self.staged.push(id);
        Ok(id)
    }

    /// Stages an input node initialized to `initial` and defines it under
    /// `name`. Returns the input node.
    pub fn create_input(
        &mut self,
        name: impl Into<String>,
        initial: impl Into<Value>,
    ) -> Result<NodeId, SlateError> {
        let id = self.slate.new_input(initial.into());
        self.staged.push(id);
        self.define(name, id)
    }

    /// Stages a trigger input and defines it under `name`.
    pub fn create_trigger(&mut self, name: impl Into<String>) -> Result<NodeId, SlateError> {
        let id = self.slate.new_trigger();
        self.staged.push(id);
        self.define(name, id)
    }

    /// Resolves `name` to an existing node of type `ty`, or stages a typed
    /// placeholder to be bound under that name.
    ///
    /// A name already satisfied by an equivalent node is a successful no-op:
    /// the existing node is returned and nothing is staged.
    pub fn request_extern(
        &mut self,
        name: impl Into<String>,
        ty: PayloadType,
    ) -> Result<NodeId, SlateError> {
        let name = name.into();
        if let Some(existing) = self.resolve(&name) {
            let found = self.slate.graph.kind(existing).payload_type();
            if found == Some(ty) {
                return Ok(existing);
            }
            return Err(SlateError::TypeMismatch {
                expected: ty.to_string(),
                found: found.map_or("none".to_string(), |t| t.to_string()),
            });
        }
        let node = self.slate.new_extern(ty);
        self.actions.push(Action {
            kind: ActionKind::Extern {
                name: name.clone(),
                node,
                ty,
                staged: vec![node],
            },
        });
        self.scope.bind(name, node);
        Ok(node)
    }

    /// Stages a definition of `root` under `name`.
    ///
    /// The name must be unbound or bound to a matching-type extern, which the
    /// commit will replace. Returns the optimizer-rewritten root, which later
    /// expressions may build on.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        root: NodeId,
    ) -> Result<NodeId, SlateError> {
        let name = name.into();
        let root_ty = self
            .slate
            .graph
            .kind(root)
            .payload_type()
            .ok_or_else(|| SlateError::TypeMismatch {
                expected: "a value or trigger definition".to_string(),
                found: "a node with no payload".to_string(),
            })?;
        if let Some(existing) = self.resolve(&name) {
            if existing != root {
                if !self.slate.graph.kind(existing).is_extern() {
                    return Err(SlateError::NameConflict { name });
                }
                let expected = self.slate.graph.kind(existing).payload_type();
                if expected != Some(root_ty) {
                    return Err(SlateError::TypeMismatch {
                        expected: expected.map_or("none".to_string(), |t| t.to_string()),
                        found: root_ty.to_string(),
                    });
                }
            }
        }
        let (root, staged) = self.optimize(root)?;
        self.actions.push(Action {
            kind: ActionKind::Define {
                name: name.clone(),
                root,
                staged,
            },
        });
        self.scope.bind(name, root);
        Ok(root)
    }

    /// Stages an assignment of `source`'s value to the input bound as `name`.
    pub fn assign(&mut self, name: &str, source: NodeId) -> Result<NodeId, SlateError> {
        let target = self.lookup(name)?;
        if !self.slate.graph.kind(target).is_value_input() {
            return Err(SlateError::TypeMismatch {
                expected: "a typed input".to_string(),
                found: format!("`{}`", name),
            });
        }
        let target_ty = self.slate.graph.kind(target).payload_type();
        let source_ty = self.slate.graph.kind(source).payload_type();
        if source_ty.is_none() || target_ty != source_ty {
            return Err(SlateError::TypeMismatch {
                expected: target_ty.map_or("a value".to_string(), |t| t.to_string()),
                found: source_ty.map_or("none".to_string(), |t| t.to_string()),
            });
        }
        let (source, staged) = self.optimize(source)?;
        self.actions.push(Action {
            kind: ActionKind::Assign {
                target,
                source,
                staged,
            },
        });
        Ok(source)
    }

    /// Stages a provocation of the trigger input bound as `name`.
    ///
    /// With a condition, the target fires only if the condition is provoked
    /// when the action performs.
    pub fn provoke(
        &mut self,
        name: &str,
        condition: Option<NodeId>,
    ) -> Result<(), SlateError> {
        let target = self.lookup(name)?;
        if !self.slate.graph.kind(target).is_trigger_input() {
            return Err(SlateError::TypeMismatch {
                expected: "a trigger input".to_string(),
                found: format!("`{}`", name),
            });
        }
        let (condition, staged) = match condition {
            Some(c) => {
                if self.slate.graph.kind(c).payload_type() != Some(PayloadType::Trigger) {
                    return Err(SlateError::TypeMismatch {
                        expected: "a trigger condition".to_string(),
                        found: format!("{}", c),
                    });
                }
                let (c, staged) = self.optimize(c)?;
                (Some(c), staged)
            }
            None => (None, std::mem::take(&mut self.staged)),
        };
        self.actions.push(Action {
            kind: ActionKind::Provoke {
                target,
                condition,
                staged,
            },
        });
        Ok(())
    }

    /// Stages a copy of `node`'s value into the report under `path`.
    pub fn get_value(
        &mut self,
        node: NodeId,
        path: impl Into<String>,
    ) -> Result<NodeId, SlateError> {
        match self.slate.graph.kind(node).payload_type() {
            Some(PayloadType::Value(_)) => {}
            other => {
                return Err(SlateError::TypeMismatch {
                    expected: "a value node".to_string(),
                    found: other.map_or("none".to_string(), |t| t.to_string()),
                })
            }
        }
        let (node, staged) = self.optimize(node)?;
        self.actions.push(Action {
            kind: ActionKind::GetValue {
                node,
                path: path.into(),
                staged,
            },
        });
        Ok(node)
    }

    /// Stages a copy of `node`'s provoked state into the report under `path`.
    pub fn get_trigger(
        &mut self,
        node: NodeId,
        path: impl Into<String>,
    ) -> Result<NodeId, SlateError> {
        if self.slate.graph.kind(node).payload_type() != Some(PayloadType::Trigger) {
            return Err(SlateError::TypeMismatch {
                expected: "a trigger node".to_string(),
                found: format!("{}", node),
            });
        }
        let (node, staged) = self.optimize(node)?;
        self.actions.push(Action {
            kind: ActionKind::GetTrigger {
                node,
                path: path.into(),
                staged,
            },
        });
        Ok(node)
    }

    /// Stages a named scratch subgraph: evaluated when the formula performs,
    /// visible to later staging calls of this builder, never bound in the
    /// live namespace.
    pub fn temp(
        &mut self,
        name: impl Into<String>,
        root: NodeId,
    ) -> Result<NodeId, SlateError> {
        let name = name.into();
        if self.resolve(&name).is_some() {
            return Err(SlateError::NameConflict { name });
        }
        let (root, staged) = self.optimize(root)?;
        self.actions.push(Action {
            kind: ActionKind::Temp {
                name: name.clone(),
                root,
                staged,
            },
        });
        self.scope.bind(name, root);
        Ok(root)
    }

    /// Finishes staging and returns the formula, terminated by Finish.
    pub fn build(mut self) -> Formula {
        Formula::from_actions(std::mem::take(&mut self.actions))
    }

    /// Runs the optimizer over the nodes staged since the last action
    /// boundary, rooted at `root`.
    fn optimize(&mut self, root: NodeId) -> Result<(NodeId, Vec<NodeId>), SlateError> {
        let staged = std::mem::take(&mut self.staged);
        optimizer::optimize(self.slate, root, staged, or_noop(self.logger))
    }
}

impl Drop for FormulaBuilder<'_> {
    /// Nodes staged after the last action boundary belong to no action, so an
    /// abandoned (or fully built) builder discards them; the live graph never
    /// saw them.
    fn drop(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        self.slate.discard_staged(&staged);
    }
}
