//! The node model: identities, roles, and capability accessors.

use std::fmt;

use crate::op::OpKind;
use crate::value::{Payload, PayloadType, Value};

/// Opaque handle to a node in the slate's arena.
///
/// Handles are plain indices; holding one does not keep the node alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The role of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// An immutable literal, shared through the slate-wide constant cache.
    Constant(Value),
    /// A typed value source settable by the commit layer.
    Input(Value),
    /// A trigger source provokable by the commit layer.
    Trigger {
        /// Whether the trigger has fired this cycle.
        provoked: bool,
    },
    /// A value or trigger derived from the node's parents.
    Func {
        /// The operation computed over the parents.
        op: OpKind,
        /// The most recently computed payload.
        payload: Payload,
    },
    /// A typed placeholder for a node to be defined later.
    ///
    /// Carries a default payload so dependents evaluate before the real
    /// definition exists; assignments against the placeholder update it.
    Extern {
        /// The placeholder payload.
        payload: Payload,
    },
    /// Observes a source node and buffers one change notification per cycle.
    Output {
        /// The name notifications are published under.
        name: String,
        /// The payload last seen on the source.
        last: Option<Payload>,
        /// Whether a notification is waiting to be flushed at Finish.
        pending: bool,
    },
}

impl NodeKind {
    /// The payload type this node produces, if it produces one.
    ///
    /// `Output` nodes observe rather than produce and return `None`.
    pub fn payload_type(&self) -> Option<PayloadType> {
        match self {
            NodeKind::Constant(v) | NodeKind::Input(v) => {
                Some(PayloadType::Value(v.value_type()))
            }
            NodeKind::Trigger { .. } => Some(PayloadType::Trigger),
            NodeKind::Func { payload, .. } | NodeKind::Extern { payload } => {
                Some(payload.payload_type())
            }
            NodeKind::Output { .. } => None,
        }
    }

    /// The current value, for value-bearing nodes.
    pub fn value(&self) -> Option<&Value> {
        match self {
            NodeKind::Constant(v) | NodeKind::Input(v) => Some(v),
            NodeKind::Func { payload, .. } | NodeKind::Extern { payload } => payload.value(),
            _ => None,
        }
    }

    /// The provoked flag, for trigger-bearing nodes.
    pub fn provoked(&self) -> Option<bool> {
        match self {
            NodeKind::Trigger { provoked } => Some(*provoked),
            NodeKind::Func { payload, .. } | NodeKind::Extern { payload } => payload.provoked(),
            _ => None,
        }
    }

    /// Whether this node is an immutable literal.
    pub fn is_constant(&self) -> bool {
        matches!(self, NodeKind::Constant(_))
    }

    /// Whether this node recomputes from its parents when scheduled.
    pub fn is_evaluable(&self) -> bool {
        matches!(self, NodeKind::Func { .. } | NodeKind::Output { .. })
    }

    /// Whether this node is a forward-declaration placeholder.
    pub fn is_extern(&self) -> bool {
        matches!(self, NodeKind::Extern { .. })
    }

    /// Whether this node accepts assignments of typed values.
    pub fn is_value_input(&self) -> bool {
        matches!(self, NodeKind::Input(_))
            || matches!(
                self,
                NodeKind::Extern {
                    payload: Payload::Value(_)
                }
            )
    }

    /// Whether this node accepts trigger provocations.
    pub fn is_trigger_input(&self) -> bool {
        matches!(self, NodeKind::Trigger { .. })
            || matches!(
                self,
                NodeKind::Extern {
                    payload: Payload::Trigger { .. }
                }
            )
    }
}

/// Arena slot backing a node: role, links, cached depth, commit state.
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    /// Operand list. Authoritative; the public API exposes it read-only.
    pub(crate) parents: Vec<NodeId>,
    /// Dependent set, deduplicated.
    pub(crate) children: Vec<NodeId>,
    /// Cached topological rank: 0 without parents, else 1 + max parent depth.
    pub(crate) depth: u32,
    /// Whether this node has been back-registered into the child sets of its
    /// already-committed parents.
    pub(crate) legitimate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    #[test]
    fn capability_accessors_follow_the_variant() {
        let input = NodeKind::Input(Value::Int(3));
        assert!(input.is_value_input());
        assert!(!input.is_evaluable());
        assert_eq!(input.value(), Some(&Value::Int(3)));
        assert_eq!(
            input.payload_type(),
            Some(PayloadType::Value(ValueType::Int))
        );

        let trigger = NodeKind::Trigger { provoked: true };
        assert!(trigger.is_trigger_input());
        assert_eq!(trigger.provoked(), Some(true));
        assert_eq!(trigger.value(), None);
    }

    #[test]
    fn extern_placeholders_act_as_inputs_of_their_payload_type() {
        let value_extern = NodeKind::Extern {
            payload: Payload::Value(Value::Double(0.0)),
        };
        assert!(value_extern.is_value_input());
        assert!(!value_extern.is_trigger_input());

        let trigger_extern = NodeKind::Extern {
            payload: Payload::Trigger { provoked: false },
        };
        assert!(trigger_extern.is_trigger_input());
        assert_eq!(trigger_extern.provoked(), Some(false));
    }

    #[test]
    fn outputs_produce_no_payload_type() {
        let output = NodeKind::Output {
            name: "watch".to_string(),
            last: None,
            pending: false,
        };
        assert!(output.is_evaluable());
        assert_eq!(output.payload_type(), None);
    }
}
