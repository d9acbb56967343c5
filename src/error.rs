//! Error taxonomy for graph edits, staging, and optimization.
//!
//! Every error is raised at the point the violating edit is attempted —
//! construction time for actions, add time for graph edits — never from
//! inside the evaluation drain. Errors are tagged with node identities;
//! source locations belong to the upstream parser.

use thiserror::Error;

use crate::node::NodeId;

/// Errors produced by the graph, the staging layer, and the optimizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlateError {
    /// Adding the child would make a node reachable from itself.
    #[error("adding {child} as a child of {parent} would create a cycle")]
    GraphCycle {
        /// The node the child was being added to.
        parent: NodeId,
        /// The candidate child.
        child: NodeId,
    },

    /// The name is already bound to a non-placeholder node.
    #[error("name `{name}` is already defined")]
    NameConflict {
        /// The conflicting name.
        name: String,
    },

    /// A cast or assignment between incompatible node or data types.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// What the operation required.
        expected: String,
        /// What it was given.
        found: String,
    },

    /// A name was not found in scope.
    #[error("unresolved identifier `{name}`")]
    UnresolvedIdentifier {
        /// The unresolved name.
        name: String,
    },

    /// An optimizer rule violated root safety or left dangling links.
    ///
    /// This is an internal bug signal and always aborts the whole
    /// optimize/commit operation.
    #[error("optimizer invariant violated: {detail}")]
    OptimizerInvariant {
        /// Diagnostic context: the offending node, its links, and the
        /// staged set.
        detail: String,
    },

    /// The rule loop failed to reach a fixed point within the pass cap.
    #[error("optimizer failed to reach a fixed point after {passes} passes")]
    OptimizerDiverged {
        /// The pass cap that was exceeded.
        passes: usize,
    },
}
