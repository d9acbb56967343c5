//! Ordered action batches applied atomically to a slate.

use crate::action::Action;
use crate::error::SlateError;
use crate::logger::{or_noop, Logger};
use crate::report::Report;
use crate::slate::Slate;

/// An ordered sequence of actions terminated by a single Finish step.
///
/// A formula is the unit of atomic application: `perform` runs the actions
/// in order against one [`Report`], and any failure aborts the remainder.
/// Actions already performed stay applied — callers needing rollback must
/// order their edits so nothing shared is mutated before a fallible action.
#[derive(Debug, Clone)]
pub struct Formula {
    actions: Vec<Action>,
}

impl Formula {
    /// Builds a formula from staged actions, appending the trailing Finish
    /// if it is not already present.
    pub(crate) fn from_actions(mut actions: Vec<Action>) -> Self {
        if !actions.last().map(Action::is_finish).unwrap_or(false) {
            actions.push(Action::finish());
        }
        Self { actions }
    }

    /// The actions in execution order, including the trailing Finish.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Number of actions, including the trailing Finish.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// A formula always carries at least its Finish step.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Concatenates two formulas built against the same slate.
    ///
    /// The inner Finish is dropped so evaluation and trigger reset happen
    /// once for the combined batch: triggers provoked by `self` stay provoked
    /// while `other`'s actions read them.
    pub fn join(mut self, other: Formula) -> Formula {
        while self.actions.last().map(Action::is_finish).unwrap_or(false) {
            self.actions.pop();
        }
        self.actions.extend(other.actions);
        Formula::from_actions(self.actions)
    }

    /// Performs every action in order against `slate`, collecting outputs
    /// into the returned [`Report`].
    ///
    /// On failure the remaining actions are skipped; staged nodes that never
    /// got committed are discarded either way.
    pub fn perform(
        self,
        slate: &mut Slate,
        logger: Option<&dyn Logger>,
    ) -> Result<Report, SlateError> {
        let logger = or_noop(logger);
        logger.on_formula_start(self.actions.len());
        let mut report = Report::default();
        let mut outcome = Ok(());
        for action in &self.actions {
            logger.on_action_start(action.name());
            if let Err(e) = action.perform(slate, &mut report, logger) {
                outcome = Err(e);
                break;
            }
            logger.on_action_end(action.name());
        }
        for action in &self.actions {
            slate.discard_staged(action.staged());
        }
        outcome.map(|()| report)
    }
}
