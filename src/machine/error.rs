//! Runtime errors.

use thiserror::Error;

use crate::core::{EventId, StateId};

/// Errors surfaced by machine lifecycle and dispatch operations.
///
/// Hook and action failures preserve the underlying callback's message
/// verbatim.
#[derive(Debug, Error)]
pub enum MachineError {
    /// The operation requires a running machine.
    #[error("machine not started")]
    NotStarted,

    /// The machine shut down while the operation was queued or submitted.
    #[error("machine stopped")]
    Stopped,

    /// No outgoing transition matched the event along the active path, or
    /// every candidate's guard rejected it.
    #[error("no transition matched event '{event}'")]
    NoTransition { event: EventId },

    /// An entry or exit hook returned an error.
    #[error("hook failed in state '{state}': {message}")]
    HookFailed { state: StateId, message: String },

    /// A transition action returned an error; the exited states were
    /// re-entered.
    #[error("action failed for event '{event}': {message}")]
    ActionFailed { event: EventId, message: String },

    /// Auto-advance found more than one outgoing transition at some level
    /// of the active path.
    #[error("multiple transitions available from '{state}', cannot auto-advance")]
    MultipleTransitions { state: StateId },

    /// Auto-advance found no satisfiable transition on the active path.
    #[error("no available transition from the active path")]
    NoAvailableTransition,
}
