//! Build-time validation errors.

use thiserror::Error;

use crate::core::{StateId, TransitionKey};

/// Errors reported by [`DefinitionBuilder::build`](crate::DefinitionBuilder::build).
///
/// Each variant names the offending identifier; a definition that builds
/// without error satisfies every structural invariant the runtime relies on.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("current state not set")]
    CurrentNotSet,

    #[error("current state '{0}' not defined")]
    CurrentNotDefined(StateId),

    #[error("at least one state must be marked initial")]
    NoInitialState,

    #[error("at least one state must be marked terminal")]
    NoFinalState,

    #[error("transition from undefined state '{0}'")]
    TransitionFromUndefined(StateId),

    #[error("transition to undefined state '{0}'")]
    TransitionToUndefined(StateId),

    #[error("transition from '{0}' has an empty event name")]
    EmptyEventName(StateId),

    #[error("composite state '{0}' requires an initial child")]
    CompositeMissingInitialChild(StateId),

    #[error("initial child '{child}' is not a child of '{composite}'")]
    InitialChildNotAChild { composite: StateId, child: StateId },

    #[error("child '{child}' of '{composite}' is undefined or names a different parent")]
    ChildParentMismatch { composite: StateId, child: StateId },

    #[error("state '{state}' references missing parent '{parent}'")]
    MissingParent { state: StateId, parent: StateId },

    #[error("duplicate state id '{state}' when merging sub-definition into '{composite}'")]
    DuplicateStateOnMerge { composite: StateId, state: StateId },

    #[error("duplicate transition '{0}' with conflicting definition")]
    DuplicateTransitionKey(TransitionKey),
}
