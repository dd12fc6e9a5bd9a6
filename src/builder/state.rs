//! Fluent configuration for a single state.

use std::sync::Arc;

use crate::core::{Definition, Event, HookError, HookFn, StateId};

/// Declarative description of one state, passed to
/// [`DefinitionBuilder::state`](crate::DefinitionBuilder::state).
///
/// Specs are merged field-by-field: declaring the same id twice accretes
/// options onto the existing descriptor instead of replacing it.
///
/// # Example
///
/// ```
/// use canopy::{DefinitionBuilder, StateSpec};
///
/// let def: canopy::Definition<()> = DefinitionBuilder::new("doc")
///     .state(
///         StateSpec::new("draft")
///             .initial()
///             .description("being written")
///             .on_entry(|_event, _ctx| Ok(())),
///     )
///     .state(StateSpec::new("published").terminal())
///     .current("draft")
///     .build()
///     .unwrap();
/// assert!(def.state("draft").is_some());
/// ```
pub struct StateSpec<C> {
    pub(crate) id: StateId,
    pub(crate) description: Option<String>,
    pub(crate) on_entry: Option<HookFn<C>>,
    pub(crate) on_exit: Option<HookFn<C>>,
    pub(crate) initial: bool,
    pub(crate) terminal: bool,
    pub(crate) sub_def: Option<Definition<C>>,
}

impl<C> StateSpec<C> {
    /// Start a spec for the state `id`.
    pub fn new(id: impl Into<StateId>) -> Self {
        Self {
            id: id.into(),
            description: None,
            on_entry: None,
            on_exit: None,
            initial: false,
            terminal: false,
            sub_def: None,
        }
    }

    /// Human-readable description.
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Hook invoked whenever the state is entered.
    pub fn on_entry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Event, &mut C) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.on_entry = Some(Arc::new(hook));
        self
    }

    /// Hook invoked whenever the state is exited.
    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Event, &mut C) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.on_exit = Some(Arc::new(hook));
        self
    }

    /// Mark this as an entry state.
    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    /// Mark this as a terminal state.
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Attach a sub-definition, turning the state into a composite.
    ///
    /// Every state of `sub` is folded into the enclosing definition:
    /// parentless sub-states become children of this state, nested ones are
    /// inserted unchanged, and all sub-transitions are copied over. The
    /// composite's initial child defaults to the sub-definition's declared
    /// current state.
    pub fn sub_definition(mut self, sub: Definition<C>) -> Self {
        self.sub_def = Some(sub);
        self
    }
}
