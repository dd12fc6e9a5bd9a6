//! Immutable state and transition descriptors.

use std::fmt;

use crate::core::event::{ActionFn, EventId, GuardFn, HookFn, StateId};

/// Descriptor of a single state, frozen once its definition is built.
pub struct StateDef<C> {
    /// Unique identifier within the definition.
    pub id: StateId,
    /// Optional human-readable description.
    pub description: String,
    /// Hook run when the state is entered.
    pub on_entry: Option<HookFn<C>>,
    /// Hook run when the state is exited.
    pub on_exit: Option<HookFn<C>>,
    /// Parent state; `None` for top-level states.
    pub parent: Option<StateId>,
    /// Child states; non-empty makes this a composite.
    pub children: Vec<StateId>,
    /// The child entered when this composite is activated. Required iff
    /// `children` is non-empty.
    pub initial_child: Option<StateId>,
    /// Marks an entry state.
    pub initial: bool,
    /// Marks a terminal state.
    pub terminal: bool,
}

impl<C> StateDef<C> {
    pub(crate) fn new(id: StateId) -> Self {
        Self {
            id,
            description: String::new(),
            on_entry: None,
            on_exit: None,
            parent: None,
            children: Vec::new(),
            initial_child: None,
            initial: false,
            terminal: false,
        }
    }

    /// A state with children is a composite; being in it means being in
    /// exactly one of its children.
    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }
}

impl<C> fmt::Debug for StateDef<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDef")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("initial_child", &self.initial_child)
            .field("initial", &self.initial)
            .field("terminal", &self.terminal)
            .field("on_entry", &self.on_entry.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

/// Identifies one outgoing transition: at most one transition may leave a
/// state for a given event.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransitionKey {
    /// Source state.
    pub from: StateId,
    /// Triggering event name.
    pub event: EventId,
}

impl TransitionKey {
    pub fn new(from: impl Into<StateId>, event: impl Into<EventId>) -> Self {
        Self {
            from: from.into(),
            event: event.into(),
        }
    }
}

impl fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}--{}", self.from, self.event)
    }
}

/// Descriptor of a single transition, frozen once its definition is built.
pub struct TransitionDef<C> {
    /// Source state and event name.
    pub key: TransitionKey,
    /// Target state.
    pub to: StateId,
    /// Optional eligibility predicate.
    pub guard: Option<GuardFn<C>>,
    /// Optional action, run between the exit and entry phases.
    pub action: Option<ActionFn<C>>,
}

impl<C> fmt::Debug for TransitionDef<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionDef")
            .field("key", &self.key)
            .field("to", &self.to)
            .field("guard", &self.guard.is_some())
            .field("action", &self.action.is_some())
            .finish()
    }
}
