//! Fluent configuration for a single transition.

use std::sync::Arc;

use crate::core::{ActionFn, Event, EventId, GuardFn, HookError, StateId, TransitionKey};

/// Declarative description of one transition, passed to
/// [`DefinitionBuilder::on`](crate::DefinitionBuilder::on).
///
/// At most one transition may leave a state for a given event. Declaring
/// the same `(source, event)` pair again with the same target merges the
/// new guard/action onto the existing transition; a different target is a
/// build error.
///
/// # Example
///
/// ```
/// use canopy::TransitionSpec;
///
/// let spec: TransitionSpec<u32> = TransitionSpec::new("deposit", "idle", "holding")
///     .guard(|event, balance| event.arg::<u32>(0).is_some() && *balance < 100)
///     .action(|event, balance| {
///         *balance += event.arg::<u32>(0).copied().unwrap_or(0);
///         Ok(())
///     });
/// ```
pub struct TransitionSpec<C> {
    pub(crate) key: TransitionKey,
    pub(crate) to: StateId,
    pub(crate) guard: Option<GuardFn<C>>,
    pub(crate) action: Option<ActionFn<C>>,
}

impl<C> TransitionSpec<C> {
    /// Start a spec for `event` taking `from` to `to`.
    pub fn new(
        event: impl Into<EventId>,
        from: impl Into<StateId>,
        to: impl Into<StateId>,
    ) -> Self {
        Self {
            key: TransitionKey::new(from, event),
            to: to.into(),
            guard: None,
            action: None,
        }
    }

    /// Predicate gating the transition's eligibility. Guards must be free
    /// of side effects; they may run without the transition firing.
    pub fn guard<F>(mut self, pred: F) -> Self
    where
        F: Fn(&Event, &C) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(pred));
        self
    }

    /// Side-effecting callback run between the exit and entry phases. A
    /// returned error aborts the transition and rolls the exited states
    /// back.
    pub fn action<F>(mut self, act: F) -> Self
    where
        F: Fn(&Event, &mut C) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(act));
        self
    }
}
