//! Identifiers, events, and the callback signatures shared across the crate.
//!
//! States and events are addressed by plain string identifiers so that
//! definitions can be assembled from data as well as from code. Hooks,
//! guards, and actions are stored behind [`Arc`] so a single built
//! [`Definition`](crate::Definition) can drive any number of machines.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Identifier of a state, unique within a definition.
pub type StateId = String;

/// Name of an event.
pub type EventId = String;

/// A single positional event argument, opaque to the engine.
pub type EventArg = Box<dyn Any + Send>;

/// Error type returned by hooks and actions.
///
/// The engine never inspects the error beyond its message, which is
/// preserved verbatim in the resulting
/// [`MachineError`](crate::MachineError).
pub type HookError = Box<dyn Error + Send + Sync>;

/// Entry/exit hook: receives the triggering event and the machine context.
pub type HookFn<C> = Arc<dyn Fn(&Event, &mut C) -> Result<(), HookError> + Send + Sync>;

/// Guard predicate: side-effect free, gates a transition's eligibility.
pub type GuardFn<C> = Arc<dyn Fn(&Event, &C) -> bool + Send + Sync>;

/// Transition action: runs between the exit and entry phases.
pub type ActionFn<C> = Arc<dyn Fn(&Event, &mut C) -> Result<(), HookError> + Send + Sync>;

/// An event submitted to a machine: a name plus positional arguments.
///
/// Arguments are handed to guards and actions verbatim; the engine never
/// looks inside them.
///
/// # Example
///
/// ```
/// use canopy::Event;
///
/// let plain = Event::new("coin");
/// let with_args = Event::with_args("deposit", vec![Box::new(25u32)]);
/// assert_eq!(with_args.arg::<u32>(0), Some(&25));
/// assert!(plain.arg::<u32>(0).is_none());
/// ```
pub struct Event {
    /// Event name, matched against transition keys.
    pub name: EventId,
    /// Positional arguments, opaque to the engine.
    pub args: Vec<EventArg>,
}

impl Event {
    /// Create an event with no arguments.
    pub fn new(name: impl Into<EventId>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Create an event carrying positional arguments.
    pub fn with_args(name: impl Into<EventId>, args: Vec<EventArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// The event-less value passed to lifecycle hooks and auto-advance
    /// guard probes.
    pub fn empty() -> Self {
        Self::new("")
    }

    /// Downcast the argument at `idx` to a concrete type.
    pub fn arg<T: 'static>(&self, idx: usize) -> Option<&T> {
        self.args.get(idx).and_then(|a| a.downcast_ref::<T>())
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("args", &self.args.len())
            .finish()
    }
}
