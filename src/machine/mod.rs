//! The runtime machine: lifecycle, dispatch, and observation.
//!
//! A [`Machine`] interprets one immutable [`Definition`](crate::Definition).
//! While running, a single dispatcher task owns the mutable runtime state;
//! callers submit events through a bounded FIFO queue, either waiting for
//! the outcome ([`Machine::dispatch`]) or fire-and-forget
//! ([`Machine::dispatch_async`]). Every attempt is reported to registered
//! [`Subscriber`]s.

mod error;
mod runtime;
mod subscriber;

pub use error::MachineError;
pub use runtime::{Machine, DEFAULT_QUEUE_CAPACITY};
pub use subscriber::{Subscriber, TransitionLog, TransitionRecord};
