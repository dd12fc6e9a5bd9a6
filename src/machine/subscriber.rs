//! Observation of transition attempts.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::{Event, EventId, StateId};
use crate::machine::error::MachineError;

/// Observer of every transition attempt, successful or not.
///
/// The machine invokes [`on_transition`](Self::on_transition) on the
/// dispatcher after the attempt resolves and before the synchronous
/// caller's result is delivered. A successful transition reports
/// `error = None`; a rejected or failed one reports `from == to ==` the
/// current leaf and the error that stopped it.
///
/// Subscribers must not call back into the machine synchronously from the
/// callback — the dispatcher is blocked for its duration.
/// [`dispatch_async`](crate::Machine::dispatch_async) is safe to call.
pub trait Subscriber: Send + Sync {
    fn on_transition(&self, from: &StateId, to: &StateId, event: &Event, error: Option<&MachineError>);
}

/// One observed transition attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Leaf before the attempt.
    pub from: StateId,
    /// Leaf after the attempt; equals `from` when nothing changed.
    pub to: StateId,
    /// Name of the triggering event.
    pub event: EventId,
    /// Error message when the attempt was rejected or failed.
    pub error: Option<String>,
    /// When the attempt resolved.
    pub timestamp: DateTime<Utc>,
}

/// A [`Subscriber`] that records every attempt in order.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use canopy::TransitionLog;
///
/// let log = Arc::new(TransitionLog::new());
/// // machine.subscribe(log.clone());
/// assert!(log.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct TransitionLog {
    records: Mutex<Vec<TransitionRecord>>,
}

impl TransitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded attempts, oldest first.
    pub fn records(&self) -> Vec<TransitionRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Subscriber for TransitionLog {
    fn on_transition(&self, from: &StateId, to: &StateId, event: &Event, error: Option<&MachineError>) {
        self.records.lock().push(TransitionRecord {
            from: from.clone(),
            to: to.clone(),
            event: event.name.clone(),
            error: error.map(|e| e.to_string()),
            timestamp: Utc::now(),
        });
    }
}
