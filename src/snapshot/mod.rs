//! Runtime snapshots: externalizing a machine mid-flow and resuming it.
//!
//! A [`Snapshot`] captures the runtime state a machine needs to resume —
//! the active leaf, the active path, the visited set, and an encoded copy
//! of the user context. It does not include the definition; the restoring
//! site supplies the same definition by identity of state and transition
//! ids. Restoring never replays entry hooks.

mod error;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::StateId;
use crate::machine::Machine;

pub use error::SnapshotError;

/// Serializable record of a machine's runtime state.
///
/// The canonical text encoding is JSON with the field names below; unknown
/// extra fields are ignored by readers, and `visited`/`context`/`taken_at`
/// are omitted when empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Active leaf at capture time.
    pub current: StateId,
    /// Active path, root to leaf.
    pub active_path: Vec<StateId>,
    /// States entered since the machine last started, sorted for a
    /// deterministic encoding.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visited: Vec<StateId>,
    /// Encoded user context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    /// When the snapshot was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,
}

impl<C: Send + 'static> Machine<C> {
    /// Capture a deep copy of the current runtime state.
    pub fn snapshot(&self) -> Result<Snapshot, SnapshotError>
    where
        C: Serialize,
    {
        let (current, active_path, mut visited) = {
            let rt = self.engine.runtime.read();
            (
                rt.current.clone(),
                rt.active_path.clone(),
                rt.visited.iter().cloned().collect::<Vec<_>>(),
            )
        };
        visited.sort();

        let context = {
            let ctx = self.engine.context.lock();
            serde_json::to_value(&*ctx)
                .map_err(|err| SnapshotError::ContextEncodeFailed(err.to_string()))?
        };

        Ok(Snapshot {
            current,
            active_path,
            visited,
            context: Some(context),
            taken_at: Some(Utc::now()),
        })
    }

    /// Capture a snapshot in its canonical JSON encoding.
    pub fn snapshot_json(&self) -> Result<String, SnapshotError>
    where
        C: Serialize,
    {
        let snapshot = self.snapshot()?;
        serde_json::to_string(&snapshot).map_err(|err| SnapshotError::EncodeFailed(err.to_string()))
    }

    /// Resume a stopped machine from a snapshot, without running any entry
    /// hooks.
    ///
    /// The snapshot is validated against the definition's hierarchy before
    /// anything is installed: the current state and every path member must
    /// be known, and the path must equal the parent chain computed for the
    /// current state. On success the machine is running, with a fresh event
    /// queue.
    pub async fn restore(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>
    where
        C: DeserializeOwned,
    {
        let _gate = self.gate.lock().await;
        if self.engine.runtime.read().started {
            return Err(SnapshotError::MachineRunning);
        }

        let def = &self.engine.def;
        if def.state(&snapshot.current).is_none() {
            return Err(SnapshotError::UnknownCurrent(snapshot.current.clone()));
        }
        for sid in &snapshot.active_path {
            if def.state(sid).is_none() {
                return Err(SnapshotError::UnknownInPath(sid.clone()));
            }
        }
        if def.path_to(&snapshot.current) != snapshot.active_path {
            return Err(SnapshotError::PathInconsistent);
        }

        if let Some(value) = &snapshot.context {
            let decoded: C = serde_json::from_value(value.clone())
                .map_err(|err| SnapshotError::ContextDecodeFailed(err.to_string()))?;
            *self.engine.context.lock() = decoded;
        }

        self.spawn_lifecycle();
        {
            let mut rt = self.engine.runtime.write();
            rt.current = snapshot.current.clone();
            rt.active_path = snapshot.active_path.clone();
            rt.visited = snapshot.visited.iter().cloned().collect();
            rt.started = true;
        }

        info!(
            machine = %self.engine.def.name(),
            leaf = %snapshot.current,
            "machine restored from snapshot"
        );
        Ok(())
    }

    /// Resume from a snapshot in its canonical JSON encoding.
    pub async fn restore_json(&self, data: &str) -> Result<(), SnapshotError>
    where
        C: DeserializeOwned,
    {
        let snapshot: Snapshot = serde_json::from_str(data)
            .map_err(|err| SnapshotError::DecodeFailed(err.to_string()))?;
        self.restore(&snapshot).await
    }
}
