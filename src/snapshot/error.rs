//! Snapshot and restore errors.

use thiserror::Error;

use crate::core::StateId;

/// Errors from capturing or restoring runtime snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Restore requires a stopped machine.
    #[error("machine must be stopped before restoring")]
    MachineRunning,

    /// The snapshot's current state is not part of the definition.
    #[error("snapshot refers to unknown current state '{0}'")]
    UnknownCurrent(StateId),

    /// A state in the snapshot's active path is not part of the definition.
    #[error("snapshot refers to unknown state '{0}' in the active path")]
    UnknownInPath(StateId),

    /// The snapshot's active path disagrees with the hierarchy computed
    /// from the definition's parent links.
    #[error("snapshot active path does not match the definition's hierarchy")]
    PathInconsistent,

    /// The machine context could not be encoded into the snapshot.
    #[error("failed to encode snapshot context: {0}")]
    ContextEncodeFailed(String),

    /// The snapshot's context value could not be decoded into the
    /// machine's context type.
    #[error("failed to decode snapshot context: {0}")]
    ContextDecodeFailed(String),

    /// The snapshot could not be serialized to its text encoding.
    #[error("failed to encode snapshot: {0}")]
    EncodeFailed(String),

    /// The text encoding was malformed.
    #[error("failed to decode snapshot: {0}")]
    DecodeFailed(String),
}
