//! Canopy: hierarchical finite state machines.
//!
//! Canopy separates the immutable *definition* of a state machine from the
//! *machines* that run it. A definition is assembled fluently, validated
//! once, and then shared by reference across any number of runtime
//! machines. States nest: a composite state contains sub-states, and being
//! in a composite means being in exactly one of its children.
//!
//! # Core Concepts
//!
//! - **Definition**: the validated, read-only state graph with hooks,
//!   guards, and actions attached
//! - **Machine**: a running interpreter with a single dispatcher handling
//!   events strictly in FIFO order
//! - **Bubbling**: events are resolved against the active path from the
//!   leaf upward, so ancestors can handle what their children do not
//! - **Snapshot**: a serializable record of runtime state, sufficient to
//!   resume a machine without replaying entry hooks
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use canopy::{DefinitionBuilder, Event, Machine, StateSpec, TransitionSpec};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let def = DefinitionBuilder::new("turnstile")
//!     .state(StateSpec::new("locked").initial().description("coin required"))
//!     .state(StateSpec::new("unlocked").terminal())
//!     .on(TransitionSpec::new("coin", "locked", "unlocked"))
//!     .on(TransitionSpec::new("push", "unlocked", "locked"))
//!     .current("locked")
//!     .build()
//!     .unwrap();
//!
//! let machine = Machine::new(Arc::new(def), ());
//! machine.start().await.unwrap();
//! machine.dispatch(Event::new("coin")).await.unwrap();
//! assert_eq!(machine.current(), "unlocked");
//! machine.stop().await.unwrap();
//! # }
//! ```

pub mod builder;
pub mod core;
pub mod machine;
pub mod snapshot;
pub mod topology;

// Re-export commonly used types
pub use crate::builder::{BuildError, DefinitionBuilder, StateSpec, TransitionSpec};
pub use crate::core::{Definition, Event, EventArg, EventId, HookError, StateId, TransitionKey};
pub use crate::machine::{Machine, MachineError, Subscriber, TransitionLog, TransitionRecord};
pub use crate::snapshot::{Snapshot, SnapshotError};
pub use crate::topology::{Topology, TopologyError};
