//! Fluent construction of state machine definitions.
//!
//! A [`DefinitionBuilder`] accumulates [`StateSpec`]s and
//! [`TransitionSpec`]s, then validates the whole graph in
//! [`build`](DefinitionBuilder::build). Composite states are formed by
//! attaching an already-built sub-definition to a state spec; the builder
//! folds the sub-definition's states and transitions into the enclosing
//! namespace.

mod definition;
mod error;
mod state;
mod transition;

pub use definition::DefinitionBuilder;
pub use error::BuildError;
pub use state::StateSpec;
pub use transition::TransitionSpec;
