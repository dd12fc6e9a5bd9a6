//! The built, read-only state machine definition.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::core::event::StateId;
use crate::core::state::{StateDef, TransitionDef, TransitionKey};
use crate::topology::{self, Topology, TopologyError};

/// A validated, immutable state machine definition.
///
/// Produced by [`DefinitionBuilder::build`](crate::DefinitionBuilder::build)
/// and shared by reference across any number of runtime machines. All
/// lookups are by id; hierarchy walks follow parent links and
/// `initial_child` descent.
pub struct Definition<C> {
    name: String,
    states: HashMap<StateId, StateDef<C>>,
    transitions: HashMap<TransitionKey, TransitionDef<C>>,
    /// Transition keys in declaration order; the source of ordering for the
    /// outgoing index and the topology edges.
    transition_order: Vec<TransitionKey>,
    outgoing: HashMap<StateId, Vec<TransitionKey>>,
    current: StateId,
    topology: OnceLock<Result<Topology, TopologyError>>,
}

impl<C> Definition<C> {
    pub(crate) fn new(
        name: String,
        states: HashMap<StateId, StateDef<C>>,
        transitions: HashMap<TransitionKey, TransitionDef<C>>,
        transition_order: Vec<TransitionKey>,
        current: StateId,
    ) -> Self {
        let mut outgoing: HashMap<StateId, Vec<TransitionKey>> = HashMap::new();
        for key in &transition_order {
            outgoing
                .entry(key.from.clone())
                .or_default()
                .push(key.clone());
        }
        Self {
            name,
            states,
            transitions,
            transition_order,
            outgoing,
            current,
            topology: OnceLock::new(),
        }
    }

    /// Definition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared anchor of the initial configuration.
    pub fn current(&self) -> &StateId {
        &self.current
    }

    /// Look up a state by id.
    pub fn state(&self, id: &str) -> Option<&StateDef<C>> {
        self.states.get(id)
    }

    /// All states, in no particular order.
    pub fn states(&self) -> impl Iterator<Item = &StateDef<C>> {
        self.states.values()
    }

    /// Number of states.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Look up a transition by key.
    pub fn transition(&self, key: &TransitionKey) -> Option<&TransitionDef<C>> {
        self.transitions.get(key)
    }

    /// All transitions, in declaration order.
    pub fn transitions(&self) -> impl Iterator<Item = &TransitionDef<C>> {
        self.transition_order
            .iter()
            .filter_map(|key| self.transitions.get(key))
    }

    /// Number of transitions.
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Outgoing transition keys of a state, in declaration order.
    pub fn outgoing(&self, id: &str) -> &[TransitionKey] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Path from the root to `id` inclusive, following parent links.
    pub fn path_to(&self, id: &str) -> Vec<StateId> {
        let mut rev = Vec::new();
        let mut cur = id.to_string();
        loop {
            rev.push(cur.clone());
            match self.states.get(&cur).and_then(|s| s.parent.clone()) {
                Some(parent) => cur = parent,
                None => break,
            }
        }
        rev.reverse();
        rev
    }

    /// Descent chain strictly below `id`: each composite's `initial_child`,
    /// repeated until a leaf.
    pub fn descend_initial(&self, id: &str) -> Vec<StateId> {
        let mut chain = Vec::new();
        let mut cur = id.to_string();
        while let Some(child) = self
            .states
            .get(&cur)
            .filter(|s| s.is_composite())
            .and_then(|s| s.initial_child.clone())
        {
            chain.push(child.clone());
            cur = child;
        }
        chain
    }

    /// The initial configuration: the declared anchor followed by its
    /// `initial_child` descent down to a leaf.
    pub fn initial_path(&self) -> Vec<StateId> {
        let mut path = vec![self.current.clone()];
        path.extend(self.descend_initial(&self.current));
        path
    }

    /// Topological order over the transition graph, computed on first use
    /// and cached for the definition's lifetime.
    pub fn topology(&self) -> Result<&Topology, TopologyError> {
        match self.topology.get_or_init(|| topology::compute(self)) {
            Ok(topo) => Ok(topo),
            Err(err) => Err(err.clone()),
        }
    }

    /// Whether `a` appears before `b` in the topological order. A state
    /// missing from the order is simply "not before"; only a cyclic graph
    /// is an error.
    pub fn is_before(&self, a: &str, b: &str) -> Result<bool, TopologyError> {
        Ok(self.topology()?.is_before(a, b))
    }

    /// Whether `a` appears after `b` in the topological order.
    pub fn is_after(&self, a: &str, b: &str) -> Result<bool, TopologyError> {
        Ok(self.topology()?.is_after(a, b))
    }

    /// Decompose the definition for merging into a composite state.
    pub(crate) fn into_parts(
        self,
    ) -> (
        HashMap<StateId, StateDef<C>>,
        HashMap<TransitionKey, TransitionDef<C>>,
        Vec<TransitionKey>,
        StateId,
    ) {
        (
            self.states,
            self.transitions,
            self.transition_order,
            self.current,
        )
    }
}

impl<C> fmt::Debug for Definition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name)
            .field("states", &self.states.len())
            .field("transitions", &self.transitions.len())
            .field("current", &self.current)
            .finish()
    }
}
