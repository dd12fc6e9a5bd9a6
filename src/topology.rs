//! Topological analysis of the transition graph.
//!
//! Every declared state is a node (isolated states included); every
//! transition contributes a `from -> to` edge. A topological order exists
//! iff the graph is acyclic. Ties among unordered states are broken by
//! inserting nodes in lexicographic id order, so the emitted order is
//! deterministic for a given definition.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use thiserror::Error;

use crate::core::{Definition, StateId};

/// Topology failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// The transition graph contains a cycle; no linear order exists.
    #[error("state graph contains a cycle, no topological order exists")]
    CycleDetected,
}

/// A linear order over states consistent with the transition graph.
///
/// Obtained from [`Definition::topology`], which memoizes the result for
/// the definition's lifetime.
#[derive(Debug, Clone)]
pub struct Topology {
    order: Vec<StateId>,
    position: HashMap<StateId, usize>,
}

impl Topology {
    /// States in topological order.
    pub fn order(&self) -> &[StateId] {
        &self.order
    }

    /// Position of a state in the order, if it is part of it.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.position.get(id).copied()
    }

    /// Whether `a` appears strictly before `b`. `false` when either state
    /// is unknown; `is_before(a, a)` is always `false`.
    pub fn is_before(&self, a: &str, b: &str) -> bool {
        match (self.position(a), self.position(b)) {
            (Some(pa), Some(pb)) => pa < pb,
            _ => false,
        }
    }

    /// Whether `a` appears strictly after `b`. `false` when either state
    /// is unknown.
    pub fn is_after(&self, a: &str, b: &str) -> bool {
        match (self.position(a), self.position(b)) {
            (Some(pa), Some(pb)) => pa > pb,
            _ => false,
        }
    }
}

/// Build the topological order for a definition's transition graph.
pub(crate) fn compute<C>(def: &Definition<C>) -> Result<Topology, TopologyError> {
    let mut graph = DiGraph::<StateId, ()>::new();
    let mut nodes = HashMap::with_capacity(def.state_count());

    let mut ids: Vec<&StateId> = def.states().map(|s| &s.id).collect();
    ids.sort();
    for id in ids {
        nodes.insert(id.clone(), graph.add_node(id.clone()));
    }
    for t in def.transitions() {
        graph.add_edge(nodes[&t.key.from], nodes[&t.to], ());
    }

    let sorted = toposort(&graph, None).map_err(|_| TopologyError::CycleDetected)?;
    let order: Vec<StateId> = sorted.into_iter().map(|ix| graph[ix].clone()).collect();
    let position = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i))
        .collect();

    Ok(Topology { order, position })
}
