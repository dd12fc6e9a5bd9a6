//! Fluent accumulation and validation of state machine definitions.

use std::collections::HashMap;

use crate::builder::error::BuildError;
use crate::builder::state::StateSpec;
use crate::builder::transition::TransitionSpec;
use crate::core::{Definition, StateDef, StateId, TransitionDef, TransitionKey};

/// Fluent builder producing an immutable [`Definition`].
///
/// States and transitions accumulate in any order; nothing is checked until
/// [`build`](Self::build), which validates the whole graph and either
/// returns the frozen definition or the first violation found. The fluent
/// surface itself never fails: errors discovered mid-chain (duplicate ids
/// or transition keys during a sub-definition merge) are deferred to
/// `build`.
///
/// # Example
///
/// ```
/// use canopy::{DefinitionBuilder, StateSpec, TransitionSpec};
///
/// let def: canopy::Definition<()> = DefinitionBuilder::new("turnstile")
///     .state(StateSpec::new("locked").initial())
///     .state(StateSpec::new("unlocked").terminal())
///     .on(TransitionSpec::new("coin", "locked", "unlocked"))
///     .on(TransitionSpec::new("push", "unlocked", "locked"))
///     .current("locked")
///     .build()
///     .unwrap();
/// assert_eq!(def.name(), "turnstile");
/// ```
pub struct DefinitionBuilder<C> {
    name: String,
    states: HashMap<StateId, StateDef<C>>,
    transitions: HashMap<TransitionKey, TransitionDef<C>>,
    order: Vec<TransitionKey>,
    current: Option<StateId>,
    deferred: Vec<BuildError>,
}

impl<C> DefinitionBuilder<C> {
    /// Start a builder for a definition named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: HashMap::new(),
            transitions: HashMap::new(),
            order: Vec::new(),
            current: None,
            deferred: Vec::new(),
        }
    }

    /// Declare or refine a state. Idempotent on the id: a later spec for
    /// the same state merges its options into the existing descriptor.
    pub fn state(mut self, spec: StateSpec<C>) -> Self {
        let mut def = self
            .states
            .remove(&spec.id)
            .unwrap_or_else(|| StateDef::new(spec.id.clone()));

        if let Some(text) = spec.description {
            def.description = text;
        }
        if let Some(hook) = spec.on_entry {
            def.on_entry = Some(hook);
        }
        if let Some(hook) = spec.on_exit {
            def.on_exit = Some(hook);
        }
        if spec.initial {
            def.initial = true;
        }
        if spec.terminal {
            def.terminal = true;
        }
        if let Some(sub) = spec.sub_def {
            self.merge_sub_definition(&mut def, sub);
        }

        self.states.insert(def.id.clone(), def);
        self
    }

    /// Record a transition. The same `(source, event)` key may be declared
    /// again with the same target to layer on a guard or action; a
    /// different target is a fatal build error.
    pub fn on(mut self, spec: TransitionSpec<C>) -> Self {
        match self.transitions.get_mut(&spec.key) {
            Some(existing) => {
                if existing.to != spec.to {
                    self.deferred.push(BuildError::DuplicateTransitionKey(spec.key));
                    return self;
                }
                if let Some(guard) = spec.guard {
                    existing.guard = Some(guard);
                }
                if let Some(action) = spec.action {
                    existing.action = Some(action);
                }
            }
            None => {
                self.order.push(spec.key.clone());
                self.transitions.insert(
                    spec.key.clone(),
                    TransitionDef {
                        key: spec.key,
                        to: spec.to,
                        guard: spec.guard,
                        action: spec.action,
                    },
                );
            }
        }
        self
    }

    /// Name the anchor state of the initial configuration.
    pub fn current(mut self, id: impl Into<StateId>) -> Self {
        self.current = Some(id.into());
        self
    }

    /// Set or override a composite's initial descent target.
    pub fn initial_child(mut self, parent: impl Into<StateId>, child: impl Into<StateId>) -> Self {
        let parent = parent.into();
        let entry = self
            .states
            .entry(parent.clone())
            .or_insert_with(|| StateDef::new(parent));
        entry.initial_child = Some(child.into());
        self
    }

    /// Fold a sub-definition into `composite`, reparenting its top-level
    /// states and copying its transitions. Collisions are fatal and refuse
    /// the merge rather than overwrite.
    fn merge_sub_definition(&mut self, composite: &mut StateDef<C>, sub: Definition<C>) {
        let (mut sub_states, mut sub_transitions, sub_order, sub_current) = sub.into_parts();

        let mut sub_ids: Vec<StateId> = sub_states.keys().cloned().collect();
        sub_ids.sort();
        for sid in sub_ids {
            if sid == composite.id || self.states.contains_key(&sid) {
                self.deferred.push(BuildError::DuplicateStateOnMerge {
                    composite: composite.id.clone(),
                    state: sid,
                });
                continue;
            }
            let mut sdef = sub_states.remove(&sid).expect("sub state present");
            if sdef.parent.is_none() {
                sdef.parent = Some(composite.id.clone());
                composite.children.push(sid.clone());
            }
            self.states.insert(sid, sdef);
        }
        if composite.initial_child.is_none() {
            composite.initial_child = Some(sub_current);
        }

        for key in sub_order {
            let t = sub_transitions.remove(&key).expect("sub transition present");
            if self.transitions.contains_key(&key) {
                self.deferred.push(BuildError::DuplicateTransitionKey(key));
                continue;
            }
            self.order.push(key.clone());
            self.transitions.insert(key, t);
        }
    }

    /// Validate the accumulated graph and freeze it into a [`Definition`].
    pub fn build(self) -> Result<Definition<C>, BuildError> {
        let Self {
            name,
            states,
            transitions,
            order,
            current,
            mut deferred,
        } = self;

        if !deferred.is_empty() {
            return Err(deferred.remove(0));
        }

        let current = current.ok_or(BuildError::CurrentNotSet)?;
        if !states.contains_key(&current) {
            return Err(BuildError::CurrentNotDefined(current));
        }
        if !states.values().any(|s| s.initial) {
            return Err(BuildError::NoInitialState);
        }
        if !states.values().any(|s| s.terminal) {
            return Err(BuildError::NoFinalState);
        }

        for key in &order {
            let t = &transitions[key];
            if !states.contains_key(&key.from) {
                return Err(BuildError::TransitionFromUndefined(key.from.clone()));
            }
            if !states.contains_key(&t.to) {
                return Err(BuildError::TransitionToUndefined(t.to.clone()));
            }
            if key.event.is_empty() {
                return Err(BuildError::EmptyEventName(key.from.clone()));
            }
        }

        let mut ids: Vec<&StateId> = states.keys().collect();
        ids.sort();
        for id in ids {
            let st = &states[id];
            if st.is_composite() {
                let initial_child = st
                    .initial_child
                    .as_ref()
                    .ok_or_else(|| BuildError::CompositeMissingInitialChild(id.clone()))?;
                if !st.children.contains(initial_child) {
                    return Err(BuildError::InitialChildNotAChild {
                        composite: id.clone(),
                        child: initial_child.clone(),
                    });
                }
                for child in &st.children {
                    let ok = states
                        .get(child)
                        .is_some_and(|c| c.parent.as_deref() == Some(id.as_str()));
                    if !ok {
                        return Err(BuildError::ChildParentMismatch {
                            composite: id.clone(),
                            child: child.clone(),
                        });
                    }
                }
            }
            if let Some(parent) = &st.parent {
                if !states.contains_key(parent) {
                    return Err(BuildError::MissingParent {
                        state: id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        Ok(Definition::new(name, states, transitions, order, current))
    }
}
