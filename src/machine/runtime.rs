//! The runtime machine: lifecycle, event queue, and transition execution.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::{Definition, Event, StateId, TransitionKey};
use crate::machine::error::MachineError;
use crate::machine::subscriber::Subscriber;

/// Default capacity of the event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Message carried by the event queue: an event plus an optional reply
/// slot for synchronous dispatch, or an auto-advance probe. Auto-advance
/// travels through the queue so its scan-select-and-fire runs on the
/// dispatcher as one unit of work, FIFO-ordered behind earlier events.
pub(crate) enum Envelope {
    Event {
        event: Event,
        reply: Option<oneshot::Sender<Result<(), MachineError>>>,
    },
    AutoAdvance {
        reply: oneshot::Sender<Result<(), MachineError>>,
    },
}

#[derive(Debug)]
pub(crate) struct RuntimeState {
    pub(crate) started: bool,
    pub(crate) current: StateId,
    pub(crate) active_path: Vec<StateId>,
    pub(crate) visited: HashSet<StateId>,
}

/// Channels belonging to one start..stop lifecycle. Recreated on every
/// start so stale events from a previous lifecycle cannot leak into the
/// next one.
pub(crate) struct Lifecycle {
    queue: mpsc::Sender<Envelope>,
    shutdown: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    dispatcher: JoinHandle<()>,
}

/// The shared pieces the dispatcher task works on. Cloning is cheap: every
/// field is an `Arc`.
pub(crate) struct Engine<C> {
    pub(crate) def: Arc<Definition<C>>,
    pub(crate) context: Arc<Mutex<C>>,
    pub(crate) runtime: Arc<RwLock<RuntimeState>>,
    subscribers: Arc<RwLock<Vec<Arc<dyn Subscriber>>>>,
}

impl<C> Clone for Engine<C> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
            context: Arc::clone(&self.context),
            runtime: Arc::clone(&self.runtime),
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<C> Engine<C> {
    fn run_entry(&self, id: &StateId, event: &Event) -> Result<(), MachineError> {
        if let Some(hook) = self.def.state(id).and_then(|s| s.on_entry.as_ref()) {
            let mut ctx = self.context.lock();
            hook(event, &mut ctx).map_err(|err| MachineError::HookFailed {
                state: id.clone(),
                message: err.to_string(),
            })?;
        }
        Ok(())
    }

    fn run_exit(&self, id: &StateId, event: &Event) -> Result<(), MachineError> {
        if let Some(hook) = self.def.state(id).and_then(|s| s.on_exit.as_ref()) {
            let mut ctx = self.context.lock();
            hook(event, &mut ctx).map_err(|err| MachineError::HookFailed {
                state: id.clone(),
                message: err.to_string(),
            })?;
        }
        Ok(())
    }

    fn notify(&self, from: &StateId, to: &StateId, event: &Event, error: Option<&MachineError>) {
        let subs = self.subscribers.read().clone();
        for sub in subs {
            sub.on_transition(from, to, event, error);
        }
    }

    /// Resolve and execute one event. Runs on the dispatcher; exactly one
    /// subscriber notification is emitted per call.
    fn handle_event(&self, event: &Event) -> Result<(), MachineError> {
        let (from, path) = {
            let rt = self.runtime.read();
            if !rt.started {
                return Err(MachineError::Stopped);
            }
            (rt.current.clone(), rt.active_path.clone())
        };

        // Bubble leaf to root for the first admissible transition.
        let mut matched = None;
        for sid in path.iter().rev() {
            let key = TransitionKey::new(sid.clone(), event.name.clone());
            if let Some(t) = self.def.transition(&key) {
                let admitted = match &t.guard {
                    Some(guard) => {
                        let ctx = self.context.lock();
                        guard(event, &ctx)
                    }
                    None => true,
                };
                if admitted {
                    matched = Some(t);
                    break;
                }
            }
        }
        let Some(transition) = matched else {
            let err = MachineError::NoTransition {
                event: event.name.clone(),
            };
            self.notify(&from, &from, event, Some(&err));
            return Err(err);
        };

        let source = &transition.key.from;
        let target = &transition.to;

        // Least common ancestor of source and target; the machine exits
        // everything on the leaf's chain below it (the leaf itself included
        // when bubbling matched an ancestor) and enters the target's chain
        // below it, drilling on into the target's initial descendants.
        let source_path = self.def.path_to(source);
        let target_path = self.def.path_to(target);
        let mut lca = 0;
        while lca < source_path.len()
            && lca < target_path.len()
            && source_path[lca] == target_path[lca]
        {
            lca += 1;
        }

        let leaf_path = self.def.path_to(&from);
        let exit_seq: Vec<StateId> = leaf_path[lca..].iter().rev().cloned().collect();

        let mut entry_seq: Vec<StateId> = if lca < target_path.len() {
            target_path[lca..].to_vec()
        } else {
            vec![target.clone()]
        };
        entry_seq.extend(self.def.descend_initial(target));

        for sid in &exit_seq {
            if let Err(err) = self.run_exit(sid, event) {
                warn!(machine = %self.def.name(), state = %sid, "exit hook failed");
                self.notify(&from, &from, event, Some(&err));
                return Err(err);
            }
        }

        if let Some(action) = &transition.action {
            let result = {
                let mut ctx = self.context.lock();
                action(event, &mut ctx)
            };
            if let Err(cause) = result {
                // Roll back: re-enter the exited states, best effort.
                for sid in exit_seq.iter().rev() {
                    let _ = self.run_entry(sid, event);
                }
                let err = MachineError::ActionFailed {
                    event: event.name.clone(),
                    message: cause.to_string(),
                };
                warn!(machine = %self.def.name(), event = %event.name, "action failed, rolled back");
                self.notify(&from, &from, event, Some(&err));
                return Err(err);
            }
        }

        for (idx, sid) in entry_seq.iter().enumerate() {
            if let Err(err) = self.run_entry(sid, event) {
                // Unwind this phase, then restore the exited states.
                for entered in entry_seq[..idx].iter().rev() {
                    let _ = self.run_exit(entered, event);
                }
                for exited in exit_seq.iter().rev() {
                    let _ = self.run_entry(exited, event);
                }
                warn!(machine = %self.def.name(), state = %sid, "entry hook failed, rolled back");
                self.notify(&from, &from, event, Some(&err));
                return Err(err);
            }
        }

        let leaf = entry_seq
            .last()
            .cloned()
            .expect("entry sequence always contains the target");
        {
            let mut rt = self.runtime.write();
            rt.current = leaf.clone();
            rt.active_path = self.def.path_to(&leaf);
            rt.visited.extend(entry_seq.iter().cloned());
        }

        debug!(
            machine = %self.def.name(),
            from = %from,
            to = %leaf,
            event = %event.name,
            "transition committed"
        );
        self.notify(&from, &leaf, event, None);
        Ok(())
    }

    /// Scan the active path leaf to root for the single available
    /// transition and fire it. Runs on the dispatcher, so the guard probe
    /// and the fired transition see the same configuration.
    fn handle_auto_advance(&self) -> Result<(), MachineError> {
        let path = {
            let rt = self.runtime.read();
            if !rt.started {
                return Err(MachineError::Stopped);
            }
            rt.active_path.clone()
        };
        let probe = Event::empty();
        for sid in path.iter().rev() {
            let keys = self.def.outgoing(sid);
            match keys.len() {
                0 => continue,
                1 => {
                    let t = self
                        .def
                        .transition(&keys[0])
                        .expect("outgoing index keys resolve");
                    let admitted = match &t.guard {
                        Some(guard) => {
                            let ctx = self.context.lock();
                            guard(&probe, &ctx)
                        }
                        None => true,
                    };
                    if admitted {
                        return self.handle_event(&Event::new(t.key.event.clone()));
                    }
                }
                _ => {
                    return Err(MachineError::MultipleTransitions { state: sid.clone() });
                }
            }
        }
        Err(MachineError::NoAvailableTransition)
    }

    /// Dispatcher loop: strict FIFO, one message at a time, drains out on
    /// shutdown leaving queued events unhandled (their sync callers observe
    /// the dropped reply as a stop).
    async fn run(self, mut rx: mpsc::Receiver<Envelope>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                envelope = rx.recv() => match envelope {
                    Some(Envelope::Event { event, reply }) => {
                        let result = self.handle_event(&event);
                        if let Some(reply) = reply {
                            let _ = reply.send(result);
                        }
                    }
                    Some(Envelope::AutoAdvance { reply }) => {
                        let _ = reply.send(self.handle_auto_advance());
                    }
                    None => break,
                },
            }
        }
        debug!(machine = %self.def.name(), "dispatcher drained out");
    }
}

/// A runtime machine interpreting one [`Definition`].
///
/// A single dispatcher task owns the machine's mutable state while it is
/// running; callers interact through a bounded FIFO event queue. Events are
/// handled strictly in enqueue order, one at a time.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use canopy::{DefinitionBuilder, Event, Machine, StateSpec, TransitionSpec};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let def = DefinitionBuilder::new("turnstile")
///     .state(StateSpec::new("locked").initial())
///     .state(StateSpec::new("unlocked").terminal())
///     .on(TransitionSpec::new("coin", "locked", "unlocked"))
///     .current("locked")
///     .build()
///     .unwrap();
///
/// let machine = Machine::new(Arc::new(def), ());
/// machine.start().await.unwrap();
/// machine.dispatch(Event::new("coin")).await.unwrap();
/// assert_eq!(machine.current(), "unlocked");
/// machine.stop().await.unwrap();
/// # }
/// ```
pub struct Machine<C> {
    pub(crate) engine: Engine<C>,
    capacity: usize,
    pub(crate) lifecycle: Mutex<Option<Lifecycle>>,
    /// Serializes start/stop/restore against each other.
    pub(crate) gate: tokio::sync::Mutex<()>,
}

impl<C: Send + 'static> Machine<C> {
    /// Create a machine over `def` with the default queue capacity.
    ///
    /// The machine owns `context` from `start` to `stop`; hooks, guards,
    /// and actions receive it by reference on the dispatcher.
    pub fn new(def: Arc<Definition<C>>, context: C) -> Self {
        Self::with_capacity(def, context, DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a machine with an explicit event queue capacity. A capacity
    /// of zero falls back to [`DEFAULT_QUEUE_CAPACITY`].
    pub fn with_capacity(def: Arc<Definition<C>>, context: C, capacity: usize) -> Self {
        let runtime = RuntimeState {
            started: false,
            current: def.current().clone(),
            active_path: Vec::new(),
            visited: HashSet::new(),
        };
        Self {
            engine: Engine {
                def,
                context: Arc::new(Mutex::new(context)),
                runtime: Arc::new(RwLock::new(runtime)),
                subscribers: Arc::new(RwLock::new(Vec::new())),
            },
            capacity: if capacity == 0 {
                DEFAULT_QUEUE_CAPACITY
            } else {
                capacity
            },
            lifecycle: Mutex::new(None),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Start the machine. A no-op when already started.
    ///
    /// Computes the initial configuration by descending from the declared
    /// anchor through each composite's initial child, runs entry hooks root
    /// to leaf, then spawns the dispatcher. If a hook fails its error is
    /// surfaced and the machine remains stopped.
    pub async fn start(&self) -> Result<(), MachineError> {
        let _gate = self.gate.lock().await;
        if self.engine.runtime.read().started {
            return Ok(());
        }

        let path = self.engine.def.initial_path();
        for sid in &path {
            self.engine.run_entry(sid, &Event::empty())?;
        }

        let leaf = path.last().expect("initial path is never empty").clone();
        // Channels exist before `started` flips, so a submitter that
        // observes a running machine always finds a live queue.
        self.spawn_lifecycle();
        {
            let mut rt = self.engine.runtime.write();
            rt.current = leaf.clone();
            rt.active_path = path.clone();
            rt.visited = path.iter().cloned().collect();
            rt.started = true;
        }

        info!(machine = %self.engine.def.name(), leaf = %leaf, "machine started");
        Ok(())
    }

    /// Stop the machine. A no-op when already stopped.
    ///
    /// Signals shutdown, waits for the dispatcher to finish the event in
    /// flight, then runs exit hooks leaf to root along the active path. A
    /// failing exit hook is returned as an error, but the machine is
    /// stopped regardless.
    pub async fn stop(&self) -> Result<(), MachineError> {
        let _gate = self.gate.lock().await;
        {
            let mut rt = self.engine.runtime.write();
            if !rt.started {
                return Ok(());
            }
            rt.started = false;
        }

        let lifecycle = self.lifecycle.lock().take();
        if let Some(lc) = lifecycle {
            let _ = lc.shutdown.send(true);
            drop(lc.queue);
            let _ = lc.dispatcher.await;
        }

        let path = self.engine.runtime.read().active_path.clone();
        for sid in path.iter().rev() {
            self.engine.run_exit(sid, &Event::empty())?;
        }

        info!(machine = %self.engine.def.name(), "machine stopped");
        Ok(())
    }

    /// Submit an event and wait for it to be fully applied or refused.
    ///
    /// Returns the outcome of the transition attempt: `Ok` on commit, or
    /// the typed error that stopped it. An exit-phase hook failure leaves
    /// the active path unchanged; subsequent events resume from the
    /// pre-dispatch leaf.
    pub async fn dispatch(&self, event: Event) -> Result<(), MachineError> {
        let (queue, mut shutdown) = self.submission_handles()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope::Event {
            event,
            reply: Some(reply_tx),
        };
        tokio::select! {
            sent = queue.send(envelope) => {
                if sent.is_err() {
                    return Err(MachineError::Stopped);
                }
            }
            _ = shutdown.changed() => return Err(MachineError::Stopped),
        }
        reply_rx.await.unwrap_or(Err(MachineError::Stopped))
    }

    /// Submit an event without waiting for it to be handled.
    ///
    /// The outcome is observable only through subscribers. Blocks only when
    /// the queue is full; racing a shutdown returns
    /// [`MachineError::Stopped`].
    pub async fn dispatch_async(&self, event: Event) -> Result<(), MachineError> {
        let (queue, mut shutdown) = self.submission_handles()?;
        let envelope = Envelope::Event { event, reply: None };
        tokio::select! {
            sent = queue.send(envelope) => {
                if sent.is_err() {
                    return Err(MachineError::Stopped);
                }
            }
            _ = shutdown.changed() => return Err(MachineError::Stopped),
        }
        Ok(())
    }

    /// Advance along the single available transition, if there is one.
    ///
    /// The whole scan runs on the dispatcher, FIFO-ordered behind already
    /// queued events, so the guard probe and the fired transition see one
    /// consistent configuration. The active path is scanned leaf to root: a
    /// level with more than one outgoing transition fails with
    /// [`MachineError::MultipleTransitions`] before guards are consulted; a
    /// level with exactly one whose guard admits an event-less probe fires
    /// that transition synchronously. If no level qualifies,
    /// [`MachineError::NoAvailableTransition`].
    pub async fn next(&self) -> Result<(), MachineError> {
        let (queue, mut shutdown) = self.submission_handles()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tokio::select! {
            sent = queue.send(Envelope::AutoAdvance { reply: reply_tx }) => {
                if sent.is_err() {
                    return Err(MachineError::Stopped);
                }
            }
            _ = shutdown.changed() => return Err(MachineError::Stopped),
        }
        reply_rx.await.unwrap_or(Err(MachineError::Stopped))
    }

    /// The active leaf state.
    ///
    /// Before the first `start` this reports the definition's declared
    /// anchor.
    pub fn current(&self) -> StateId {
        self.engine.runtime.read().current.clone()
    }

    /// Copy of the active path, root to leaf.
    pub fn current_path(&self) -> Vec<StateId> {
        self.engine.runtime.read().active_path.clone()
    }

    /// Whether `id` lies on the active path.
    pub fn is_active(&self, id: &str) -> bool {
        self.engine
            .runtime
            .read()
            .active_path
            .iter()
            .any(|s| s == id)
    }

    /// Whether `id` has been entered since the last `start` (or restore).
    pub fn has_visited(&self, id: &str) -> bool {
        self.engine.runtime.read().visited.contains(id)
    }

    /// Whether the machine is running.
    pub fn is_started(&self) -> bool {
        self.engine.runtime.read().started
    }

    /// The interpreted definition.
    pub fn definition(&self) -> &Definition<C> {
        &self.engine.def
    }

    /// Clone of the user context, taken under the context lock (the
    /// context has its own mutex, separate from the lock guarding
    /// `current`/`active_path`/`visited`).
    pub fn context(&self) -> C
    where
        C: Clone,
    {
        self.engine.context.lock().clone()
    }

    /// Mutate the user context under the context lock.
    pub fn set_context(&self, update: impl FnOnce(&mut C)) {
        let mut ctx = self.engine.context.lock();
        update(&mut ctx);
    }

    /// Register an observer of every transition attempt.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.engine.subscribers.write().push(subscriber);
    }

    /// Create fresh queue and shutdown channels and spawn the dispatcher.
    pub(crate) fn spawn_lifecycle(&self) {
        let (queue, rx) = mpsc::channel(self.capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(self.engine.clone().run(rx, shutdown_rx.clone()));
        *self.lifecycle.lock() = Some(Lifecycle {
            queue,
            shutdown,
            shutdown_rx,
            dispatcher,
        });
    }

    /// A lifecycle that still exists but is mid-teardown must classify as
    /// stopped (through its closed channels), never as not-started; only a
    /// missing lifecycle means the machine is not running.
    fn submission_handles(
        &self,
    ) -> Result<(mpsc::Sender<Envelope>, watch::Receiver<bool>), MachineError> {
        match self.lifecycle.lock().as_ref() {
            Some(lc) => Ok((lc.queue.clone(), lc.shutdown_rx.clone())),
            None => Err(MachineError::NotStarted),
        }
    }
}

impl<C> fmt::Debug for Machine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rt = self.engine.runtime.read();
        f.debug_struct("Machine")
            .field("definition", &self.engine.def.name())
            .field("started", &rt.started)
            .field("current", &rt.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{DefinitionBuilder, StateSpec, TransitionSpec};
    use crate::machine::subscriber::TransitionLog;

    fn turnstile() -> Arc<Definition<()>> {
        Arc::new(
            DefinitionBuilder::new("turnstile")
                .state(StateSpec::new("Locked").initial())
                .state(StateSpec::new("Unlocked").terminal())
                .on(TransitionSpec::new("coin", "Locked", "Unlocked"))
                .on(TransitionSpec::new("push", "Unlocked", "Locked"))
                .current("Locked")
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn turnstile_walks_through_coin_and_push() {
        let machine = Machine::new(turnstile(), ());
        machine.start().await.unwrap();

        assert_eq!(machine.current(), "Locked");
        machine.dispatch(Event::new("coin")).await.unwrap();
        assert_eq!(machine.current(), "Unlocked");
        machine.dispatch(Event::new("push")).await.unwrap();
        assert_eq!(machine.current(), "Locked");

        machine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_is_idempotent() {
        let machine = Machine::new(turnstile(), ());

        machine.start().await.unwrap();
        machine.start().await.unwrap();
        assert!(machine.is_started());

        machine.stop().await.unwrap();
        machine.stop().await.unwrap();
        assert!(!machine.is_started());
    }

    #[tokio::test]
    async fn dispatch_requires_a_running_machine() {
        let machine = Machine::new(turnstile(), ());

        let err = machine.dispatch(Event::new("coin")).await.unwrap_err();
        assert!(matches!(err, MachineError::NotStarted));

        machine.start().await.unwrap();
        machine.stop().await.unwrap();
        let err = machine.dispatch(Event::new("coin")).await.unwrap_err();
        assert!(matches!(err, MachineError::NotStarted));
    }

    fn nested() -> Arc<Definition<()>> {
        let sub = DefinitionBuilder::new("sub")
            .state(StateSpec::new("A1").initial())
            .state(StateSpec::new("A2").terminal())
            .current("A1")
            .build()
            .unwrap();
        Arc::new(
            DefinitionBuilder::new("nested")
                .state(StateSpec::new("A").initial().sub_definition(sub))
                .state(StateSpec::new("B").terminal())
                .on(TransitionSpec::new("go", "A1", "B"))
                .on(TransitionSpec::new("back", "A", "B"))
                .current("A")
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn initial_descent_drills_into_composites() {
        let machine = Machine::new(nested(), ());
        machine.start().await.unwrap();

        assert_eq!(machine.current_path(), vec!["A", "A1"]);
        assert_eq!(machine.current(), "A1");
        assert!(machine.is_active("A"));
        assert!(machine.is_active("A1"));
        assert!(!machine.is_active("B"));

        machine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn events_bubble_from_leaf_to_ancestors() {
        let machine = Machine::new(nested(), ());
        machine.start().await.unwrap();

        // Matched on the leaf itself.
        machine.dispatch(Event::new("go")).await.unwrap();
        assert_eq!(machine.current(), "B");
        assert_eq!(machine.current_path(), vec!["B"]);

        // Restart, then match on the parent by bubbling past the leaf.
        machine.stop().await.unwrap();
        machine.start().await.unwrap();
        machine.dispatch(Event::new("back")).await.unwrap();
        assert_eq!(machine.current(), "B");

        machine.stop().await.unwrap();
    }

    #[derive(Clone, Default)]
    struct Gate {
        allow: bool,
    }

    #[tokio::test]
    async fn rejected_guard_yields_no_transition() {
        let def: Arc<Definition<Gate>> = Arc::new(
            DefinitionBuilder::new("guarded")
                .state(StateSpec::new("A").initial())
                .state(StateSpec::new("B").terminal())
                .on(TransitionSpec::new("go", "A", "B").guard(|_, gate: &Gate| gate.allow))
                .current("A")
                .build()
                .unwrap(),
        );
        let machine = Machine::new(def, Gate::default());
        machine.start().await.unwrap();

        let err = machine.dispatch(Event::new("go")).await.unwrap_err();
        assert!(matches!(err, MachineError::NoTransition { .. }));
        assert_eq!(machine.current(), "A");

        machine.set_context(|gate| gate.allow = true);
        machine.dispatch(Event::new("go")).await.unwrap();
        assert_eq!(machine.current(), "B");

        machine.stop().await.unwrap();
    }

    #[derive(Clone, Default)]
    struct Counters {
        entry_a: u32,
        exit_a: u32,
        entry_b: u32,
        fail: bool,
    }

    fn rollback_def() -> Arc<Definition<Counters>> {
        Arc::new(
            DefinitionBuilder::new("rollback")
                .state(
                    StateSpec::new("A")
                        .initial()
                        .on_entry(|_, c: &mut Counters| {
                            c.entry_a += 1;
                            Ok(())
                        })
                        .on_exit(|_, c: &mut Counters| {
                            c.exit_a += 1;
                            Ok(())
                        }),
                )
                .state(StateSpec::new("B").terminal().on_entry(
                    |_, c: &mut Counters| {
                        c.entry_b += 1;
                        Ok(())
                    },
                ))
                .on(
                    TransitionSpec::new("go", "A", "B").action(|_, c: &mut Counters| {
                        if c.fail {
                            Err("boom".into())
                        } else {
                            Ok(())
                        }
                    }),
                )
                .current("A")
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn failing_action_rolls_back_the_exited_states() {
        let machine = Machine::new(rollback_def(), Counters {
            fail: true,
            ..Counters::default()
        });
        machine.start().await.unwrap();
        assert_eq!(machine.context().entry_a, 1);

        let err = machine.dispatch(Event::new("go")).await.unwrap_err();
        assert!(matches!(err, MachineError::ActionFailed { .. }));
        assert_eq!(machine.current(), "A");

        let counters = machine.context();
        assert_eq!(counters.exit_a, 1);
        assert_eq!(counters.entry_a, 2);
        assert_eq!(counters.entry_b, 0);
        assert!(!machine.has_visited("B"));

        machine.set_context(|c| c.fail = false);
        machine.dispatch(Event::new("go")).await.unwrap();
        assert_eq!(machine.current(), "B");
        assert_eq!(machine.context().entry_b, 1);

        machine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failing_entry_hook_restores_the_old_configuration() {
        #[derive(Clone, Default)]
        struct Flags {
            entry_a: u32,
            exit_a: u32,
        }

        let def: Arc<Definition<Flags>> = Arc::new(
            DefinitionBuilder::new("entry-fail")
                .state(
                    StateSpec::new("A")
                        .initial()
                        .on_entry(|_, c: &mut Flags| {
                            c.entry_a += 1;
                            Ok(())
                        })
                        .on_exit(|_, c: &mut Flags| {
                            c.exit_a += 1;
                            Ok(())
                        }),
                )
                .state(
                    StateSpec::new("B")
                        .terminal()
                        .on_entry(|_, _| Err("b is unavailable".into())),
                )
                .on(TransitionSpec::new("go", "A", "B"))
                .current("A")
                .build()
                .unwrap(),
        );
        let machine = Machine::new(def, Flags::default());
        machine.start().await.unwrap();

        let err = machine.dispatch(Event::new("go")).await.unwrap_err();
        match err {
            MachineError::HookFailed { state, message } => {
                assert_eq!(state, "B");
                assert_eq!(message, "b is unavailable");
            }
            other => panic!("expected HookFailed, got {other:?}"),
        }
        assert_eq!(machine.current(), "A");
        assert_eq!(machine.current_path(), vec!["A"]);
        assert!(!machine.has_visited("B"));
        // A was exited once, then re-entered by the rollback.
        let flags = machine.context();
        assert_eq!(flags.exit_a, 1);
        assert_eq!(flags.entry_a, 2);

        machine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failing_start_hook_leaves_the_machine_stopped() {
        #[derive(Clone, Default)]
        struct Ready {
            ready: bool,
        }

        let def: Arc<Definition<Ready>> = Arc::new(
            DefinitionBuilder::new("cold-start")
                .state(StateSpec::new("A").initial().on_entry(|_, c: &mut Ready| {
                    if c.ready {
                        Ok(())
                    } else {
                        Err("not ready".into())
                    }
                }))
                .state(StateSpec::new("B").terminal())
                .on(TransitionSpec::new("go", "A", "B"))
                .current("A")
                .build()
                .unwrap(),
        );
        let machine = Machine::new(def, Ready::default());

        let err = machine.start().await.unwrap_err();
        assert!(matches!(err, MachineError::HookFailed { .. }));
        assert!(!machine.is_started());

        machine.set_context(|c| c.ready = true);
        machine.start().await.unwrap();
        assert!(machine.is_started());
        machine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn hooks_run_root_to_leaf_on_start_and_leaf_to_root_on_stop() {
        #[derive(Clone, Default)]
        struct Trace {
            log: Vec<String>,
        }

        let sub = DefinitionBuilder::new("sub")
            .state(
                StateSpec::new("inner")
                    .initial()
                    .terminal()
                    .on_entry(|_, t: &mut Trace| {
                        t.log.push("enter:inner".into());
                        Ok(())
                    })
                    .on_exit(|_, t: &mut Trace| {
                        t.log.push("exit:inner".into());
                        Ok(())
                    }),
            )
            .current("inner")
            .build()
            .unwrap();
        let def: Arc<Definition<Trace>> = Arc::new(
            DefinitionBuilder::new("traced")
                .state(
                    StateSpec::new("outer")
                        .initial()
                        .terminal()
                        .sub_definition(sub)
                        .on_entry(|_, t: &mut Trace| {
                            t.log.push("enter:outer".into());
                            Ok(())
                        })
                        .on_exit(|_, t: &mut Trace| {
                            t.log.push("exit:outer".into());
                            Ok(())
                        }),
                )
                .current("outer")
                .build()
                .unwrap(),
        );
        let machine = Machine::new(def, Trace::default());

        machine.start().await.unwrap();
        machine.stop().await.unwrap();

        assert_eq!(
            machine.context().log,
            vec!["enter:outer", "enter:inner", "exit:inner", "exit:outer"]
        );
    }

    #[tokio::test]
    async fn async_dispatch_is_fifo_with_sync_dispatch() {
        let log = Arc::new(TransitionLog::new());
        let machine = Machine::new(turnstile(), ());
        machine.subscribe(log.clone());
        machine.start().await.unwrap();

        machine.dispatch_async(Event::new("coin")).await.unwrap();
        // A later sync dispatch cannot overtake the queued async event.
        machine.dispatch(Event::new("push")).await.unwrap();

        assert_eq!(machine.current(), "Locked");
        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, "coin");
        assert_eq!(records[1].event, "push");

        machine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn every_attempt_notifies_subscribers_exactly_once() {
        let log = Arc::new(TransitionLog::new());
        let machine = Machine::new(turnstile(), ());
        machine.subscribe(log.clone());
        machine.start().await.unwrap();

        machine.dispatch(Event::new("coin")).await.unwrap();
        let _ = machine.dispatch(Event::new("coin")).await.unwrap_err();

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].from, "Locked");
        assert_eq!(records[0].to, "Unlocked");
        assert!(records[0].error.is_none());
        // Rejected attempt: both ends report the unchanged leaf.
        assert_eq!(records[1].from, "Unlocked");
        assert_eq!(records[1].to, "Unlocked");
        assert!(records[1].error.is_some());

        machine.stop().await.unwrap();
    }

    fn pipeline() -> Arc<Definition<()>> {
        Arc::new(
            DefinitionBuilder::new("pipeline")
                .state(StateSpec::new("a").initial())
                .state(StateSpec::new("b"))
                .state(StateSpec::new("c").terminal())
                .on(TransitionSpec::new("first", "a", "b"))
                .on(TransitionSpec::new("second", "b", "c"))
                .current("a")
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn next_follows_the_single_available_transition() {
        let machine = Machine::new(pipeline(), ());
        machine.start().await.unwrap();

        machine.next().await.unwrap();
        assert_eq!(machine.current(), "b");
        machine.next().await.unwrap();
        assert_eq!(machine.current(), "c");

        let err = machine.next().await.unwrap_err();
        assert!(matches!(err, MachineError::NoAvailableTransition));

        machine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn next_queues_behind_pending_events() {
        let machine = Machine::new(pipeline(), ());
        machine.start().await.unwrap();

        // The async event is still queued when next() is submitted; the
        // auto-advance probe must observe the configuration it produces,
        // not the one at submission time.
        machine.dispatch_async(Event::new("first")).await.unwrap();
        machine.next().await.unwrap();

        assert_eq!(machine.current(), "c");

        machine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn next_refuses_ambiguous_levels() {
        let def: Arc<Definition<()>> = Arc::new(
            DefinitionBuilder::new("fork")
                .state(StateSpec::new("a").initial())
                .state(StateSpec::new("b").terminal())
                .state(StateSpec::new("c").terminal())
                .on(TransitionSpec::new("left", "a", "b"))
                .on(TransitionSpec::new("right", "a", "c"))
                .current("a")
                .build()
                .unwrap(),
        );
        let machine = Machine::new(def, ());
        machine.start().await.unwrap();

        let err = machine.next().await.unwrap_err();
        assert!(matches!(err, MachineError::MultipleTransitions { state } if state == "a"));

        machine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn next_skips_levels_whose_guard_rejects() {
        let def: Arc<Definition<()>> = Arc::new(
            DefinitionBuilder::new("guarded-next")
                .state(StateSpec::new("a").initial())
                .state(StateSpec::new("b").terminal())
                .on(TransitionSpec::new("go", "a", "b").guard(|_, _| false))
                .current("a")
                .build()
                .unwrap(),
        );
        let machine = Machine::new(def, ());
        machine.start().await.unwrap();

        let err = machine.next().await.unwrap_err();
        assert!(matches!(err, MachineError::NoAvailableTransition));

        machine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn self_loop_reenters_the_leaf() {
        #[derive(Clone, Default)]
        struct Count {
            entries: u32,
        }

        let def: Arc<Definition<Count>> = Arc::new(
            DefinitionBuilder::new("loop")
                .state(
                    StateSpec::new("a")
                        .initial()
                        .terminal()
                        .on_entry(|_, c: &mut Count| {
                            c.entries += 1;
                            Ok(())
                        }),
                )
                .on(TransitionSpec::new("tick", "a", "a"))
                .current("a")
                .build()
                .unwrap(),
        );
        let machine = Machine::new(def, Count::default());
        machine.start().await.unwrap();
        assert_eq!(machine.context().entries, 1);

        machine.dispatch(Event::new("tick")).await.unwrap();
        assert_eq!(machine.current(), "a");
        assert_eq!(machine.context().entries, 2);

        machine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn event_args_reach_guards_and_actions() {
        #[derive(Clone, Default)]
        struct Till {
            total: u32,
        }

        let def: Arc<Definition<Till>> = Arc::new(
            DefinitionBuilder::new("till")
                .state(StateSpec::new("open").initial())
                .state(StateSpec::new("closed").terminal())
                .on(
                    TransitionSpec::new("deposit", "open", "closed")
                        .guard(|event, _: &Till| event.arg::<u32>(0).is_some())
                        .action(|event, till: &mut Till| {
                            till.total += event.arg::<u32>(0).copied().unwrap_or(0);
                            Ok(())
                        }),
                )
                .current("open")
                .build()
                .unwrap(),
        );
        let machine = Machine::new(def, Till::default());
        machine.start().await.unwrap();

        // Missing argument: guard rejects.
        let err = machine.dispatch(Event::new("deposit")).await.unwrap_err();
        assert!(matches!(err, MachineError::NoTransition { .. }));

        machine
            .dispatch(Event::with_args("deposit", vec![Box::new(25u32)]))
            .await
            .unwrap();
        assert_eq!(machine.context().total, 25);

        machine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn restart_resets_visited_to_the_initial_path() {
        let machine = Machine::new(turnstile(), ());
        machine.start().await.unwrap();
        machine.dispatch(Event::new("coin")).await.unwrap();
        assert!(machine.has_visited("Unlocked"));

        machine.stop().await.unwrap();
        machine.start().await.unwrap();
        assert!(machine.has_visited("Locked"));
        assert!(!machine.has_visited("Unlocked"));

        machine.stop().await.unwrap();
    }
}
