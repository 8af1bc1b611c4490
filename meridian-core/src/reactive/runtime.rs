//! Reactive Runtime
//!
//! The runtime is the execution half of the propagation engine. It connects
//! the typed cells to the dependency graph and runs propagation passes when
//! inputs are written.
//!
//! # How It Works
//!
//! 1. When a cell is created, it registers its node (and upstream edges)
//!    with the scheduler and a weak handle to itself with the registry.
//!
//! 2. When an input is written, the write is queued. If no batch or pass is
//!    active, the queue is flushed right away.
//!
//! 3. Flushing applies the queued writes and runs one pass for the inputs
//!    whose value at the end of the round differs from its start:
//!    a. Pops dirty nodes from the scheduler in height order
//!    b. Recomputes each one exactly once
//!    c. Settles it, queueing its dependents if the value changed
//!    d. Once the queue is empty, notifies the observers of every changed
//!       cell, in settle order
//!
//! 4. Writes issued by observers land in the queue and are flushed in the
//!    next round, after the current pass has finished.
//!
//! # Threading
//!
//! Everything is thread-local and synchronous. Cells are `!Send`, so a graph
//! never crosses threads and no locking is needed.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::graph::{Node, NodeId, NodeKind, UpdateScheduler};

use super::context::{ContextKind, UpdateContext};

/// Outcome of recomputing a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recompute {
    /// The value changed; dependents must recompute.
    Changed,
    /// The cutoff reported no change.
    Unchanged,
    /// The node's height grew while recomputing; retry later in the pass.
    Deferred,
}

/// A type-erased cell the runtime can drive.
pub(crate) trait Reactive {
    /// Get the graph node backing this cell.
    fn node_id(&self) -> NodeId;

    /// Recompute the value from the upstream cells.
    fn recompute(&self) -> Recompute;

    /// Deliver the current value to every observer. Returns how many ran.
    fn notify(&self) -> usize;

    /// Close a flush round for a written input. Returns `false` if the
    /// round's writes cancelled out, in which case nothing propagates.
    fn commit_writes(&self) -> bool;
}

/// A write waiting to be applied. Returns the input's id if its value changed.
pub(crate) type PendingWrite = Box<dyn FnOnce() -> Option<NodeId>>;

/// Counters describing the work done by the runtime on this thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Propagation passes run.
    pub passes: u64,
    /// Derived cells recomputed.
    pub recomputes: u64,
    /// Observer callbacks invoked by passes.
    pub notifications: u64,
}

/// Handle to a registered node.
///
/// Dropping this handle unregisters the node from the runtime.
pub(crate) struct NodeHandle {
    node_id: NodeId,
}

impl NodeHandle {
    pub(crate) fn node_id(&self) -> NodeId {
        self.node_id
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.node_id);
    }
}

struct RuntimeState {
    scheduler: UpdateScheduler,
    registry: HashMap<NodeId, Weak<dyn Reactive>>,
    pending: VecDeque<PendingWrite>,
    config: RuntimeConfig,
    stats: PassStats,
    stamp: u64,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            scheduler: UpdateScheduler::new(),
            registry: HashMap::new(),
            pending: VecDeque::new(),
            config: RuntimeConfig::default(),
            stats: PassStats::default(),
            stamp: 0,
        }
    }

    fn upgrade(&self, node_id: NodeId) -> Option<Rc<dyn Reactive>> {
        self.registry.get(&node_id).and_then(Weak::upgrade)
    }
}

thread_local! {
    static RUNTIME: RefCell<RuntimeState> = RefCell::new(RuntimeState::new());
}

/// Run `f` against the runtime state. `f` must not call back into cells.
fn with_state<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Register a cell's node together with its upstream edges.
    pub(crate) fn register(
        node_id: NodeId,
        kind: NodeKind,
        upstreams: &[NodeId],
        reactive: Weak<dyn Reactive>,
    ) -> NodeHandle {
        with_state(|state| {
            state.scheduler.add_node(Node::with_id(node_id, kind));
            for &upstream in upstreams {
                // A fresh node has no dependents and its upstreams are kept
                // alive by the caller, so linking cannot fail.
                let linked = state.scheduler.add_edge(upstream, node_id);
                if let Err(err) = &linked {
                    tracing::error!(node = %node_id, %err, "failed to link new cell");
                }
                debug_assert!(linked.is_ok(), "failed to link new cell {node_id}");
            }
            state.registry.insert(node_id, reactive);
        });
        tracing::trace!(node = %node_id, ?kind, "registered cell");
        NodeHandle { node_id }
    }

    /// Unregister a node. Called when the last handle to its cell drops.
    fn unregister(node_id: NodeId) {
        let removed = RUNTIME.try_with(|rt| match rt.try_borrow_mut() {
            Ok(mut state) => {
                state.registry.remove(&node_id);
                state.scheduler.remove_node(node_id);
                true
            }
            Err(_) => false,
        });
        match removed {
            Ok(true) => tracing::trace!(node = %node_id, "released cell"),
            Ok(false) => tracing::warn!(node = %node_id, "runtime busy; node left in graph"),
            // Thread teardown: the whole graph is going away.
            Err(_) => {}
        }
    }

    /// Move `dependent`'s subscription from `old` to `new`.
    ///
    /// Returns `true` if the dependent's height grew.
    ///
    /// # Panics
    ///
    /// Panics if `new` depends on `dependent`, since the graph would no
    /// longer be acyclic.
    pub(crate) fn rebind(dependent: NodeId, old: NodeId, new: NodeId) -> bool {
        let result = with_state(|state| state.scheduler.replace_edge(dependent, old, new));
        match result {
            Ok(grew) => {
                tracing::debug!(node = %dependent, from = %old, to = %new, grew, "rebound cell");
                grew
            }
            Err(err) => {
                tracing::error!(node = %dependent, %err, "flat_map selector closed a cycle");
                panic!("{err}");
            }
        }
    }

    /// Allocate a change stamp. Stamps increase strictly with every change.
    pub(crate) fn next_stamp() -> u64 {
        with_state(|state| {
            state.stamp += 1;
            state.stamp
        })
    }

    pub(crate) fn height(node_id: NodeId) -> Option<u32> {
        with_state(|state| state.scheduler.height(node_id))
    }

    /// Queue a write and flush unless a batch or pass is active.
    pub(crate) fn schedule_write(write: PendingWrite) {
        with_state(|state| state.pending.push_back(write));
        if !UpdateContext::is_active() {
            Self::flush();
        }
    }

    /// Run `f` with writes deferred. Everything written inside propagates in
    /// a single pass when the outermost batch ends.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        let result = {
            let _ctx = UpdateContext::enter(ContextKind::Batch);
            f()
        };
        if !UpdateContext::is_active() {
            Self::flush();
        }
        result
    }

    /// Install a configuration for this thread.
    pub fn configure(config: RuntimeConfig) {
        with_state(|state| {
            state.scheduler.set_check_cycles(config.check_cycles);
            state.config = config;
        });
    }

    pub fn config() -> RuntimeConfig {
        with_state(|state| state.config.clone())
    }

    pub fn stats() -> PassStats {
        with_state(|state| state.stats)
    }

    pub fn reset_stats() {
        with_state(|state| state.stats = PassStats::default());
    }

    /// Number of live cells on this thread.
    pub fn node_count() -> usize {
        with_state(|state| state.scheduler.node_count())
    }

    /// Check if a propagation pass (including its observer callbacks) is
    /// running.
    pub fn is_propagating() -> bool {
        UpdateContext::in_pass()
    }

    fn flush() {
        let _ctx = UpdateContext::enter(ContextKind::Pass);
        let max_rounds = with_state(|state| state.config.max_flush_rounds);
        let mut rounds = 0;

        loop {
            let writes: Vec<PendingWrite> = with_state(|state| state.pending.drain(..).collect());
            if writes.is_empty() {
                break;
            }

            rounds += 1;
            if rounds > max_rounds {
                // Released outside the runtime borrow: dropping a write may
                // drop the last handle to a cell.
                drop(writes);
                let err = RuntimeError::FeedbackLoop { rounds: max_rounds };
                tracing::error!(%err, "aborting flush");
                panic!("{err}");
            }

            let mut written = Vec::new();
            for write in writes {
                if let Some(node_id) = write() {
                    if !written.contains(&node_id) {
                        written.push(node_id);
                    }
                }
            }

            let mut sources = Vec::with_capacity(written.len());
            for node_id in written {
                let Some(reactive) = with_state(|state| state.upgrade(node_id)) else {
                    continue;
                };
                if reactive.commit_writes() {
                    sources.push(node_id);
                } else {
                    tracing::trace!(node = %node_id, "writes cancelled out");
                }
            }
            if !sources.is_empty() {
                Self::run_pass(&sources);
            }
        }
    }

    fn run_pass(sources: &[NodeId]) {
        let span = tracing::debug_span!("pass", sources = sources.len());
        let _enter = span.enter();

        let mut changed: Vec<Rc<dyn Reactive>> = with_state(|state| {
            state.stats.passes += 1;
            state.scheduler.begin_pass(sources);
            sources.iter().filter_map(|id| state.upgrade(*id)).collect()
        });

        loop {
            let next = with_state(|state| {
                let node_id = state.scheduler.next_dirty()?;
                Some((node_id, state.upgrade(node_id)))
            });
            let Some((node_id, reactive)) = next else {
                break;
            };
            let Some(reactive) = reactive else {
                // Released earlier in this pass.
                with_state(|state| state.scheduler.settle(node_id, false));
                continue;
            };

            let outcome = reactive.recompute();
            tracing::trace!(node = %node_id, ?outcome, "recomputed");

            with_state(|state| match outcome {
                Recompute::Deferred => state.scheduler.defer(node_id),
                Recompute::Changed | Recompute::Unchanged => {
                    state.stats.recomputes += 1;
                    state
                        .scheduler
                        .settle(node_id, outcome == Recompute::Changed);
                }
            });
            if outcome == Recompute::Changed {
                changed.push(reactive);
            }
        }

        with_state(|state| state.scheduler.end_pass());
        tracing::debug!(changed = changed.len(), "pass settled");

        for reactive in &changed {
            let delivered = reactive.notify();
            with_state(|state| state.stats.notifications += delivered as u64);
        }
    }
}
