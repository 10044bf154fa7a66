//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! and effects. It owns the dependency graph and the batch scheduler's
//! queue.
//!
//! # How It Works
//!
//! 1. Creating a signal, computed or effect inserts a node into the graph.
//!
//! 2. Tracked reads are collected by the [`ReactiveContext`] of the running
//!    computation; when it finishes, the runtime rebuilds that node's edges.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Walks dependents in the graph
//!    b. Marks computeds dirty (they recompute on next access)
//!    c. Queues effects for the current batch
//!
//! # Threading
//!
//! Every thread has its own runtime. Reactive handles are `!Send`, so a
//! graph is only ever touched by the thread that built it and no locking
//! is involved. User code never runs while the runtime's internal state is
//! borrowed.
//!
//! [`ReactiveContext`]: super::context::ReactiveContext

use std::cell::{Cell, RefCell};
use std::thread::AccessError;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::context::ReactiveContext;
use super::subscriber::SubscriberId;
use crate::error::EffectError;
use crate::graph::{DependencyGraph, Node, NodeId, NodeKind};

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Per-thread runtime state.
pub struct Runtime {
    graph: RefCell<DependencyGraph>,
    pub(crate) batch_depth: Cell<usize>,
    pub(crate) flushing: Cell<bool>,
    /// Effects waiting for the current flush, in first-enqueued order.
    pub(crate) pending: RefCell<IndexMap<SubscriberId, NodeId>>,
    /// Effect failures nobody handled, escalated once the batch settles.
    pub(crate) unhandled: RefCell<Vec<EffectError>>,
}

/// A point-in-time summary of the calling thread's runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeStats {
    /// Live signals.
    pub signals: usize,
    /// Live computeds.
    pub computeds: usize,
    /// Live effects.
    pub effects: usize,
    /// Source-to-subscriber edges.
    pub edges: usize,
    /// Effects queued but not yet run.
    pub pending_effects: usize,
    /// Nesting depth of open batches.
    pub batch_depth: usize,
}

impl Runtime {
    fn new() -> Self {
        Self {
            graph: RefCell::new(DependencyGraph::new()),
            batch_depth: Cell::new(0),
            flushing: Cell::new(false),
            pending: RefCell::new(IndexMap::new()),
            unhandled: RefCell::new(Vec::new()),
        }
    }

    /// Run `f` against this thread's runtime.
    pub(crate) fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Like [`Runtime::with`], but usable from destructors during thread
    /// teardown.
    pub(crate) fn try_with<R>(f: impl FnOnce(&Runtime) -> R) -> Result<R, AccessError> {
        RUNTIME.try_with(f)
    }

    /// Run `f` against the dependency graph.
    ///
    /// `f` must not call back into user code.
    pub(crate) fn with_graph<R>(f: impl FnOnce(&mut DependencyGraph) -> R) -> R {
        RUNTIME.with(|rt| f(&mut rt.graph.borrow_mut()))
    }

    /// Insert a node into the graph.
    pub(crate) fn insert(node: Node) -> NodeId {
        Self::with_graph(|graph| graph.insert(node))
    }

    /// Remove a node, tolerating thread teardown.
    pub(crate) fn remove(node_id: NodeId) {
        let _ = RUNTIME.try_with(|rt| {
            if let Ok(mut graph) = rt.graph.try_borrow_mut() {
                graph.remove(node_id);
            }
        });
        Self::dequeue_node(node_id);
    }

    /// Record a tracked read of `node_id`.
    pub(crate) fn track(node_id: NodeId) {
        ReactiveContext::track(node_id);
    }

    /// Propagate a change of `source` and queue the affected effects.
    ///
    /// Must be called inside a batch; the caller flushes when it closes.
    pub(crate) fn notify(source: NodeId) {
        let effects = Self::with_graph(|graph| graph.mark_changed(source));
        if effects.is_empty() {
            return;
        }

        Self::with(|rt| {
            let mut pending = rt.pending.borrow_mut();
            for (id, node) in effects {
                trace!(subscriber = id.raw(), "effect queued");
                pending.entry(id).or_insert(node);
            }
        });
    }

    fn dequeue_node(node_id: NodeId) {
        let _ = RUNTIME.try_with(|rt| {
            if let Ok(mut pending) = rt.pending.try_borrow_mut() {
                pending.retain(|_, node| *node != node_id);
            }
        });
    }

    /// Queue an effect failure for escalation.
    pub(crate) fn report_unhandled(error: EffectError) {
        Self::with(|rt| rt.unhandled.borrow_mut().push(error));
    }

    /// Summarize the calling thread's runtime.
    pub fn stats() -> RuntimeStats {
        Self::with(|rt| {
            let graph = rt.graph.borrow();
            RuntimeStats {
                signals: graph.count_kind(NodeKind::Source),
                computeds: graph.count_kind(NodeKind::Derived),
                effects: graph.count_kind(NodeKind::Effect),
                edges: graph.edge_count(),
                pending_effects: rt.pending.borrow().len(),
                batch_depth: rt.batch_depth.get(),
            }
        })
    }

    /// Check if reads are currently being tracked.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Check if a batch is open on this thread.
    pub fn is_batching() -> bool {
        Self::with(|rt| rt.batch_depth.get() > 0 || rt.flushing.get())
    }
}
