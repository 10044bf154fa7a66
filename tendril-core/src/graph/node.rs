//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::reactive::subscriber::{Rerun, SubscriberId};

new_key_type! {
    /// Generational handle to a node in the dependency graph.
    ///
    /// Handles of removed nodes never alias a later node, so a stale id held
    /// by some subscriber resolves to "missing" instead of the wrong node.
    pub struct NodeId;
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Source,

    /// A derived node (computed). These have dependencies and may have
    /// dependents. They cache their value and are marked dirty, never run,
    /// during propagation.
    Derived,

    /// An effect node. These are leaves of the graph.
    /// They have dependencies but no dependents (they produce side effects, not values).
    Effect,
}

/// Scheduling handle stored on effect nodes.
pub(crate) struct EffectHandle {
    pub(crate) id: SubscriberId,
    pub(crate) runner: Weak<dyn Rerun>,
}

/// A node in the dependency graph.
pub struct Node {
    kind: NodeKind,

    /// Only meaningful for derived nodes.
    dirty: bool,

    /// Nodes this node read during its last run.
    sources: SmallVec<[NodeId; 4]>,

    /// Nodes that read this node. Insertion order is notification order.
    subscribers: IndexSet<NodeId>,

    effect: Option<EffectHandle>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            // Derived nodes start dirty so the first read computes.
            dirty: kind == NodeKind::Derived,
            sources: SmallVec::new(),
            subscribers: IndexSet::new(),
            effect: None,
        }
    }

    /// Create a new source (signal) node.
    pub fn source() -> Self {
        Self::new(NodeKind::Source)
    }

    /// Create a new derived (computed) node.
    pub fn derived() -> Self {
        Self::new(NodeKind::Derived)
    }

    /// Create a new effect node that schedules `runner` when notified.
    pub(crate) fn effect(id: SubscriberId, runner: Weak<dyn Rerun>) -> Self {
        let mut node = Self::new(NodeKind::Effect);
        node.effect = Some(EffectHandle { id, runner });
        node
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Whether a derived node must recompute on its next read.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Nodes this node currently depends on.
    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    pub(crate) fn replace_sources(&mut self, sources: SmallVec<[NodeId; 4]>) -> SmallVec<[NodeId; 4]> {
        std::mem::replace(&mut self.sources, sources)
    }

    pub(crate) fn remove_source(&mut self, node_id: NodeId) {
        self.sources.retain(|id| *id != node_id);
    }

    /// Nodes that depend on this node, in subscription order.
    pub fn subscribers(&self) -> &IndexSet<NodeId> {
        &self.subscribers
    }

    pub(crate) fn add_subscriber(&mut self, node_id: NodeId) {
        self.subscribers.insert(node_id);
    }

    pub(crate) fn remove_subscriber(&mut self, node_id: NodeId) {
        // Keep the remaining subscribers in subscription order.
        self.subscribers.shift_remove(&node_id);
    }

    pub(crate) fn effect_handle(&self) -> Option<&EffectHandle> {
        self.effect.as_ref()
    }

    /// Upgrade the effect runner, if this is a live effect node.
    pub(crate) fn runner(&self) -> Option<Rc<dyn Rerun>> {
        self.effect.as_ref().and_then(|handle| handle.runner.upgrade())
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("dirty", &self.dirty)
            .field("sources", &self.sources.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
