//! Change Propagation
//!
//! The dependency graph owns every node and both directions of every edge.
//! It decides *what* must happen after a write; the batch scheduler in
//! [`crate::reactive`] decides *when*.
//!
//! # Algorithm
//!
//! When a source node changes:
//!
//! 1. Walk its subscribers breadth-first.
//! 2. Derived nodes are marked dirty and the walk continues through them,
//!    since anything reading a stale computed is itself stale.
//! 3. Effect nodes are collected, in discovery order, for scheduling.
//!
//! Nothing is recomputed here. Derived nodes are pulled fresh by whoever
//! reads them next.

use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use slotmap::SlotMap;
use smallvec::SmallVec;

use super::node::{Node, NodeId, NodeKind};
use crate::reactive::subscriber::{Rerun, SubscriberId};

/// Arena of nodes plus the edge bookkeeping between them.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: SlotMap<NodeId, Node>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
        }
    }

    /// Add a node to the graph.
    pub fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node. Removing a missing node
    /// is a no-op.
    pub fn remove(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.remove(node_id) {
            // Remove this node from its sources' subscriber lists
            for source_id in node.sources() {
                if let Some(source) = self.nodes.get_mut(*source_id) {
                    source.remove_subscriber(node_id);
                }
            }

            // Remove this node from its subscribers' source lists
            for subscriber_id in node.subscribers() {
                if let Some(subscriber) = self.nodes.get_mut(*subscriber_id) {
                    subscriber.remove_source(node_id);
                }
            }
        }
    }

    /// Get a reference to a node.
    pub fn get(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// Whether the node is still part of the graph.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Whether a derived node must recompute. Missing nodes always do.
    pub fn is_dirty(&self, node_id: NodeId) -> bool {
        self.nodes.get(node_id).map_or(true, Node::is_dirty)
    }

    /// Mark a derived node as up to date.
    pub fn mark_clean(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.set_dirty(false);
        }
    }

    /// Replace the source set of `observer` with `sources`.
    ///
    /// Edges to sources that were not read again are dropped, new sources
    /// gain `observer` as a subscriber, and sources that no longer exist are
    /// skipped.
    pub fn replace_sources(&mut self, observer: NodeId, sources: &[NodeId]) {
        if !self.nodes.contains_key(observer) {
            return;
        }

        let next: SmallVec<[NodeId; 4]> = sources
            .iter()
            .copied()
            .filter(|id| *id != observer && self.nodes.contains_key(*id))
            .collect();

        let previous = match self.nodes.get_mut(observer) {
            Some(node) => node.replace_sources(next.clone()),
            None => return,
        };

        for stale in previous.iter().filter(|id| !next.contains(id)) {
            if let Some(source) = self.nodes.get_mut(*stale) {
                source.remove_subscriber(observer);
            }
        }

        for fresh in next.iter().filter(|id| !previous.contains(id)) {
            if let Some(source) = self.nodes.get_mut(*fresh) {
                source.add_subscriber(observer);
            }
        }
    }

    /// Propagate a change of `source_id` through the graph.
    ///
    /// Marks every transitively dependent derived node dirty and returns the
    /// effects to schedule, in discovery order.
    pub(crate) fn mark_changed(&mut self, source_id: NodeId) -> Vec<(SubscriberId, NodeId)> {
        let mut effects = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        // Start with the source node's direct subscribers
        if let Some(source) = self.nodes.get(source_id) {
            queue.extend(source.subscribers().iter().copied());
        }

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }

            let Some(node) = self.nodes.get_mut(node_id) else {
                continue;
            };

            match node.kind() {
                NodeKind::Derived => {
                    node.set_dirty(true);
                    queue.extend(node.subscribers().iter().copied());
                }
                NodeKind::Effect => {
                    if let Some(handle) = node.effect_handle() {
                        effects.push((handle.id, node_id));
                    }
                }
                NodeKind::Source => {}
            }
        }

        effects
    }

    /// Upgrade the runner of an effect node.
    pub(crate) fn runner(&self, node_id: NodeId) -> Option<Rc<dyn Rerun>> {
        self.nodes.get(node_id).and_then(Node::runner)
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Count nodes of one kind.
    pub fn count_kind(&self, kind: NodeKind) -> usize {
        self.nodes.values().filter(|node| node.kind() == kind).count()
    }

    /// Total number of source-to-subscriber edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|node| node.sources().len()).sum()
    }
}
