//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between reactive values and the computations that read them.
//!
//! # Overview
//!
//! - Nodes represent sources (signals), derived values (computeds) or
//!   effects.
//! - Edges represent dependencies: if A reads B, B lists A as a subscriber
//!   and A lists B as a source.
//!
//! Computeds are both sources and subscribers, so the graph looks cyclic
//! from the point of view of any single node. Rather than bidirectional
//! pointers, nodes live in a slot-map arena and refer to each other by
//! generational [`NodeId`] handles. Rebuilding a subscriber's source set is
//! then a plain set difference over ids, and removing a node cannot leave
//! dangling references behind.
//!
//! # Design Decisions
//!
//! 1. One arena per thread. The runtime is single-threaded, so the graph is
//!    never shared and needs no locking.
//!
//! 2. Both directions of every edge are stored, so propagation walks
//!    subscribers forward and removal unlinks sources backward in O(degree).
//!
//! 3. Subscriber sets preserve insertion order, which makes effect
//!    scheduling order deterministic.

mod node;
mod scheduler;

pub use node::{Node, NodeId, NodeKind};
pub use scheduler::DependencyGraph;
