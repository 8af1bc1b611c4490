//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! A node only carries structure (edges, height, pass state); the value it
//! stands for lives in the typed cell that registered it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use smallvec::SmallVec;

/// Unique identifier for a node in the dependency graph.
///
/// Ids are ordered by creation, which the scheduler uses as a tie-breaker
/// between nodes of equal height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// An input cell. These are the roots of the graph: written from outside,
    /// no upstream.
    Input,

    /// A derived cell, computed from one or more upstream nodes.
    Derived,
}

/// Per-pass state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Not touched by the current pass.
    Clean,

    /// An upstream changed; the node is queued but not yet recomputed.
    Dirty,

    /// Recomputed (or written, for inputs) during the current pass.
    Settled,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Topological rank: 0 for inputs, 1 + max(upstream heights) otherwise.
    height: u32,

    /// State within the current propagation pass.
    state: PassState,

    /// Nodes this node reads from. A multiset: `zip2(a, a, ..)` lists `a` twice.
    upstreams: SmallVec<[NodeId; 2]>,

    /// Nodes that read from this node. Non-owning; insertion ordered so that
    /// propagation order is deterministic.
    dependents: IndexSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self::with_id(NodeId::new(), kind)
    }

    /// Create a node for an id that was allocated by its owning cell.
    pub fn with_id(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            height: 0,
            state: PassState::Clean,
            upstreams: SmallVec::new(),
            dependents: IndexSet::new(),
        }
    }

    /// Create a new input node.
    pub fn input() -> Self {
        Self::new(NodeKind::Input)
    }

    /// Create a new derived node.
    pub fn derived() -> Self {
        Self::new(NodeKind::Derived)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn set_height(&mut self, height: u32) {
        self.height = height;
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    /// Check if the node is untouched by the current pass.
    pub fn is_clean(&self) -> bool {
        self.state == PassState::Clean
    }

    pub fn mark_clean(&mut self) {
        self.state = PassState::Clean;
    }

    pub fn mark_dirty(&mut self) {
        self.state = PassState::Dirty;
    }

    pub fn mark_settled(&mut self) {
        self.state = PassState::Settled;
    }

    /// Add an upstream (a node that this node reads from).
    pub fn add_upstream(&mut self, node_id: NodeId) {
        self.upstreams.push(node_id);
    }

    /// Remove one occurrence of an upstream.
    ///
    /// Returns `true` if another occurrence is still present.
    pub fn remove_upstream(&mut self, node_id: NodeId) -> bool {
        if let Some(pos) = self.upstreams.iter().position(|id| *id == node_id) {
            self.upstreams.remove(pos);
        }
        self.upstreams.contains(&node_id)
    }

    pub fn upstreams(&self) -> &[NodeId] {
        &self.upstreams
    }

    /// Add a dependent (a node that reads from this node).
    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
        assert!(id1 < id2);
    }

    #[test]
    fn input_node_starts_clean_at_height_zero() {
        let node = Node::input();
        assert_eq!(node.kind(), NodeKind::Input);
        assert!(node.is_clean());
        assert_eq!(node.height(), 0);
    }

    #[test]
    fn upstreams_are_a_multiset() {
        let mut node = Node::derived();
        let up = NodeId::new();

        node.add_upstream(up);
        node.add_upstream(up);
        assert_eq!(node.upstreams().len(), 2);

        assert!(node.remove_upstream(up));
        assert!(!node.remove_upstream(up));
        assert!(node.upstreams().is_empty());
    }

    #[test]
    fn dependents_keep_insertion_order() {
        let mut node = Node::input();
        let ids: Vec<_> = (0..4).map(|_| NodeId::new()).collect();
        for id in ids.iter().rev() {
            node.add_dependent(*id);
        }
        node.remove_dependent(ids[2]);

        let order: Vec<_> = node.dependents().iter().copied().collect();
        assert_eq!(order, vec![ids[3], ids[1], ids[0]]);
    }

    #[test]
    fn pass_state_transitions() {
        let mut node = Node::derived();
        assert_eq!(node.state(), PassState::Clean);

        node.mark_dirty();
        assert_eq!(node.state(), PassState::Dirty);

        node.mark_settled();
        assert_eq!(node.state(), PassState::Settled);

        node.mark_clean();
        assert!(node.is_clean());
    }
}
