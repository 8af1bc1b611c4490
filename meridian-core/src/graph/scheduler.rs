//! Update Scheduler
//!
//! The scheduler owns the structure of the dependency graph and decides the
//! order in which dirty nodes are recomputed during a propagation pass.
//!
//! # Algorithm
//!
//! Every node carries a height: 0 for inputs, 1 + the maximum height of its
//! upstreams otherwise. Heights are maintained eagerly whenever an edge
//! changes, so they always form a valid topological order.
//!
//! 1. `begin_pass`: mark the written inputs settled and queue their direct
//!    dependents as dirty.
//! 2. `next_dirty`: pop the dirty node of lowest height. All of its upstreams
//!    have a lower height, so they have already settled.
//! 3. `settle`: record the recomputation; if the value changed, queue the
//!    node's clean dependents.
//! 4. Repeat until the queue is empty, then `end_pass` resets every touched
//!    node to clean.
//!
//! A node is queued at most once while dirty and never re-queued once
//! settled, so each node recomputes at most once per pass even when several
//! paths from the written input reconverge on it.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::node::{Node, NodeId, PassState};
use crate::error::GraphError;

/// The update scheduler manages the dependency graph and coordinates updates.
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,

    /// Dirty nodes of the current pass, ordered by `(height, id)`.
    queue: BTreeSet<(u32, NodeId)>,

    /// Nodes whose pass state was changed during the current pass.
    touched: Vec<NodeId>,

    /// Check for cycles before rebinding an edge.
    check_cycles: bool,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            queue: BTreeSet::new(),
            touched: Vec::new(),
            check_cycles: true,
        }
    }

    /// Enable or disable the up-front reachability check in `replace_edge`.
    ///
    /// With the check disabled, a cycle is still caught once height
    /// adjustment exceeds the node count, but only after the edge was added.
    pub fn set_check_cycles(&mut self, enabled: bool) {
        self.check_cycles = enabled;
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        for upstream_id in node.upstreams() {
            if let Some(upstream) = self.nodes.get_mut(upstream_id) {
                upstream.remove_dependent(node_id);
            }
        }

        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                while dependent.remove_upstream(node_id) {}
            }
        }

        Some(node)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn height(&self, node_id: NodeId) -> Option<u32> {
        self.nodes.get(&node_id).map(Node::height)
    }

    /// Add a dependency edge: `dependent` reads from `upstream`.
    ///
    /// The dependent's height (and that of its own dependents) is updated
    /// immediately.
    pub fn add_edge(&mut self, upstream: NodeId, dependent: NodeId) -> Result<(), GraphError> {
        self.ensure_registered(upstream)?;
        self.ensure_registered(dependent)?;
        if self.check_cycles && self.reaches(dependent, upstream) {
            return Err(GraphError::Cycle { upstream, dependent });
        }

        self.link(upstream, dependent);
        if let Err(err) = self.adjust_heights(upstream, dependent) {
            self.unlink(upstream, dependent);
            return Err(err);
        }
        Ok(())
    }

    /// Remove one dependency edge.
    pub fn remove_edge(&mut self, upstream: NodeId, dependent: NodeId) -> Result<(), GraphError> {
        self.ensure_registered(dependent)?;
        self.unlink(upstream, dependent);
        self.adjust_heights(upstream, dependent)?;
        Ok(())
    }

    /// Atomically move one of `dependent`'s edges from `old` to `new`.
    ///
    /// Returns `true` if the dependent's height grew, which means `new` may
    /// not have settled yet in the current pass.
    pub fn replace_edge(
        &mut self,
        dependent: NodeId,
        old: NodeId,
        new: NodeId,
    ) -> Result<bool, GraphError> {
        self.ensure_registered(dependent)?;
        self.ensure_registered(new)?;
        if self.check_cycles && self.reaches(dependent, new) {
            return Err(GraphError::Cycle {
                upstream: new,
                dependent,
            });
        }

        let before = self.nodes[&dependent].height();
        self.unlink(old, dependent);
        self.link(new, dependent);
        if let Err(err) = self.adjust_heights(new, dependent) {
            // Heights are already rolled back; restore the old edge.
            self.unlink(new, dependent);
            self.link(old, dependent);
            return Err(err);
        }

        Ok(self.height(dependent).is_some_and(|height| height > before))
    }

    /// Get the dependents of a node, in registration order.
    pub fn dependents(&self, node_id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&node_id)
            .map(|node| node.dependents().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ------------------------------------------------------------------------
    // Propagation pass
    // ------------------------------------------------------------------------

    /// Start a pass for the given written inputs.
    pub fn begin_pass(&mut self, sources: &[NodeId]) {
        // A pass aborted by a panicking recomputation leaves state behind.
        self.end_pass();

        for &source in sources {
            if let Some(node) = self.nodes.get_mut(&source) {
                node.mark_settled();
                self.touched.push(source);
            }
        }
        for &source in sources {
            self.enqueue_dependents(source);
        }
    }

    /// Pop the next node to recompute, lowest height first.
    pub fn next_dirty(&mut self) -> Option<NodeId> {
        while let Some((height, node_id)) = self.queue.pop_first() {
            let Some(node) = self.nodes.get(&node_id) else {
                continue;
            };
            if node.state() != PassState::Dirty {
                continue;
            }
            if node.height() != height {
                // Height changed by a rebind after the node was queued.
                self.queue.insert((node.height(), node_id));
                continue;
            }
            return Some(node_id);
        }
        None
    }

    /// Record that a dirty node was recomputed.
    pub fn settle(&mut self, node_id: NodeId, changed: bool) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.mark_settled();
        }
        if changed {
            self.enqueue_dependents(node_id);
        }
    }

    /// Re-queue a dirty node at its current height without settling it.
    pub fn defer(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get(&node_id) {
            self.queue.insert((node.height(), node_id));
        }
    }

    /// Finish the pass: every touched node returns to clean.
    pub fn end_pass(&mut self) {
        for node_id in self.touched.drain(..) {
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.mark_clean();
            }
        }
        self.queue.clear();
    }

    fn enqueue_dependents(&mut self, node_id: NodeId) {
        let dependents = self.dependents(node_id);
        for dependent_id in dependents {
            let Some(dependent) = self.nodes.get_mut(&dependent_id) else {
                continue;
            };
            match dependent.state() {
                PassState::Clean => {
                    dependent.mark_dirty();
                    self.queue.insert((dependent.height(), dependent_id));
                    self.touched.push(dependent_id);
                }
                PassState::Dirty => {}
                PassState::Settled => {
                    tracing::warn!(
                        node = %dependent_id,
                        upstream = %node_id,
                        "dependent already settled this pass; upstream changed out of height order"
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Edges and heights
    // ------------------------------------------------------------------------

    fn ensure_registered(&self, node_id: NodeId) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node_id) {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(node_id))
        }
    }

    fn link(&mut self, upstream: NodeId, dependent: NodeId) {
        if let Some(up) = self.nodes.get_mut(&upstream) {
            up.add_dependent(dependent);
        }
        if let Some(dep) = self.nodes.get_mut(&dependent) {
            dep.add_upstream(upstream);
        }
    }

    fn unlink(&mut self, upstream: NodeId, dependent: NodeId) {
        let still_linked = self
            .nodes
            .get_mut(&dependent)
            .map(|dep| dep.remove_upstream(upstream))
            .unwrap_or(false);
        if !still_linked {
            if let Some(up) = self.nodes.get_mut(&upstream) {
                up.remove_dependent(dependent);
            }
        }
    }

    /// Whether `target` is `from` or one of its transitive dependents.
    fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(node_id) = queue.pop_front() {
            if node_id == target {
                return true;
            }
            if !seen.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                queue.extend(node.dependents().iter().copied());
            }
        }
        false
    }

    fn computed_height(&self, node_id: NodeId) -> u32 {
        self.nodes
            .get(&node_id)
            .map(|node| {
                node.upstreams()
                    .iter()
                    .filter_map(|up| self.nodes.get(up))
                    .map(|up| up.height() + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Recompute the height of `dependent` and everything downstream of it.
    ///
    /// On a cycle every height changed here is restored before returning.
    fn adjust_heights(&mut self, upstream: NodeId, dependent: NodeId) -> Result<(), GraphError> {
        // No height in an acyclic graph can exceed the node count.
        let limit = self.nodes.len() as u32;
        let mut queue = VecDeque::from([dependent]);
        let mut previous: Vec<(NodeId, u32)> = Vec::new();

        while let Some(node_id) = queue.pop_front() {
            let height = self.computed_height(node_id);
            let Some(current) = self.height(node_id) else {
                continue;
            };
            if current == height {
                continue;
            }
            if height > limit {
                for (id, old) in previous.into_iter().rev() {
                    if let Some(node) = self.nodes.get_mut(&id) {
                        node.set_height(old);
                    }
                }
                return Err(GraphError::Cycle { upstream, dependent });
            }

            previous.push((node_id, current));
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.set_height(height);
                queue.extend(node.dependents().iter().copied());
            }
        }
        Ok(())
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}
