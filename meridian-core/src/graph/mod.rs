//! Dependency Graph
//!
//! This module implements the structural half of the propagation engine: the
//! graph of cells and the order in which they are recomputed.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent cells (inputs or derived cells)
//! - Edges represent dependencies: if B reads A, there is an edge from A to B
//!
//! When an input is written, the scheduler walks the affected part of the
//! graph in height order so that every node settles after all of its
//! upstreams.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized (one scheduler per thread) rather than stored
//!    as per-cell link lists, so heights and pass state live in one place.
//!
//! 2. The graph is indexed by node ID for O(1) lookups.
//!
//! 3. Both directions are stored. Upstream edges are needed for heights,
//!    dependent edges for propagation. Neither direction owns anything: cell
//!    lifetimes are managed by the typed handles in `reactive`.

mod node;
mod scheduler;

pub use node::{Node, NodeId, NodeKind, PassState};
pub use scheduler::UpdateScheduler;
