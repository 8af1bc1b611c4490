//! Reactive Primitives
//!
//! This module implements the typed half of the propagation engine: cells,
//! the combinators that derive new cells, and the observers that watch them.
//!
//! # Concepts
//!
//! ## Cells
//!
//! An [`InputCell`] holds a value written from outside the graph. An
//! [`Incr`] is a read handle to any cell; derived cells are built with
//! `map`, `zip2` and `flat_map`, and recompute eagerly whenever an upstream
//! changes.
//!
//! ## Observers
//!
//! `observe` registers a callback that runs immediately with the current
//! value and then once per change. The returned [`Disposable`] keeps the
//! observed cell (and its upstreams) alive until it is disposed.
//!
//! ## Propagation
//!
//! A write starts a pass that recomputes the affected cells in height order,
//! so each cell recomputes once, after all of its upstreams. Observers run
//! only after the whole pass has settled and never see a mix of old and new
//! values. Writes made by observers are queued and run in a later pass.
//!
//! # Implementation Notes
//!
//! Ownership flows upstream: derived cells own their upstream handles, and
//! the graph refers to dependents by id only. Releasing the last handle to a
//! cell removes its node and releases its upstreams in turn.

mod bind;
mod cell;
mod combinators;
mod context;
mod dispose;
mod observer;
mod ops;
mod runtime;

pub use bind::{Setter, Slot};
pub use cell::{Cutoff, Incr, InputCell};
pub use combinators::zip2;
pub use dispose::{DisposeBag, Disposable, Owned};
pub use observer::ObserverId;
pub use runtime::{PassStats, Runtime};
