//! Meridian Core
//!
//! This crate provides the incremental-computation runtime behind the
//! Meridian map browser. Map state (camera, zoom, selected layers, loaded
//! tiles) lives in cells; everything shown on screen is derived from them and
//! kept up to date by a glitch-free propagation engine.
//!
//! It implements:
//!
//! - Input cells and derived cells (`map`, `zip2`, `flat_map`)
//! - Boolean and equality helpers built on those combinators
//! - Observers with explicit disposal, and `bind` into external state
//! - A height-ordered propagation engine with cutoffs and write batching
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `graph`: the untyped dependency graph and the pass scheduler
//! - `reactive`: typed cells, combinators, observers and the runtime
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use meridian_core::{DisposeBag, InputCell};
//!
//! let zoom = InputCell::new(4);
//! let labels = zoom.map(|z| *z >= 6);
//! let detail = zoom.zip2(&labels, |z, labels| {
//!     if *labels { format!("z{z} with labels") } else { format!("z{z}") }
//! });
//!
//! let shown = Rc::new(RefCell::new(String::new()));
//! let mut owner = DisposeBag::new();
//! detail.bind(shown.clone(), &mut owner);
//! assert_eq!(*shown.borrow(), "z4");
//!
//! zoom.write(7);
//! assert_eq!(*shown.borrow(), "z7 with labels");
//! ```

pub mod graph;
pub mod reactive;

mod config;
mod error;

pub use config::RuntimeConfig;
pub use error::{ConfigError, GraphError, RuntimeError};
pub use reactive::{Cutoff, Disposable, DisposeBag, Incr, InputCell, Owned, Runtime};
