//! Cell Implementation
//!
//! A cell holds a value and stands for one node in the dependency graph.
//! Input cells are written from outside; derived cells are produced by the
//! combinators in `combinators.rs` and recompute from their upstreams.
//!
//! # Ownership
//!
//! Owning references flow strictly upstream: a derived cell holds `Incr`
//! handles to the cells it reads, while the graph only records dependents by
//! id. A cell is released as soon as nothing holds it (no handle, no
//! observer, no downstream cell), which unregisters its node and releases its
//! own upstream handles in turn.
//!
//! # Memory Layout
//!
//! Each cell consists of:
//! - A registration handle (unregisters the node on drop)
//! - The value and the stamp of its last change
//! - The cutoff deciding whether a new value counts as a change
//! - The observer list
//! - For derived cells, the recomputation (which owns the upstream handles)

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::ops::Deref;
use std::rc::{Rc, Weak};

use crate::graph::{NodeId, NodeKind};

use super::combinators::{Derivation, Step};
use super::observer::Observer;
use super::runtime::{NodeHandle, Reactive, Recompute, Runtime};

/// Decides whether a recomputed value counts as a change.
///
/// A cut value is not stored and not forwarded to dependents or observers.
pub enum Cutoff<T> {
    /// Never cut: every recomputation is forwarded. Used for payloads that
    /// have no meaningful equality.
    Never,

    /// Cut when the comparator reports the values equal.
    Eq(fn(&T, &T) -> bool),

    /// Cut when the closure reports the values equal.
    Custom(Rc<dyn Fn(&T, &T) -> bool>),
}

impl<T> Cutoff<T> {
    pub fn custom(f: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Cutoff::Custom(Rc::new(f))
    }

    /// Whether moving from `old` to `new` should be suppressed.
    pub fn should_cut(&self, old: &T, new: &T) -> bool {
        match self {
            Cutoff::Never => false,
            Cutoff::Eq(eq) => eq(old, new),
            Cutoff::Custom(eq) => eq(old, new),
        }
    }
}

impl<T: PartialEq> Cutoff<T> {
    /// Cut when `old == new`.
    pub fn partial_eq() -> Self {
        Cutoff::Eq(<T as PartialEq>::eq)
    }
}

impl<T> Clone for Cutoff<T> {
    fn clone(&self) -> Self {
        match self {
            Cutoff::Never => Cutoff::Never,
            Cutoff::Eq(eq) => Cutoff::Eq(*eq),
            Cutoff::Custom(eq) => Cutoff::Custom(Rc::clone(eq)),
        }
    }
}

impl<T> Debug for Cutoff<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cutoff::Never => f.write_str("Cutoff::Never"),
            Cutoff::Eq(_) => f.write_str("Cutoff::Eq"),
            Cutoff::Custom(_) => f.write_str("Cutoff::Custom"),
        }
    }
}

/// Shared state of one cell.
pub(crate) struct CellInner<T> {
    // Declared first so the node leaves the graph before the upstream
    // handles held by `derivation` are released.
    pub(super) handle: NodeHandle,
    pub(super) value: RefCell<T>,
    /// Stamp of the last change; 0 if the value never changed.
    pub(super) changed_at: Cell<u64>,
    pub(super) cutoff: Cutoff<T>,
    pub(super) observers: RefCell<Vec<Observer<T>>>,
    pub(super) derivation: Option<RefCell<Box<dyn Derivation<T>>>>,
    /// Value and stamp before the first write of the current flush round.
    round_start: RefCell<Option<(T, u64)>>,
}

impl<T> CellInner<T> {
    pub(super) fn node_id(&self) -> NodeId {
        self.handle.node_id()
    }

    /// Store a new value unless the cutoff suppresses it.
    ///
    /// Returns `true` if the value changed.
    pub(super) fn store(&self, value: T) -> bool {
        if self.cutoff.should_cut(&self.value.borrow(), &value) {
            return false;
        }
        *self.value.borrow_mut() = value;
        self.changed_at.set(Runtime::next_stamp());
        true
    }
}

impl<T: Clone + 'static> CellInner<T> {
    /// Apply a queued write. Returns the node id if the value changed.
    fn write(&self, value: T) -> Option<NodeId> {
        let start = self
            .round_start
            .borrow()
            .is_none()
            .then(|| (self.value.borrow().clone(), self.changed_at.get()));
        if !self.store(value) {
            return None;
        }
        if start.is_some() {
            *self.round_start.borrow_mut() = start;
        }
        Some(self.node_id())
    }
}

impl<T: Clone + 'static> Reactive for CellInner<T> {
    fn node_id(&self) -> NodeId {
        self.handle.node_id()
    }

    fn recompute(&self) -> Recompute {
        let Some(derivation) = &self.derivation else {
            return Recompute::Unchanged;
        };
        let step = derivation.borrow_mut().compute(self.node_id());
        match step {
            Step::Defer => Recompute::Deferred,
            Step::Value(value) => {
                if self.store(value) {
                    Recompute::Changed
                } else {
                    Recompute::Unchanged
                }
            }
        }
    }

    fn notify(&self) -> usize {
        self.deliver()
    }

    fn commit_writes(&self) -> bool {
        let Some((start, stamp)) = self.round_start.borrow_mut().take() else {
            return true;
        };
        if !self.cutoff.should_cut(&start, &self.value.borrow()) {
            return true;
        }
        // The round's writes cancelled out: restore the value it started with.
        *self.value.borrow_mut() = start;
        self.changed_at.set(stamp);
        false
    }
}

/// A handle to a cell: an input, or a derived cell built by a combinator.
///
/// Cloning the handle shares the cell.
///
/// # Example
///
/// ```
/// use meridian_core::InputCell;
///
/// let zoom = InputCell::new(3);
/// let scale = zoom.map(|z| 1u32 << z);
/// assert_eq!(scale.value(), 8);
///
/// zoom.write(5);
/// assert_eq!(scale.value(), 32);
/// ```
pub struct Incr<T> {
    pub(super) inner: Rc<CellInner<T>>,
}

impl<T: Clone + 'static> Incr<T> {
    /// Build a derived cell. `initial` must equal what the derivation would
    /// compute from the current upstream values.
    pub(crate) fn derived(
        initial: T,
        cutoff: Cutoff<T>,
        upstreams: &[NodeId],
        derivation: impl Derivation<T> + 'static,
    ) -> Self {
        Self::build(
            NodeKind::Derived,
            initial,
            cutoff,
            upstreams,
            Some(Box::new(derivation)),
        )
    }

    fn build(
        kind: NodeKind,
        value: T,
        cutoff: Cutoff<T>,
        upstreams: &[NodeId],
        derivation: Option<Box<dyn Derivation<T>>>,
    ) -> Self {
        let node_id = NodeId::new();
        let inner = Rc::new_cyclic(|weak: &Weak<CellInner<T>>| {
            let reactive: Weak<dyn Reactive> = weak.clone();
            CellInner {
                handle: Runtime::register(node_id, kind, upstreams, reactive),
                value: RefCell::new(value),
                changed_at: Cell::new(0),
                cutoff,
                observers: RefCell::new(Vec::new()),
                derivation: derivation.map(RefCell::new),
                round_start: RefCell::new(None),
            }
        });
        Self { inner }
    }

    /// Get a clone of the current value.
    pub fn value(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T> Incr<T> {
    /// Get the cell's node id.
    pub fn id(&self) -> NodeId {
        self.inner.node_id()
    }

    /// Read the current value without cloning it.
    ///
    /// `f` must not write to cells; writes are only allowed from observers.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.inner.value.borrow();
        f(&*value)
    }

    /// Topological rank of the cell: 0 for inputs.
    pub fn height(&self) -> u32 {
        Runtime::height(self.id()).unwrap_or(0)
    }

    /// Whether both handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Incr<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stamp of the last change of this cell.
    pub(crate) fn changed_at(&self) -> u64 {
        self.inner.changed_at.get()
    }
}

impl<T> Clone for Incr<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Incr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incr")
            .field("id", &self.id())
            .field("value", &*self.inner.value.borrow())
            .field("observer_count", &self.inner.observers.borrow().len())
            .finish()
    }
}

/// A cell with no upstream, written from outside the graph.
///
/// Derefs to [`Incr`], so every combinator is available directly.
pub struct InputCell<T> {
    incr: Incr<T>,
}

impl<T: Clone + PartialEq + 'static> InputCell<T> {
    /// Create an input that ignores writes of an equal value.
    pub fn new(value: T) -> Self {
        Self::with_cutoff(value, Cutoff::partial_eq())
    }
}

impl<T: Clone + 'static> InputCell<T> {
    /// Create an input with an explicit cutoff. Use `Cutoff::Never` for
    /// payloads without equality: every write then propagates.
    pub fn with_cutoff(value: T, cutoff: Cutoff<T>) -> Self {
        Self {
            incr: Incr::build(NodeKind::Input, value, cutoff, &[], None),
        }
    }

    /// Write a new value.
    ///
    /// Outside a batch or pass, this propagates synchronously: when it
    /// returns, every dependent cell holds its new value and every affected
    /// observer has run. A value the cutoff considers equal is ignored.
    ///
    /// Inside `Runtime::batch` or an observer callback, the write is queued
    /// and applied once the batch or current pass finishes.
    pub fn write(&self, value: T) {
        let inner = Rc::clone(&self.incr.inner);
        Runtime::schedule_write(Box::new(move || inner.write(value)));
    }

    /// Write a value computed from the current one.
    ///
    /// The current value is read now, so inside a batch it does not see
    /// writes that are still queued.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = self.incr.with(f);
        self.write(next);
    }

    /// Get a read-only handle to this input.
    pub fn incr(&self) -> Incr<T> {
        self.incr.clone()
    }
}

impl<T> Deref for InputCell<T> {
    type Target = Incr<T>;

    fn deref(&self) -> &Incr<T> {
        &self.incr
    }
}

impl<T> Clone for InputCell<T> {
    fn clone(&self) -> Self {
        Self {
            incr: self.incr.clone(),
        }
    }
}

impl<T: Debug> Debug for InputCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InputCell").field(&self.incr).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_write_and_read() {
        let input = InputCell::new(0);
        assert_eq!(input.value(), 0);

        input.write(42);
        assert_eq!(input.value(), 42);
    }

    #[test]
    fn input_update() {
        let input = InputCell::new(10);
        input.update(|v| v + 5);
        assert_eq!(input.value(), 15);
    }

    #[test]
    fn equal_write_runs_no_pass() {
        Runtime::reset_stats();
        let input = InputCell::new(7);
        input.write(7);
        assert_eq!(Runtime::stats().passes, 0);

        input.write(8);
        assert_eq!(Runtime::stats().passes, 1);
    }

    #[test]
    fn never_cutoff_always_propagates() {
        Runtime::reset_stats();
        let input = InputCell::with_cutoff(1.0_f64, Cutoff::Never);
        input.write(1.0);
        input.write(1.0);
        assert_eq!(Runtime::stats().passes, 2);
    }

    #[test]
    fn batch_that_reverts_input_runs_no_pass() {
        Runtime::reset_stats();
        let input = InputCell::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let _subscription = input.observe(move |v| log.borrow_mut().push(*v));

        Runtime::batch(|| {
            input.write(1);
            input.write(0);
        });
        assert_eq!(*seen.borrow(), vec![0]);
        assert_eq!(input.value(), 0);
        assert_eq!(Runtime::stats().passes, 0);

        Runtime::batch(|| {
            input.write(1);
            input.write(0);
            input.write(2);
        });
        assert_eq!(*seen.borrow(), vec![0, 2]);
    }

    #[test]
    fn reverted_write_keeps_start_value_under_custom_cutoff() {
        Runtime::reset_stats();
        let near = Cutoff::custom(|a: &f64, b: &f64| (a - b).abs() < 0.5);
        let input = InputCell::with_cutoff(1.0_f64, near);

        Runtime::batch(|| {
            input.write(3.0);
            input.write(1.2);
        });
        assert_eq!(input.value(), 1.0);
        assert_eq!(Runtime::stats().passes, 0);
    }

    #[test]
    fn never_cutoff_forwards_reverting_batch() {
        Runtime::reset_stats();
        let input = InputCell::with_cutoff(0, Cutoff::Never);
        Runtime::batch(|| {
            input.write(1);
            input.write(0);
        });
        assert_eq!(Runtime::stats().passes, 1);
    }

    #[test]
    fn custom_cutoff() {
        let cutoff = Cutoff::custom(|a: &f64, b: &f64| (a - b).abs() < 0.5);
        assert!(cutoff.should_cut(&1.0, &1.2));
        assert!(!cutoff.should_cut(&1.0, &2.0));
        assert!(!Cutoff::<i32>::Never.should_cut(&1, &1));
        assert!(Cutoff::<i32>::partial_eq().should_cut(&1, &1));
    }

    #[test]
    fn clones_share_the_cell() {
        let first = InputCell::new("north".to_string());
        let second = first.clone();
        let read = first.incr();

        second.write("south".to_string());
        assert_eq!(first.value(), "south");
        assert!(read.ptr_eq(&second));
        assert_eq!(read.id(), first.id());
    }

    #[test]
    fn dropping_last_handle_releases_node() {
        let before = Runtime::node_count();
        let input = InputCell::new(1);
        assert_eq!(Runtime::node_count(), before + 1);
        assert_eq!(input.height(), 0);

        drop(input);
        assert_eq!(Runtime::node_count(), before);
    }

    #[test]
    fn ids_are_unique() {
        let a = InputCell::new(0);
        let b = InputCell::new(0);
        assert_ne!(a.id(), b.id());
    }
}
