//! Observer registry for the reactive system.
//!
//! An observer is a callback registered on exactly one cell. It runs once
//! immediately when registered, then once per change of the cell, after
//! every cell touched by the triggering write has settled.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::cell::{CellInner, Incr};
use super::dispose::Disposable;
use super::runtime::Runtime;

/// Unique identifier for an observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

type Callback<T> = Rc<RefCell<dyn FnMut(&T)>>;

/// A registered callback.
pub(crate) struct Observer<T> {
    id: ObserverId,
    callback: Callback<T>,
    /// Change stamp of the value this observer saw last.
    delivered_at: Cell<u64>,
}

impl<T> Observer<T> {
    fn new(id: ObserverId, callback: Callback<T>, delivered_at: u64) -> Self {
        Self {
            id,
            callback,
            delivered_at: Cell::new(delivered_at),
        }
    }
}

impl<T: Clone + 'static> CellInner<T> {
    /// Deliver the current value to every observer that has not seen it.
    ///
    /// Works on a snapshot of the list, so callbacks may register or dispose
    /// observers. An observer disposed by an earlier callback is skipped.
    pub(super) fn deliver(&self) -> usize {
        let stamp = self.changed_at.get();
        let value = self.value.borrow().clone();
        let snapshot: Vec<(ObserverId, Callback<T>)> = self
            .observers
            .borrow()
            .iter()
            .map(|observer| (observer.id, Rc::clone(&observer.callback)))
            .collect();

        let mut delivered = 0;
        for (id, callback) in snapshot {
            let fresh = self
                .observers
                .borrow()
                .iter()
                .find(|observer| observer.id == id)
                .is_some_and(|observer| observer.delivered_at.replace(stamp) != stamp);
            if !fresh {
                continue;
            }
            tracing::trace!(node = %self.node_id(), observer = ?id, "notifying observer");
            (callback.borrow_mut())(&value);
            delivered += 1;
        }
        delivered
    }

    fn remove_observer(&self, id: ObserverId) -> Option<Observer<T>> {
        let mut observers = self.observers.borrow_mut();
        let position = observers.iter().position(|observer| observer.id == id)?;
        Some(observers.remove(position))
    }
}

impl<T: Clone + 'static> Incr<T> {
    /// Register `callback`, call it right away with the current value, and
    /// again for every later change.
    ///
    /// The returned [`Disposable`] keeps this cell (and everything upstream
    /// of it) alive. Disposing it, or dropping it, unregisters the callback.
    ///
    /// Writes made from inside the callback are queued and propagate once the
    /// current pass has finished.
    ///
    /// # Example
    ///
    /// ```
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    /// use meridian_core::InputCell;
    ///
    /// let x = InputCell::new(0);
    /// let y = x.map(|v| v * 2);
    /// let z = x.map(|v| v + 1);
    /// let w = y.zip2(&z, |a, b| a + b);
    ///
    /// let seen = Rc::new(RefCell::new(Vec::new()));
    /// let log = seen.clone();
    /// let _subscription = w.observe(move |v| log.borrow_mut().push(*v));
    ///
    /// x.write(5);
    /// x.write(5);
    /// assert_eq!(*seen.borrow(), vec![1, 16]);
    /// ```
    pub fn observe<F>(&self, callback: F) -> Disposable
    where
        F: FnMut(&T) + 'static,
    {
        let id = ObserverId::new();
        let callback: Callback<T> = Rc::new(RefCell::new(callback));
        let inner = Rc::clone(&self.inner);

        Runtime::batch(|| {
            let stamp = inner.changed_at.get();
            inner
                .observers
                .borrow_mut()
                .push(Observer::new(id, Rc::clone(&callback), stamp));
            let value = inner.value.borrow().clone();
            (callback.borrow_mut())(&value);
        });

        Disposable::new(move || {
            let removed = inner.remove_observer(id);
            tracing::trace!(node = %inner.node_id(), observer = ?id, "observer disposed");
            // The callback and then the cell handle are released here, which
            // may release upstream cells in turn.
            drop(removed);
        })
    }

    /// Number of observers registered on this cell.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::InputCell;

    fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl FnMut(&T)) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        (seen, move |v: &T| log.borrow_mut().push(v.clone()))
    }

    #[test]
    fn observer_ids_are_unique() {
        let id1 = ObserverId::new();
        let id2 = ObserverId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn observe_calls_immediately_then_on_change() {
        let input = InputCell::new(1);
        let (seen, callback) = recorder();
        let _subscription = input.observe(callback);
        assert_eq!(*seen.borrow(), vec![1]);

        input.write(2);
        input.write(2);
        input.write(3);
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn disposed_observer_is_not_called() {
        let input = InputCell::new(0);
        let (seen, callback) = recorder();
        let mut subscription = input.observe(callback);
        assert_eq!(input.observer_count(), 1);

        subscription.dispose();
        subscription.dispose();
        assert_eq!(input.observer_count(), 0);

        input.write(1);
        assert_eq!(*seen.borrow(), vec![0]);
    }

    #[test]
    fn observer_sees_settled_graph() {
        let x = InputCell::new(1);
        let doubled = x.map(|v| v * 2);
        let tripled = x.map(|v| v * 3);

        let (inner_doubled, inner_tripled) = (doubled.clone(), tripled.clone());
        let mismatches = Rc::new(Cell::new(0));
        let counter = mismatches.clone();
        let _subscription = doubled.observe(move |d| {
            // `tripled` may settle after `doubled`, but never after observers run.
            if inner_tripled.value() * 2 != *d * 3 || inner_doubled.value() != *d {
                counter.set(counter.get() + 1);
            }
        });

        for v in 2..6 {
            x.write(v);
        }
        assert_eq!(mismatches.get(), 0);
    }

    #[test]
    fn write_from_callback_is_applied_after_pass() {
        let source = InputCell::new(0);
        let mirror = InputCell::new(0);
        let mirror_writer = mirror.clone();
        let _sync = source.observe(move |v| mirror_writer.write(*v * 10));

        let (seen, callback) = recorder();
        let _watch = mirror.observe(callback);
        assert_eq!(*seen.borrow(), vec![0]);

        source.write(4);
        assert_eq!(mirror.value(), 40);
        assert_eq!(*seen.borrow(), vec![0, 40]);
    }

    #[test]
    fn write_from_initial_callback_is_delivered() {
        let input = InputCell::new(0);
        let writer = input.clone();
        let (seen, mut record) = recorder();
        let _subscription = input.observe(move |v: &i32| {
            record(v);
            if *v == 0 {
                writer.write(1);
            }
        });
        assert_eq!(*seen.borrow(), vec![0, 1]);
    }

    #[test]
    fn observer_disposed_by_earlier_callback_is_skipped() {
        let input = InputCell::new(0);
        let victim: Rc<RefCell<Option<Disposable>>> = Rc::new(RefCell::new(None));

        let slot = victim.clone();
        let _killer = input.observe(move |v| {
            if *v > 0 {
                if let Some(mut subscription) = slot.borrow_mut().take() {
                    subscription.dispose();
                }
            }
        });
        let (seen, callback) = recorder();
        *victim.borrow_mut() = Some(input.observe(callback));

        input.write(1);
        assert_eq!(*seen.borrow(), vec![0]);
    }

    #[test]
    fn observer_keeps_derived_cell_alive() {
        let input = InputCell::new(2);
        let before = Runtime::node_count();
        let (seen, callback) = recorder();

        let subscription = input.map(|v| v * v).observe(callback);
        assert_eq!(Runtime::node_count(), before + 1);

        input.write(3);
        assert_eq!(*seen.borrow(), vec![4, 9]);

        drop(subscription);
        assert_eq!(Runtime::node_count(), before);
    }

    #[test]
    fn observer_registered_mid_pass_is_not_called_twice() {
        let input = InputCell::new(0);
        let doubled = input.map(|v| v * 2);
        let late: Rc<RefCell<Vec<Disposable>>> = Rc::new(RefCell::new(Vec::new()));
        let (seen, callback) = recorder();
        let callback = Rc::new(RefCell::new(callback));

        let (late_slot, doubled_handle) = (late.clone(), doubled.clone());
        let _spawner = input.observe(move |v| {
            if *v == 1 {
                let callback = callback.clone();
                let subscription = doubled_handle.observe(move |d| (callback.borrow_mut())(d));
                late_slot.borrow_mut().push(subscription);
            }
        });

        input.write(1);
        assert_eq!(*seen.borrow(), vec![2]);
    }
}
