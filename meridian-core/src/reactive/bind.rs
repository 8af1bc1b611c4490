//! Binding cells to external state.
//!
//! `bind` is `observe` with a fixed callback: every delivered value is
//! assigned into a [`Slot`], and the subscription is owned by a
//! [`DisposeBag`] so it ends when the owner does.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::cell::Incr;
use super::dispose::DisposeBag;

/// A place a bound cell writes its values into.
pub trait Slot<T> {
    fn assign(&mut self, value: T);
}

impl<T> Slot<T> for Rc<RefCell<T>> {
    fn assign(&mut self, value: T) {
        *self.borrow_mut() = value;
    }
}

impl<T: Copy> Slot<T> for Rc<Cell<T>> {
    fn assign(&mut self, value: T) {
        self.set(value);
    }
}

/// Adapts a closure into a [`Slot`].
pub struct Setter<F>(pub F);

impl<T, F: FnMut(T)> Slot<T> for Setter<F> {
    fn assign(&mut self, value: T) {
        (self.0)(value);
    }
}

impl<T: Clone + 'static> Incr<T> {
    /// Keep `slot` in sync with this cell for as long as `owner` lives.
    ///
    /// The slot receives the current value immediately.
    pub fn bind<S>(&self, mut slot: S, owner: &mut DisposeBag)
    where
        S: Slot<T> + 'static,
    {
        owner.add(self.observe(move |value| slot.assign(value.clone())));
    }
}
