//! Disposal handles.
//!
//! A [`Disposable`] undoes one registration, usually an observer. Disposing
//! is idempotent, and dropping an undisposed handle disposes it, so a
//! subscription lives exactly as long as its handle.
//!
//! A [`DisposeBag`] collects handles whose lifetime is tied to some owner,
//! and [`Owned`] pairs a resource with such a bag.

use std::fmt;
use std::ops::{Deref, DerefMut};

/// Handle that undoes a registration when disposed or dropped.
#[must_use = "dropping a Disposable disposes it immediately"]
pub struct Disposable {
    action: Option<Box<dyn FnOnce()>>,
}

impl Disposable {
    /// Wrap the action that undoes a registration.
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// A handle with nothing to undo.
    pub fn empty() -> Self {
        Self { action: None }
    }

    /// Run the undo action. Calling this again does nothing.
    pub fn dispose(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.action.is_none()
    }
}

impl Drop for Disposable {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A set of handles disposed together.
///
/// Handles are disposed newest first, when the bag is disposed or dropped.
#[derive(Default)]
pub struct DisposeBag {
    items: Vec<Disposable>,
}

impl DisposeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, disposable: Disposable) {
        self.items.push(disposable);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Dispose every handle. The bag can be reused afterwards.
    pub fn dispose(&mut self) {
        while let Some(mut item) = self.items.pop() {
            item.dispose();
        }
    }
}

impl Extend<Disposable> for DisposeBag {
    fn extend<I: IntoIterator<Item = Disposable>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl Drop for DisposeBag {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for DisposeBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposeBag")
            .field("len", &self.items.len())
            .finish()
    }
}

/// A resource together with the subscriptions that feed it.
///
/// Dropping an `Owned` disposes the subscriptions before the resource is
/// dropped, so no callback ever sees a half-dropped resource.
pub struct Owned<R> {
    // Field order matters: the bag must drop first.
    bag: DisposeBag,
    resource: R,
}

impl<R> Owned<R> {
    pub fn new(resource: R) -> Self {
        Self {
            bag: DisposeBag::new(),
            resource,
        }
    }

    /// Tie a subscription to this resource's lifetime.
    pub fn add(&mut self, disposable: Disposable) {
        self.bag.add(disposable);
    }

    pub fn bag_mut(&mut self) -> &mut DisposeBag {
        &mut self.bag
    }

    /// Dispose the subscriptions and hand back the resource.
    pub fn release(mut self) -> R {
        self.bag.dispose();
        let Owned { bag, resource } = self;
        drop(bag);
        resource
    }
}

impl<R> Deref for Owned<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R> DerefMut for Owned<R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.resource
    }
}

impl<R: fmt::Debug> fmt::Debug for Owned<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owned")
            .field("resource", &self.resource)
            .field("subscriptions", &self.bag.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn counting() -> (Rc<Cell<usize>>, Disposable) {
        let count = Rc::new(Cell::new(0));
        let hits = count.clone();
        (count, Disposable::new(move || hits.set(hits.get() + 1)))
    }

    #[test]
    fn dispose_runs_once() {
        let (count, mut disposable) = counting();
        assert!(!disposable.is_disposed());

        disposable.dispose();
        disposable.dispose();
        drop(disposable);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn drop_disposes() {
        let (count, disposable) = counting();
        drop(disposable);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn empty_is_disposed() {
        let mut disposable = Disposable::empty();
        assert!(disposable.is_disposed());
        disposable.dispose();
    }

    #[test]
    fn bag_disposes_newest_first() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut bag = DisposeBag::new();
        for i in 0..3 {
            let order = order.clone();
            bag.add(Disposable::new(move || order.borrow_mut().push(i)));
        }
        assert_eq!(bag.len(), 3);

        bag.dispose();
        assert!(bag.is_empty());
        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn bag_drop_disposes_everything() {
        let (first, a) = counting();
        let (second, b) = counting();
        let mut bag = DisposeBag::new();
        bag.extend([a, b]);
        drop(bag);
        assert_eq!((first.get(), second.get()), (1, 1));
    }

    #[test]
    fn owned_disposes_before_resource_drops() {
        struct Resource(Rc<RefCell<Vec<&'static str>>>);
        impl Drop for Resource {
            fn drop(&mut self) {
                self.0.borrow_mut().push("resource");
            }
        }

        let events = Rc::new(RefCell::new(Vec::new()));
        let mut owned = Owned::new(Resource(events.clone()));
        let log = events.clone();
        owned.add(Disposable::new(move || log.borrow_mut().push("subscription")));

        drop(owned);
        assert_eq!(*events.borrow(), vec!["subscription", "resource"]);
    }

    #[test]
    fn owned_release_keeps_resource() {
        let (count, disposable) = counting();
        let mut owned = Owned::new(vec![1, 2, 3]);
        owned.bag_mut().add(disposable);
        owned.push(4);

        let resource = owned.release();
        assert_eq!(count.get(), 1);
        assert_eq!(resource, vec![1, 2, 3, 4]);
    }
}
