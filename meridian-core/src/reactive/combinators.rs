//! Combinators
//!
//! Derived cells are built by three combinators:
//!
//! - `map`: one upstream, `value = f(upstream)`
//! - `zip2`: two upstreams, `value = f(a, b)`
//! - `flat_map`: one upstream mapped by `f` to another cell, whose value
//!   the derived cell adopts. The subscription to that inner cell is rebound
//!   whenever `f` returns a different cell.
//!
//! Every derived cell recomputes eagerly, once per pass, after all of its
//! upstreams have settled. Each combinator has a `_with_cutoff` variant; the
//! plain form requires `PartialEq` and only forwards values that differ.
//!
//! Recomputation functions must be pure. Observable side effects belong in
//! `observe` callbacks.

use crate::graph::NodeId;

use super::cell::{Cutoff, Incr};
use super::runtime::Runtime;

/// Result of running a derivation.
pub(crate) enum Step<T> {
    Value(T),
    /// The node's height grew; run again once the new upstream has settled.
    Defer,
}

/// How a derived cell computes its value from its upstreams.
pub(crate) trait Derivation<T> {
    fn compute(&mut self, node_id: NodeId) -> Step<T>;
}

struct Map<A, F> {
    upstream: Incr<A>,
    f: F,
}

impl<A, T, F> Derivation<T> for Map<A, F>
where
    F: Fn(&A) -> T,
{
    fn compute(&mut self, _node_id: NodeId) -> Step<T> {
        Step::Value(self.upstream.with(&self.f))
    }
}

struct Zip2<A, B, F> {
    a: Incr<A>,
    b: Incr<B>,
    f: F,
}

impl<A, B, T, F> Derivation<T> for Zip2<A, B, F>
where
    F: Fn(&A, &B) -> T,
{
    fn compute(&mut self, _node_id: NodeId) -> Step<T> {
        let f = &self.f;
        Step::Value(self.a.with(|a| self.b.with(|b| f(a, b))))
    }
}

struct FlatMap<A, T, F> {
    outer: Incr<A>,
    f: F,
    inner: Incr<T>,
    /// Change stamp of `outer` the last time `f` ran.
    outer_seen: u64,
}

impl<A, T, F> Derivation<T> for FlatMap<A, T, F>
where
    T: Clone + 'static,
    F: Fn(&A) -> Incr<T>,
{
    fn compute(&mut self, node_id: NodeId) -> Step<T> {
        let outer_stamp = self.outer.changed_at();

        // If only the inner cell changed, keep the binding and adopt its value.
        if outer_stamp != self.outer_seen {
            self.outer_seen = outer_stamp;
            let next = self.outer.with(&self.f);

            if !next.ptr_eq(&self.inner) {
                let grew = Runtime::rebind(node_id, self.inner.id(), next.id());
                // Releases the previous inner subscription.
                drop(std::mem::replace(&mut self.inner, next));

                if grew {
                    // The new inner may still be dirty in this pass. The
                    // scheduler brings us back once it has settled; `f` does
                    // not run again since `outer_seen` is up to date.
                    return Step::Defer;
                }
            }
        }

        Step::Value(self.inner.value())
    }
}

impl<T: Clone + 'static> Incr<T> {
    /// Derive a cell holding `f(value)`, forwarding only distinct values.
    pub fn map<U, F>(&self, f: F) -> Incr<U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&T) -> U + 'static,
    {
        self.map_with_cutoff(Cutoff::partial_eq(), f)
    }

    pub fn map_with_cutoff<U, F>(&self, cutoff: Cutoff<U>, f: F) -> Incr<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> U + 'static,
    {
        let initial = self.with(&f);
        Incr::derived(
            initial,
            cutoff,
            &[self.id()],
            Map {
                upstream: self.clone(),
                f,
            },
        )
    }

    /// Derive a cell from this cell and `other`.
    ///
    /// If both change in the same pass (for instance because they derive
    /// from the same input) the result recomputes and notifies once.
    pub fn zip2<B, U, F>(&self, other: &Incr<B>, f: F) -> Incr<U>
    where
        B: Clone + 'static,
        U: Clone + PartialEq + 'static,
        F: Fn(&T, &B) -> U + 'static,
    {
        self.zip2_with_cutoff(other, Cutoff::partial_eq(), f)
    }

    pub fn zip2_with_cutoff<B, U, F>(&self, other: &Incr<B>, cutoff: Cutoff<U>, f: F) -> Incr<U>
    where
        B: Clone + 'static,
        U: Clone + 'static,
        F: Fn(&T, &B) -> U + 'static,
    {
        let initial = self.with(|a| other.with(|b| f(a, b)));
        Incr::derived(
            initial,
            cutoff,
            &[self.id(), other.id()],
            Zip2 {
                a: self.clone(),
                b: other.clone(),
                f,
            },
        )
    }

    /// Derive a cell that follows whichever cell `f` selects for the
    /// current value.
    ///
    /// When this cell changes, `f` runs again; if it returns a different
    /// cell, the previous one is unsubscribed (and released if nothing else
    /// holds it) and the derived cell takes the new cell's current value.
    ///
    /// # Panics
    ///
    /// `f` must not return a cell that depends on the derived cell itself.
    /// The rebind that would close the cycle panics.
    pub fn flat_map<U, F>(&self, f: F) -> Incr<U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&T) -> Incr<U> + 'static,
    {
        self.flat_map_with_cutoff(Cutoff::partial_eq(), f)
    }

    pub fn flat_map_with_cutoff<U, F>(&self, cutoff: Cutoff<U>, f: F) -> Incr<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> Incr<U> + 'static,
    {
        let inner = self.with(&f);
        let initial = inner.value();
        Incr::derived(
            initial,
            cutoff,
            &[self.id(), inner.id()],
            FlatMap {
                outer: self.clone(),
                outer_seen: self.changed_at(),
                f,
                inner,
            },
        )
    }
}

/// Free-function form of [`Incr::zip2`].
pub fn zip2<A, B, U, F>(a: &Incr<A>, b: &Incr<B>, f: F) -> Incr<U>
where
    A: Clone + 'static,
    B: Clone + 'static,
    U: Clone + PartialEq + 'static,
    F: Fn(&A, &B) -> U + 'static,
{
    a.zip2(b, f)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
