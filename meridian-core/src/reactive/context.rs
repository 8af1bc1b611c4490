//! Update Context
//!
//! The update context tracks whether writes may propagate immediately.
//! While a batch or a propagation pass is running, writes are queued and
//! applied once the outermost context exits.
//!
//! # Implementation
//!
//! We use a thread-local stack of context kinds. Entering a context pushes
//! onto the stack; the returned guard pops when dropped, so the stack stays
//! balanced even if a recomputation or an observer panics.

use std::cell::RefCell;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextKind>> = const { RefCell::new(Vec::new()) };
}

/// Why writes are currently being deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextKind {
    /// An explicit `Runtime::batch` or an observer registration.
    Batch,
    /// A propagation pass, including its observer notifications.
    Pass,
}

/// Guard that pops the context when dropped.
pub(crate) struct UpdateContext {
    kind: ContextKind,
}

impl UpdateContext {
    /// Enter a new context of the given kind.
    pub(crate) fn enter(kind: ContextKind) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(kind));
        Self { kind }
    }

    /// Check if any context is active, i.e. writes must be deferred.
    pub(crate) fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Check if a propagation pass is running somewhere up the stack.
    pub(crate) fn in_pass() -> bool {
        CONTEXT_STACK.with(|stack| stack.borrow().contains(&ContextKind::Pass))
    }
}

impl Drop for UpdateContext {
    fn drop(&mut self) {
        // The stack may already be gone during thread teardown.
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.kind),
                "UpdateContext mismatch: expected {:?}, got {:?}",
                self.kind,
                popped
            );
        });
    }
}
