//! Disposal Scopes
//!
//! A disposal scope owns cleanup callbacks and child scopes. Scopes form a
//! tree that mirrors how components and effects nest: anything created while
//! a scope is active (effects, computeds, nested scopes) is torn down when
//! that scope disposes.
//!
//! # Disposal order
//!
//! Disposing a scope:
//!
//! 1. disposes its child scopes, in the order they were created;
//! 2. runs its own cleanups in reverse registration order (LIFO);
//! 3. detaches from its parent.
//!
//! Disposal is idempotent. A second call does nothing.
//!
//! # The scope stack
//!
//! The active scope is the top of a thread-local stack. [`DisposalScope::run`]
//! pushes and pops around a callback; [`DisposalScope::push`] and
//! [`DisposalScope::pop`] are the raw primitives for callers that manage the
//! stack themselves.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::context_scope::ContextScope;
use crate::error::ReactiveError;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<DisposalScope>> = const { RefCell::new(Vec::new()) };
}

/// Unique identifier for a disposal scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

type Cleanup = Box<dyn FnOnce()>;

/// Handle to a registered cleanup, used to withdraw it before the scope
/// disposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CleanupKey(u64);

struct ScopeInner {
    id: ScopeId,
    parent: Weak<RefCell<ScopeInner>>,
    children: Vec<DisposalScope>,
    /// Insertion-ordered; disposal walks it in reverse.
    cleanups: IndexMap<CleanupKey, Cleanup>,
    next_cleanup: u64,
    context: ContextScope,
    disposed: bool,
}

/// A node in the ownership tree. Cloning yields another handle to the same
/// scope.
#[derive(Clone)]
pub struct DisposalScope {
    inner: Rc<RefCell<ScopeInner>>,
}

/// Non-owning handle to a scope.
#[derive(Clone, Default)]
pub(crate) struct WeakScope(Weak<RefCell<ScopeInner>>);

impl WeakScope {
    pub(crate) fn upgrade(&self) -> Option<DisposalScope> {
        self.0.upgrade().map(|inner| DisposalScope { inner })
    }
}

impl DisposalScope {
    fn with_parent(parent: Option<&DisposalScope>) -> Self {
        Self::with_parent_weak(
            parent.map_or_else(Weak::new, |p| Rc::downgrade(&p.inner)),
            ContextScope::current(),
        )
    }

    fn with_parent_weak(parent: Weak<RefCell<ScopeInner>>, context: ContextScope) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ScopeInner {
                id: ScopeId::new(),
                parent,
                children: Vec::new(),
                cleanups: IndexMap::new(),
                next_cleanup: 0,
                context,
                disposed: false,
            })),
        }
    }

    /// Create a scope owned by the active scope, or a root if none is active.
    pub fn new() -> Self {
        match Self::current() {
            Some(parent) => Self::child_of(&parent),
            None => Self::root(),
        }
    }

    /// Create a scope with no parent.
    pub fn root() -> Self {
        Self::with_parent(None)
    }

    /// Create a scope owned by `parent`.
    ///
    /// A child of an already disposed parent is disposed immediately.
    pub fn child_of(parent: &DisposalScope) -> Self {
        let child = Self::with_parent(Some(parent));
        let attached = {
            let mut inner = parent.inner.borrow_mut();
            if inner.disposed {
                false
            } else {
                inner.children.push(child.clone());
                true
            }
        };
        if !attached {
            warn!(parent = ?parent.id(), "child scope created under a disposed scope");
            child.dispose();
        }
        child
    }

    /// A scope that records `parent` for lineage but is not disposed by it.
    ///
    /// Effects use this for their per-run scope, which they dispose
    /// themselves. The scope resumes into `context`, not the ambient one.
    pub(crate) fn detached(parent: &WeakScope, context: ContextScope) -> Self {
        Self::with_parent_weak(parent.0.clone(), context)
    }

    pub(crate) fn downgrade(&self) -> WeakScope {
        WeakScope(Rc::downgrade(&self.inner))
    }

    /// The active scope, if any.
    pub fn current() -> Option<Self> {
        SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Push `scope` onto the scope stack.
    pub fn push(scope: &DisposalScope) {
        SCOPE_STACK.with(|stack| stack.borrow_mut().push(scope.clone()));
    }

    /// Pop the top of the scope stack.
    pub fn pop() -> Option<DisposalScope> {
        SCOPE_STACK
            .try_with(|stack| stack.borrow_mut().pop())
            .ok()
            .flatten()
    }

    /// Run `f` with this scope active.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        Self::push(self);
        let _guard = PopGuard;
        f()
    }

    /// Run `f` with this scope active and its captured context entered.
    ///
    /// Deferred continuations use this to come back into the scope they
    /// were started from.
    pub fn resume<R>(&self, f: impl FnOnce() -> R) -> R {
        let context = self.context();
        context.enter(|| self.run(f))
    }

    /// Register a cleanup on this scope.
    ///
    /// On a disposed scope the cleanup runs immediately.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) {
        self.register_cleanup(cleanup);
    }

    /// Register a cleanup and return a key for [`DisposalScope::remove_cleanup`].
    ///
    /// Returns `None` when the scope was already disposed and the cleanup
    /// has run.
    pub(crate) fn register_cleanup(&self, cleanup: impl FnOnce() + 'static) -> Option<CleanupKey> {
        let rejected = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                Some(cleanup)
            } else {
                let key = CleanupKey(inner.next_cleanup);
                inner.next_cleanup += 1;
                inner.cleanups.insert(key, Box::new(cleanup));
                return Some(key);
            }
        };
        if let Some(cleanup) = rejected {
            warn!(scope = ?self.id(), "cleanup registered on a disposed scope; running it now");
            cleanup();
        }
        None
    }

    /// Withdraw a cleanup without running it.
    pub(crate) fn remove_cleanup(&self, key: CleanupKey) {
        // Dropped after the borrow ends; the closure may own the last handle
        // to something that touches this scope when dropped.
        let removed = self.inner.borrow_mut().cleanups.shift_remove(&key);
        drop(removed);
    }

    /// Dispose this scope and everything it owns.
    pub fn dispose(&self) {
        let (children, cleanups, parent) = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            (
                std::mem::take(&mut inner.children),
                std::mem::take(&mut inner.cleanups),
                inner.parent.clone(),
            )
        };

        debug!(
            scope = ?self.id(),
            children = children.len(),
            cleanups = cleanups.len(),
            "disposing scope"
        );

        // Keep tearing down after a panicking cleanup, then re-raise the first.
        let mut first_panic = None;
        for child in children {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| child.dispose())) {
                first_panic.get_or_insert(payload);
            }
        }
        for (_, cleanup) in cleanups.into_iter().rev() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
                first_panic.get_or_insert(payload);
            }
        }

        if let Some(parent) = parent.upgrade() {
            parent
                .borrow_mut()
                .children
                .retain(|child| !Rc::ptr_eq(&child.inner, &self.inner));
        }

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }

    /// Whether this scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// The scope's identity.
    pub fn id(&self) -> ScopeId {
        self.inner.borrow().id
    }

    /// The owning scope, if it is still alive.
    pub fn parent(&self) -> Option<DisposalScope> {
        WeakScope(self.inner.borrow().parent.clone()).upgrade()
    }

    /// The context snapshot captured when the scope was created.
    pub fn context(&self) -> ContextScope {
        self.inner.borrow().context.clone()
    }

    /// Number of live child scopes.
    pub fn child_count(&self) -> usize {
        self.inner.borrow().children.len()
    }

    /// Number of cleanups waiting to run.
    pub fn cleanup_count(&self) -> usize {
        self.inner.borrow().cleanups.len()
    }

    /// Whether both handles refer to the same scope.
    pub fn ptr_eq(&self, other: &DisposalScope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for DisposalScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DisposalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("DisposalScope")
            .field("id", &inner.id)
            .field("children", &inner.children.len())
            .field("cleanups", &inner.cleanups.len())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

struct PopGuard;

impl Drop for PopGuard {
    fn drop(&mut self) {
        DisposalScope::pop();
    }
}

/// Register a cleanup on the active scope.
///
/// Returns [`ReactiveError::NoActiveScope`] when no scope is active; a
/// cleanup with no owner would otherwise never run.
pub fn on_cleanup(cleanup: impl FnOnce() + 'static) -> Result<(), ReactiveError> {
    let scope = DisposalScope::current().ok_or(ReactiveError::NoActiveScope)?;
    scope.on_cleanup(cleanup);
    Ok(())
}
