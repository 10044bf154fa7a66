//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! sources change.
//!
//! # How Computeds Work
//!
//! 1. Creating a computed does not run the derivation. The first read does.
//!
//! 2. While clean, reads return the cached value.
//!
//! 3. When a source changes, the graph marks the computed dirty. Nothing is
//!    recomputed at that point.
//!
//! 4. The next read re-runs the derivation inside a fresh tracking context
//!    and replaces the computed's source set with the sources it read this
//!    time, so branches not taken no longer subscribe.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes ten times inside a batch
//! - 10 computeds depend on it
//! - Only the computeds actually read afterwards recompute, once each
//!
//! # Failures
//!
//! A derivation that panics leaves the computed dirty and lets the panic
//! reach the reader; the next read retries. [`Computed::try_get`] turns the
//! panic into a [`ReactiveError`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::context::{untrack, ReactiveContext};
use super::runtime::Runtime;
use super::scope::{CleanupKey, DisposalScope, WeakScope};
use crate::error::{PanicPayload, ReactiveError};
use crate::graph::{Node, NodeId};

/// Where a computed stands relative to its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// Never read yet.
    Uninitialized,

    /// A source changed since the last computation.
    Dirty,

    /// The cached value is up to date.
    Clean,

    /// Unsubscribed from everything; reads derive afresh each time.
    Disposed,
}

/// A cached derived value that recomputes only when its sources change.
///
/// # Example
///
/// ```rust
/// use tendril_core::reactive::{Computed, Signal};
///
/// let width = Signal::new(3);
/// let height = Signal::new(4);
/// let area = Computed::new({
///     let (width, height) = (width.clone(), height.clone());
///     move || width.get() * height.get()
/// });
///
/// assert_eq!(area.get(), 12);
/// width.set(5);
/// assert_eq!(area.get(), 20);
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    /// `None` once disposed.
    node: Cell<Option<NodeId>>,

    derive: Box<dyn Fn() -> T>,

    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,

    computing: Cell<bool>,

    owner: WeakScope,

    /// The owner's cleanup for this computed, withdrawn on dispose.
    registration: Cell<Option<CleanupKey>>,
}

impl<T> ComputedInner<T> {
    fn dispose(&self) {
        if let Some(node) = self.node.take() {
            debug!(?node, "computed disposed");
            Runtime::remove(node);
        }
        if let (Some(key), Some(owner)) = (self.registration.take(), self.owner.upgrade()) {
            owner.remove_cleanup(key);
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: 'static> Computed<T> {
    /// Create a new computed with the given derivation.
    ///
    /// The derivation is not run immediately. It runs on first read. If a
    /// disposal scope is active, disposing it disposes the computed.
    pub fn new<F>(derive: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let owner = DisposalScope::current();
        let inner = Rc::new(ComputedInner {
            node: Cell::new(Some(Runtime::insert(Node::derived()))),
            derive: Box::new(derive),
            value: RefCell::new(None),
            computing: Cell::new(false),
            owner: owner
                .as_ref()
                .map_or_else(WeakScope::default, DisposalScope::downgrade),
            registration: Cell::new(None),
        });

        if let Some(owner) = &owner {
            let weak: Weak<ComputedInner<T>> = Rc::downgrade(&inner);
            let key = owner.register_cleanup(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.dispose();
                }
            });
            inner.registration.set(key);
        }

        Self { inner }
    }

    /// The computed's node, or `None` once disposed.
    pub fn node_id(&self) -> Option<NodeId> {
        self.inner.node.get()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Inside a reactive context this also records the computed as a
    /// dependency of the running computation.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, recording a dependency like
    /// [`Computed::get`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.read(true, f)
    }

    /// Get the current value without recording a dependency.
    ///
    /// The value is still brought up to date first.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.read(false, T::clone)
    }

    /// Like [`Computed::get`], but a panicking derivation becomes an error.
    ///
    /// Returns [`ReactiveError::Cycle`] when the computed depends on itself.
    pub fn try_get(&self) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        panic::catch_unwind(AssertUnwindSafe(|| self.get())).map_err(|payload| {
            match payload.downcast::<ReactiveError>() {
                Ok(err) => *err,
                Err(payload) => {
                    ReactiveError::DerivationPanicked(PanicPayload::from(payload).message())
                }
            }
        })
    }

    /// Where the computed stands right now. Does not compute.
    pub fn state(&self) -> ComputedState {
        let Some(node) = self.inner.node.get() else {
            return ComputedState::Disposed;
        };
        if self.inner.value.borrow().is_none() {
            return ComputedState::Uninitialized;
        }
        if Runtime::with_graph(|graph| graph.is_dirty(node)) {
            ComputedState::Dirty
        } else {
            ComputedState::Clean
        }
    }

    /// Unsubscribe from every source and drop the cached value.
    ///
    /// Idempotent. Reads afterwards still work but derive untracked on each
    /// call and cache nothing.
    pub fn dispose(&self) {
        self.inner.dispose();
        self.inner.value.borrow_mut().take();
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.node.get().map_or(0, |node| {
            Runtime::with_graph(|graph| graph.get(node).map_or(0, |n| n.subscribers().len()))
        })
    }

    fn read<R>(&self, tracked: bool, f: impl FnOnce(&T) -> R) -> R {
        let Some(node) = self.inner.node.get() else {
            let value = untrack(|| (self.inner.derive)());
            return f(&value);
        };

        if tracked {
            Runtime::track(node);
        }
        self.refresh(node);

        let value = self.inner.value.borrow();
        match value.as_ref() {
            Some(value) => f(value),
            // refresh either fills the cache or unwinds
            None => unreachable!("computed read without a value"),
        }
    }

    fn refresh(&self, node: NodeId) {
        let stale = self.inner.value.borrow().is_none()
            || Runtime::with_graph(|graph| graph.is_dirty(node));
        if !stale {
            return;
        }
        if self.inner.computing.get() {
            panic::panic_any(ReactiveError::Cycle);
        }

        trace!(?node, "recomputing");
        let value = {
            let _computing = ComputingGuard::new(&self.inner.computing);
            let ctx = ReactiveContext::enter(node);
            let value = (self.inner.derive)();
            let sources = ctx.take_sources();
            Runtime::with_graph(|graph| {
                graph.replace_sources(node, &sources);
                graph.mark_clean(node);
            });
            value
        };

        *self.inner.value.borrow_mut() = Some(value);
    }
}

struct ComputingGuard<'a>(&'a Cell<bool>);

impl<'a> ComputingGuard<'a> {
    fn new(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for ComputingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("node", &self.inner.node.get())
            .field("state", &self.state())
            .finish()
    }
}
