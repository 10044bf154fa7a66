//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately, before the
//!    constructor returns, to establish initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued on the current batch
//!    and re-runs when the batch flushes.
//!
//! 3. Every run gets a fresh child [`DisposalScope`]. Before a re-run, the
//!    previous run's scope is disposed, so cleanups registered with
//!    [`on_cleanup`] inside the body run (LIFO) before the body runs again.
//!
//! 4. Every run re-enters the [`ContextScope`] that was ambient when the
//!    effect was created, so context reads inside the body see the creation
//!    site's values no matter who triggered the run.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager.
//! - Nothing can depend on an effect.
//!
//! # Ownership
//!
//! An effect created inside a disposal scope is owned by that scope and
//! lives until the scope or the effect is disposed, whether or not the
//! handle is kept. Without an active scope the handle is the owner and
//! dropping its last clone disposes the effect.
//!
//! # Failures
//!
//! A panicking body, or an `Err` from a [`Effect::try_new`] body, is passed
//! to the error handler that was current when the effect was created, else
//! the one current when it failed. Without any handler, the failure is
//! escalated once the outermost batch has settled.
//!
//! [`on_cleanup`]: super::scope::on_cleanup

use std::cell::{Cell, RefCell};
use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace, warn};

use super::batch::batch;
use super::boundary::{current_error_handler, ErrorHandler};
use super::context::ReactiveContext;
use super::context_scope::ContextScope;
use super::runtime::Runtime;
use super::scope::{CleanupKey, DisposalScope, WeakScope};
use super::subscriber::{Rerun, SubscriberId};
use crate::error::EffectError;
use crate::graph::{Node, NodeId};

type Body = Box<dyn FnMut() -> Result<(), EffectError>>;

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use tendril_core::reactive::{Effect, Signal};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = Signal::new(0);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let _effect = Effect::new({
///     let (count, log) = (count.clone(), log.clone());
///     move || log.borrow_mut().push(count.get())
/// });
///
/// count.set(5);
/// assert_eq!(*log.borrow(), vec![0, 5]);
/// ```
pub struct Effect {
    inner: Rc<EffectInner>,
}

struct EffectInner {
    /// Scheduling identity; also the deduplication key in the batch queue.
    id: SubscriberId,

    /// `None` once disposed.
    node: Cell<Option<NodeId>>,

    body: RefCell<Body>,

    /// Scope of the current run.
    child: RefCell<Option<DisposalScope>>,

    /// Scope that was active at creation, recorded as each run scope's parent.
    owner: WeakScope,

    /// The owner's cleanup that disposes this effect, withdrawn on dispose.
    registration: Cell<Option<CleanupKey>>,

    /// Context snapshot captured at creation.
    context: ContextScope,

    /// Error handler captured at creation.
    handler: Option<ErrorHandler>,

    running: Cell<bool>,

    run_count: Cell<usize>,
}

impl Effect {
    /// Create a new effect with the given body.
    ///
    /// The body runs immediately to establish dependencies.
    pub fn new<F>(mut body: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::from_body(Box::new(move || {
            body();
            Ok(())
        }))
    }

    /// Create an effect whose body can fail.
    ///
    /// An `Err` is handled exactly like a panic in [`Effect::new`]'s body.
    pub fn try_new<F, E>(mut body: F) -> Self
    where
        F: FnMut() -> Result<(), E> + 'static,
        E: StdError + 'static,
    {
        Self::from_body(Box::new(move || {
            body().map_err(|err| EffectError::Failed(Box::new(err)))
        }))
    }

    fn from_body(body: Body) -> Self {
        let owner = DisposalScope::current();
        let id = SubscriberId::new();

        let inner = Rc::new_cyclic(|weak: &Weak<EffectInner>| {
            let runner: Weak<dyn Rerun> = weak.clone();
            EffectInner {
                id,
                node: Cell::new(Some(Runtime::insert(Node::effect(id, runner)))),
                body: RefCell::new(body),
                child: RefCell::new(None),
                owner: owner
                    .as_ref()
                    .map_or_else(WeakScope::default, DisposalScope::downgrade),
                registration: Cell::new(None),
                context: ContextScope::current(),
                handler: current_error_handler(),
                running: Cell::new(false),
                run_count: Cell::new(0),
            }
        });

        if let Some(owner) = &owner {
            let owned = Rc::clone(&inner);
            let key = owner.register_cleanup(move || owned.dispose());
            inner.registration.set(key);
        }

        // Writes made by the first run flush before the constructor returns.
        batch(|| inner.run());

        Self { inner }
    }

    /// Get the effect's scheduling identity.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// The effect's node, or `None` once disposed.
    pub fn node_id(&self) -> Option<NodeId> {
        self.inner.node.get()
    }

    /// Dispose of the effect.
    ///
    /// Runs the current run's cleanups and unsubscribes from every source.
    /// After disposal, the effect will not run again.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.node.get().is_none()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of sources read by the latest run.
    pub fn dependency_count(&self) -> usize {
        self.inner.node.get().map_or(0, |node| {
            Runtime::with_graph(|graph| graph.get(node).map_or(0, |n| n.sources().len()))
        })
    }

    /// Replace the body of a live effect and run it once.
    ///
    /// The effect keeps its identity, owner and captured context; the
    /// previous run's cleanups run before the new body does.
    ///
    /// # Panics
    ///
    /// Panics if called from the effect's own body.
    pub fn hot_swap<F>(&self, mut body: F)
    where
        F: FnMut() + 'static,
    {
        if self.is_disposed() {
            warn!(subscriber = self.inner.id.raw(), "hot swap on a disposed effect ignored");
            return;
        }
        debug!(subscriber = self.inner.id.raw(), "effect body swapped");

        let previous = self.inner.body.replace(Box::new(move || {
            body();
            Ok(())
        }));
        drop(previous);

        batch(|| self.inner.run());
    }
}

impl EffectInner {
    fn run(&self) {
        let Some(node) = self.node.get() else {
            return;
        };
        if self.running.get() {
            warn!(subscriber = self.id.raw(), "effect triggered from its own run; skipped");
            return;
        }
        let _running = RunningGuard::new(&self.running);

        let previous = self.child.borrow_mut().take();
        if let Some(previous) = previous {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| previous.dispose())) {
                self.fail(EffectError::from_panic(payload));
            }
        }

        let scope = DisposalScope::detached(&self.owner, self.context.clone());
        *self.child.borrow_mut() = Some(scope.clone());

        let run = self.run_count.get() + 1;
        self.run_count.set(run);
        trace!(subscriber = self.id.raw(), run, "effect run");

        let (outcome, sources) = self.context.enter(|| {
            scope.run(|| {
                let ctx = ReactiveContext::enter(node);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut body = self.body.borrow_mut();
                    (*body)()
                }));
                (outcome, ctx.take_sources())
            })
        });

        // Sources read before a failure still count, so the effect can
        // recover when they change.
        Runtime::with_graph(|graph| graph.replace_sources(node, &sources));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.fail(err),
            Err(payload) => self.fail(EffectError::from_panic(payload)),
        }
    }

    fn fail(&self, err: EffectError) {
        match self.handler.clone().or_else(current_error_handler) {
            Some(handler) => {
                debug!(subscriber = self.id.raw(), error = %err, "effect failure handled");
                handler(err);
            }
            None => Runtime::report_unhandled(err),
        }
    }

    fn dispose(&self) {
        let Some(node) = self.node.take() else {
            return;
        };
        debug!(subscriber = self.id.raw(), "effect disposed");
        Runtime::remove(node);

        if let (Some(key), Some(owner)) = (self.registration.take(), self.owner.upgrade()) {
            owner.remove_cleanup(key);
        }

        let child = self.child.borrow_mut().take();
        if let Some(child) = child {
            child.dispose();
        }
    }
}

impl Rerun for EffectInner {
    fn rerun(&self) {
        self.run();
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.dispose())) {
            let err = EffectError::from_panic(payload);
            error!(subscriber = self.id.raw(), error = %err, "cleanup panicked while dropping effect");
        }
    }
}

struct RunningGuard<'a>(&'a Cell<bool>);

impl<'a> RunningGuard<'a> {
    fn new(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
