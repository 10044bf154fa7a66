//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal or computed is
//! read, it is recorded as a source of the running computation.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Running a computed or effect body
//! pushes a frame for its node; every tracked read records its own node in
//! the top frame. When the body finishes, the collected sources replace the
//! node's previous source set in the graph.
//!
//! An untracked frame (see [`untrack`]) has no observer. Reads under it are
//! not recorded anywhere, even if an observing frame sits further down.

use std::cell::RefCell;

use smallvec::SmallVec;
use tracing::trace;

use crate::graph::NodeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug)]
struct ContextEntry {
    /// The node whose body is running, or `None` for untracked sections.
    observer: Option<NodeId>,
    /// Sources read so far, deduplicated, in first-read order.
    sources: SmallVec<[NodeId; 4]>,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ReactiveContext {
    observer: Option<NodeId>,
}

impl ReactiveContext {
    /// Enter a tracking context for `observer`.
    pub fn enter(observer: NodeId) -> Self {
        Self::push(Some(observer))
    }

    /// Enter a context in which reads are not recorded.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(observer: Option<NodeId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                observer,
                sources: SmallVec::new(),
            });
        });

        Self { observer }
    }

    /// Check if reads are currently being recorded.
    pub fn is_active() -> bool {
        Self::current_observer().is_some()
    }

    /// Get the node currently being tracked, if any.
    pub fn current_observer() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.observer))
    }

    /// Record a read of `source` in the current context.
    pub fn track(source: NodeId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.observer.is_some() && !entry.sources.contains(&source) {
                    trace!(?source, observer = ?entry.observer, "tracked read");
                    entry.sources.push(source);
                }
            }
        });
    }

    /// Take the sources collected by this context so far.
    pub fn take_sources(&self) -> SmallVec<[NodeId; 4]> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.sources))
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // Thread-local may already be gone during thread teardown.
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.observer, self.observer,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.observer, entry.observer
                );
            }
        });
    }
}

/// Run `f` without recording any reads as dependencies.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
