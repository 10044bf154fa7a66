//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it. It is the only primitive that can
//! be written.
//!
//! # How Signals Work
//!
//! 1. When a signal is read with [`Signal::get`] or [`Signal::with`] inside
//!    a running computed or effect, the signal is recorded as one of its
//!    sources.
//!
//! 2. When a signal's value changes, every dependent effect is queued on the
//!    current batch and every dependent computed is marked dirty.
//!
//! 3. [`Signal::peek`] reads without being recorded.
//!
//! # Equality
//!
//! `set` skips notification when the new value equals the old one under the
//! signal's equality policy. [`Signal::new`] uses `PartialEq`;
//! [`Signal::with_equality`] takes any comparison (e.g. `Rc::ptr_eq` for
//! identity) and [`Signal::always_notify`] disables the check. In-place
//! mutation through [`Signal::peek_mut`] followed by [`Signal::notify`]
//! never compares.
//!
//! # Memory Layout
//!
//! Each signal handle is a single `Rc` to:
//! - its node id in the thread's dependency graph
//! - the value, in a `RefCell`
//! - the equality policy (a plain function pointer)

use std::cell::{Ref, RefCell, RefMut};
use std::fmt::Debug;
use std::rc::Rc;

use super::batch::batch;
use super::runtime::Runtime;
use super::scope::{DisposalScope, ScopeId};
use crate::graph::{Node, NodeId};

/// Comparison deciding whether a write is a change.
pub type Equality<T> = fn(&T, &T) -> bool;

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use tendril_core::reactive::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// assert_eq!(count.peek(), 5);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T> {
    /// Node in the dependency graph.
    node: NodeId,

    value: RefCell<T>,

    /// `None` means every write notifies.
    equals: Option<Equality<T>>,

    /// Scope that was active at creation. Diagnostic only; signals hold no
    /// resources that need disposal.
    owner: Option<ScopeId>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::remove(self.node);
    }
}

impl<T: 'static> Signal<T> {
    /// Create a new signal that skips writes equal to the current value.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::from_parts(value, Some(<T as PartialEq>::eq))
    }

    /// Create a new signal with a custom equality policy.
    pub fn with_equality(value: T, equals: Equality<T>) -> Self {
        Self::from_parts(value, Some(equals))
    }

    /// Create a new signal whose every write notifies.
    pub fn always_notify(value: T) -> Self {
        Self::from_parts(value, None)
    }

    fn from_parts(value: T, equals: Option<Equality<T>>) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                node: Runtime::insert(Node::source()),
                value: RefCell::new(value),
                equals,
                owner: DisposalScope::current().map(|scope| scope.id()),
            }),
        }
    }

    /// Get the signal's node in the dependency graph.
    pub fn node_id(&self) -> NodeId {
        self.inner.node
    }

    /// The scope that was active when the signal was created.
    pub fn owner(&self) -> Option<ScopeId> {
        self.inner.owner
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also records the signal as
    /// a dependency of the running computation.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, recording a dependency like [`Signal::get`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track(self.inner.node);
        f(&self.inner.value.borrow())
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without tracking dependencies.
    pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Borrow the value immutably without tracking.
    pub fn peek_ref(&self) -> Ref<'_, T> {
        self.inner.value.borrow()
    }

    /// Borrow the value mutably for in-place mutation.
    ///
    /// Nobody is notified. Drop the guard, then call [`Signal::notify`];
    /// reading the signal while the guard is alive panics.
    pub fn peek_mut(&self) -> RefMut<'_, T> {
        self.inner.value.borrow_mut()
    }

    /// Set a new value and notify subscribers if it differs.
    pub fn set(&self, value: T) {
        batch(|| {
            let changed = {
                let mut current = self.inner.value.borrow_mut();
                match self.inner.equals {
                    Some(equals) if equals(&current, &value) => false,
                    _ => {
                        *current = value;
                        true
                    }
                }
            };
            if changed {
                Runtime::notify(self.inner.node);
            }
        });
    }

    /// Update the value using a function of the current one.
    ///
    /// Goes through [`Signal::set`], so the equality policy applies.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.borrow();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Notify every subscriber without changing the value.
    pub fn notify(&self) {
        batch(|| Runtime::notify(self.inner.node));
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with_graph(|graph| {
            graph
                .get(self.inner.node)
                .map_or(0, |node| node.subscribers().len())
        })
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("node", &self.inner.node)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Runtime};
    use std::cell::Cell;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.node_id(), s2.node_id());
        assert_ne!(s2.node_id(), s3.node_id());
        assert_ne!(s1.node_id(), s3.node_id());
    }

    #[test]
    fn peek_round_trips_set() {
        let signal = Signal::new(String::from("a"));
        signal.set("b".into());
        assert_eq!(signal.peek(), "b");

        signal.notify();
        assert_eq!(signal.peek(), "b");
    }

    #[test]
    fn equal_writes_are_skipped() {
        let signal = Signal::new(1);
        let runs = Rc::new(Cell::new(0));
        let _effect = Effect::new({
            let (signal, runs) = (signal.clone(), runs.clone());
            move || {
                signal.get();
                runs.set(runs.get() + 1);
            }
        });

        signal.set(1);
        assert_eq!(runs.get(), 1);
        signal.set(2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn always_notify_ignores_equality() {
        let signal = Signal::always_notify(1);
        let runs = Rc::new(Cell::new(0));
        let _effect = Effect::new({
            let (signal, runs) = (signal.clone(), runs.clone());
            move || {
                signal.get();
                runs.set(runs.get() + 1);
            }
        });

        signal.set(1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn identity_equality_policy() {
        let shared = Rc::new(vec![1, 2]);
        let signal = Signal::with_equality(shared.clone(), Rc::ptr_eq);
        let runs = Rc::new(Cell::new(0));
        let _effect = Effect::new({
            let (signal, runs) = (signal.clone(), runs.clone());
            move || {
                signal.with(|_| ());
                runs.set(runs.get() + 1);
            }
        });

        // Same allocation: skipped
        signal.set(shared);
        assert_eq!(runs.get(), 1);
        // Equal contents, new allocation: notifies
        signal.set(Rc::new(vec![1, 2]));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn peek_does_not_subscribe() {
        let signal = Signal::new(0);
        let _effect = Effect::new({
            let signal = signal.clone();
            move || {
                signal.peek();
            }
        });
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn dropping_last_handle_removes_node() {
        let before = Runtime::stats().signals;
        let signal = Signal::new(0);
        let clone = signal.clone();
        assert_eq!(Runtime::stats().signals, before + 1);

        drop(signal);
        assert_eq!(Runtime::stats().signals, before + 1);
        drop(clone);
        assert_eq!(Runtime::stats().signals, before);
    }
}
