//! Context Values
//!
//! A [`Context`] is a typed key with a default value. Providing a value makes
//! it visible to everything that runs inside the provided callback, including
//! effects created there, long after the callback itself returned.
//!
//! # Lookup
//!
//! Reads resolve through two paths, in order:
//!
//! 1. A synchronous per-key value stack, pushed and popped by
//!    [`Context::provide`]. This covers ordinary nested calls.
//! 2. The ambient [`ContextScope`] snapshot. Deferred continuations and
//!    effect re-runs re-enter a snapshot captured earlier, after the
//!    providing call has already returned.
//!
//! If neither has an entry, the context's default is returned.
//!
//! # Snapshots
//!
//! A [`ContextScope`] is immutable. Every provide builds a new, flattened
//! map holding the parent's entries plus the new one, so lookups are a
//! single hash probe regardless of nesting depth. Snapshots are shared by
//! reference and never copied when captured.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context as TaskContext, Poll};

use pin_project::pin_project;

/// Identity of a [`Context`] key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type ContextValue = Rc<dyn Any>;

thread_local! {
    static VALUE_STACKS: RefCell<HashMap<ContextId, Vec<ContextValue>>> = RefCell::new(HashMap::new());
    static AMBIENT: RefCell<ContextScope> = RefCell::new(ContextScope::default());
}

/// A typed context key with a declared default.
///
/// # Example
///
/// ```rust
/// use tendril_core::reactive::Context;
///
/// let theme = Context::new("light");
///
/// theme.provide("dark", || {
///     assert_eq!(theme.get(), "dark");
/// });
/// assert_eq!(theme.get(), "light");
/// ```
#[derive(Clone)]
pub struct Context<T> {
    id: ContextId,
    default: T,
}

impl<T> Context<T>
where
    T: Clone + 'static,
{
    /// Declare a new context key.
    pub fn new(default: T) -> Self {
        Self {
            id: ContextId::new(),
            default,
        }
    }

    /// The key's identity.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The declared default.
    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Run `f` with `value` provided for this key.
    ///
    /// Both the value stack and the ambient snapshot are restored when `f`
    /// returns or unwinds.
    pub fn provide<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        let value: ContextValue = Rc::new(value);

        VALUE_STACKS.with(|stacks| {
            stacks
                .borrow_mut()
                .entry(self.id)
                .or_default()
                .push(Rc::clone(&value));
        });
        let next = ContextScope::current().with_entry(self.id, value);
        let previous = ContextScope::set_current(next);

        let _guard = ProvideGuard {
            id: self.id,
            previous: Some(previous),
        };
        f()
    }

    /// Read the value visible at this point.
    pub fn get(&self) -> T {
        self.lookup().unwrap_or_else(|| self.default.clone())
    }

    /// Whether some provider is visible at this point.
    pub fn is_provided(&self) -> bool {
        self.lookup().is_some()
    }

    fn lookup(&self) -> Option<T> {
        let from_stack = VALUE_STACKS.with(|stacks| {
            stacks
                .borrow()
                .get(&self.id)
                .and_then(|stack| stack.last())
                .and_then(|value| value.downcast_ref::<T>().cloned())
        });

        from_stack.or_else(|| ContextScope::current().get(self))
    }
}

impl<T: fmt::Debug> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("default", &self.default)
            .finish()
    }
}

struct ProvideGuard {
    id: ContextId,
    previous: Option<ContextScope>,
}

impl Drop for ProvideGuard {
    fn drop(&mut self) {
        let _ = VALUE_STACKS.try_with(|stacks| {
            let mut stacks = stacks.borrow_mut();
            if let Some(stack) = stacks.get_mut(&self.id) {
                stack.pop();
                if stack.is_empty() {
                    stacks.remove(&self.id);
                }
            }
        });
        if let Some(previous) = self.previous.take() {
            let _ = AMBIENT.try_with(|ambient| *ambient.borrow_mut() = previous);
        }
    }
}

/// An immutable snapshot of provided context values.
#[derive(Clone, Default)]
pub struct ContextScope {
    values: Rc<HashMap<ContextId, ContextValue>>,
}

impl ContextScope {
    /// The ambient snapshot on this thread.
    pub fn current() -> Self {
        AMBIENT.with(|ambient| ambient.borrow().clone())
    }

    /// Swap the ambient snapshot, returning the previous one.
    ///
    /// This is the raw primitive; prefer [`ContextScope::enter`], which also
    /// restores the previous snapshot.
    pub fn set_current(scope: ContextScope) -> ContextScope {
        AMBIENT.with(|ambient| std::mem::replace(&mut *ambient.borrow_mut(), scope))
    }

    /// Run `f` with this snapshot as the ambient one.
    ///
    /// The caller's synchronous value stacks are hidden for the duration, so
    /// reads resolve against this snapshot rather than whatever provider the
    /// caller happens to be nested in.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        let stacks = VALUE_STACKS.with(|stacks| std::mem::take(&mut *stacks.borrow_mut()));
        let previous = Self::set_current(self.clone());

        let _guard = EnterGuard {
            stacks: Some(stacks),
            previous: Some(previous),
        };
        f()
    }

    /// Wrap a future so every poll runs inside this snapshot.
    pub fn scope<F: Future>(self, future: F) -> WithContext<F> {
        WithContext {
            scope: self,
            inner: future,
        }
    }

    /// Look up `context` in this snapshot only.
    pub fn get<T: Clone + 'static>(&self, context: &Context<T>) -> Option<T> {
        self.values
            .get(&context.id)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Whether the snapshot has an entry for `id`.
    pub fn contains(&self, id: ContextId) -> bool {
        self.values.contains_key(&id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether both handles share the same snapshot.
    pub fn ptr_eq(&self, other: &ContextScope) -> bool {
        Rc::ptr_eq(&self.values, &other.values)
    }

    fn with_entry(&self, id: ContextId, value: ContextValue) -> Self {
        let mut values = (*self.values).clone();
        values.insert(id, value);
        Self {
            values: Rc::new(values),
        }
    }
}

impl fmt::Debug for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextScope")
            .field("entries", &self.values.len())
            .finish()
    }
}

struct EnterGuard {
    stacks: Option<HashMap<ContextId, Vec<ContextValue>>>,
    previous: Option<ContextScope>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        if let Some(stacks) = self.stacks.take() {
            let _ = VALUE_STACKS.try_with(|current| *current.borrow_mut() = stacks);
        }
        if let Some(previous) = self.previous.take() {
            let _ = AMBIENT.try_with(|ambient| *ambient.borrow_mut() = previous);
        }
    }
}

/// A future that re-enters a captured [`ContextScope`] on every poll.
#[pin_project]
#[must_use = "futures do nothing unless polled"]
pub struct WithContext<F> {
    scope: ContextScope,
    #[pin]
    inner: F,
}

impl<F: Future> Future for WithContext<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let inner = this.inner;
        this.scope.enter(move || inner.poll(cx))
    }
}

/// Attach context snapshots to futures.
pub trait ContextFutureExt: Future + Sized {
    /// Run this future inside `scope`.
    fn with_context(self, scope: ContextScope) -> WithContext<Self> {
        scope.scope(self)
    }

    /// Run this future inside the snapshot that is ambient right now.
    fn in_current_context(self) -> WithContext<Self> {
        ContextScope::current().scope(self)
    }
}

impl<F: Future> ContextFutureExt for F {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn default_outside_provider() {
        let ctx = Context::new(1);
        assert_eq!(ctx.get(), 1);
        assert!(!ctx.is_provided());
    }

    #[test]
    fn nested_provides_shadow_and_restore() {
        let ctx = Context::new("default");

        ctx.provide("outer", || {
            assert_eq!(ctx.get(), "outer");
            ctx.provide("inner", || assert_eq!(ctx.get(), "inner"));
            assert_eq!(ctx.get(), "outer");
        });
        assert_eq!(ctx.get(), "default");
    }

    #[test]
    fn provide_restores_after_panic() {
        let ctx = Context::new(0);

        let result = catch_unwind(AssertUnwindSafe(|| {
            ctx.provide(5, || panic!("inside provider"));
        }));
        assert!(result.is_err());
        assert_eq!(ctx.get(), 0);
        assert!(ContextScope::current().is_empty());
    }

    #[test]
    fn snapshots_are_flattened_supersets() {
        let a = Context::new(0);
        let b = Context::new(0);

        let (outer, inner) = a.provide(1, || {
            let outer = ContextScope::current();
            let inner = b.provide(2, ContextScope::current);
            (outer, inner)
        });

        assert_eq!(outer.len(), 1);
        assert_eq!(inner.len(), 2);
        assert_eq!(inner.get(&a), Some(1));
        assert_eq!(inner.get(&b), Some(2));
        // The parent snapshot is untouched
        assert_eq!(outer.get(&b), None);
    }

    #[test]
    fn entered_snapshot_outlives_provider() {
        let ctx = Context::new("light");
        let captured = ctx.provide("dark", ContextScope::current);

        assert_eq!(ctx.get(), "light");
        captured.enter(|| assert_eq!(ctx.get(), "dark"));
        assert_eq!(ctx.get(), "light");
    }

    #[test]
    fn entered_snapshot_hides_caller_stack() {
        let ctx = Context::new("default");
        let empty = ContextScope::current();

        ctx.provide("caller", || {
            empty.enter(|| assert_eq!(ctx.get(), "default"));
            assert_eq!(ctx.get(), "caller");
        });
    }

    #[test]
    fn unrelated_keys_do_not_collide() {
        let a = Context::new(String::from("a"));
        let b = Context::new(String::from("b"));

        a.provide("provided".to_string(), || {
            assert_eq!(a.get(), "provided");
            assert_eq!(b.get(), "b");
        });
    }
}
