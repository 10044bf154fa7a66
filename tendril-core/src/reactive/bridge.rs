//! Mutation Bridge
//!
//! Container-valued signals are often mutated in place rather than
//! replaced. The bridge is the pair of operations that makes that safe:
//! borrow the value mutably without tracking, then notify subscribers the
//! same way a `set` would. No equality check happens on this path.

use std::cell::RefMut;

use super::signal::Signal;

/// In-place mutation followed by manual notification.
///
/// # Example
///
/// ```rust
/// use tendril_core::reactive::{MutationBridge, Signal};
///
/// let items = Signal::new(vec![1, 2]);
/// items.mutate(|items| items.push(3));
/// assert_eq!(items.peek(), vec![1, 2, 3]);
/// ```
pub trait MutationBridge {
    /// The stored value.
    type Value;

    /// Borrow the stored value mutably without tracking or notifying.
    fn peek_mut(&self) -> RefMut<'_, Self::Value>;

    /// Notify subscribers unconditionally.
    fn notify(&self);

    /// Borrow, mutate, release, then notify.
    fn mutate<R>(&self, f: impl FnOnce(&mut Self::Value) -> R) -> R {
        let result = {
            let mut value = self.peek_mut();
            f(&mut value)
        };
        self.notify();
        result
    }
}

impl<T: 'static> MutationBridge for Signal<T> {
    type Value = T;

    fn peek_mut(&self) -> RefMut<'_, T> {
        Signal::peek_mut(self)
    }

    fn notify(&self) {
        Signal::notify(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn mutate_notifies_once() {
        let items = Signal::new(Vec::<u32>::new());
        let lengths = Rc::new(RefCell::new(Vec::new()));
        let _effect = Effect::new({
            let (items, lengths) = (items.clone(), lengths.clone());
            move || {
                let len = items.with(Vec::len);
                lengths.borrow_mut().push(len);
            }
        });

        items.mutate(|items| items.extend([1, 2, 3]));
        assert_eq!(*lengths.borrow(), vec![0, 3]);
    }

    #[test]
    fn mutation_that_changes_nothing_still_notifies() {
        let value = Signal::new(5);
        let runs = Rc::new(RefCell::new(0));
        let _effect = Effect::new({
            let (value, runs) = (value.clone(), runs.clone());
            move || {
                value.get();
                *runs.borrow_mut() += 1;
            }
        });

        value.mutate(|_| {});
        assert_eq!(*runs.borrow(), 2);
    }

    #[test]
    fn raw_peek_mut_then_notify() {
        let map = Signal::new(std::collections::BTreeMap::new());
        {
            let mut guard = MutationBridge::peek_mut(&map);
            guard.insert("k", 1);
        }
        MutationBridge::notify(&map);
        assert_eq!(map.peek_with(|m| m.get("k").copied()), Some(1));
    }
}
