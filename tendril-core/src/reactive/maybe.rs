//! Values that may or may not be reactive.
//!
//! Component-style APIs often accept either a plain value or something to
//! track. [`MaybeSignal`] keeps that choice in the type instead of checking
//! at runtime what was passed.

use std::fmt;

use super::computed::Computed;
use super::signal::Signal;

/// A plain value, a signal, or a computed.
pub enum MaybeSignal<T> {
    /// A value that never changes.
    Static(T),
    /// A writable signal.
    Signal(Signal<T>),
    /// A derived value.
    Computed(Computed<T>),
}

impl<T: Clone + 'static> MaybeSignal<T> {
    /// Read the value, tracking it if it is reactive.
    pub fn get(&self) -> T {
        match self {
            Self::Static(value) => value.clone(),
            Self::Signal(signal) => signal.get(),
            Self::Computed(computed) => computed.get(),
        }
    }

    /// Read the value without tracking.
    pub fn peek(&self) -> T {
        match self {
            Self::Static(value) => value.clone(),
            Self::Signal(signal) => signal.peek(),
            Self::Computed(computed) => computed.peek(),
        }
    }
}

impl<T: 'static> MaybeSignal<T> {
    /// Borrow the value, tracking it if it is reactive.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self {
            Self::Static(value) => f(value),
            Self::Signal(signal) => signal.with(f),
            Self::Computed(computed) => computed.with(f),
        }
    }

    /// Whether reads can ever observe a different value.
    pub fn is_reactive(&self) -> bool {
        !matches!(self, Self::Static(_))
    }
}

impl<T> From<T> for MaybeSignal<T> {
    fn from(value: T) -> Self {
        Self::Static(value)
    }
}

impl<T> From<Signal<T>> for MaybeSignal<T> {
    fn from(signal: Signal<T>) -> Self {
        Self::Signal(signal)
    }
}

impl<T> From<Computed<T>> for MaybeSignal<T> {
    fn from(computed: Computed<T>) -> Self {
        Self::Computed(computed)
    }
}

impl<T: Default> Default for MaybeSignal<T> {
    fn default() -> Self {
        Self::Static(T::default())
    }
}

impl<T: Clone> Clone for MaybeSignal<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(value) => Self::Static(value.clone()),
            Self::Signal(signal) => Self::Signal(signal.clone()),
            Self::Computed(computed) => Self::Computed(computed.clone()),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for MaybeSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Signal(signal) => f.debug_tuple("Signal").field(signal).finish(),
            Self::Computed(computed) => f.debug_tuple("Computed").field(computed).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn label(text: impl Into<MaybeSignal<String>>) -> MaybeSignal<String> {
        text.into()
    }

    #[test]
    fn static_values_are_not_reactive() {
        let plain = label("fixed".to_string());
        assert!(!plain.is_reactive());
        assert_eq!(plain.get(), "fixed");
    }

    #[test]
    fn signal_values_are_tracked() {
        let text = Signal::new("a".to_string());
        let shown = label(text.clone());
        assert!(shown.is_reactive());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let _effect = Effect::new({
            let (shown, seen) = (shown.clone(), seen.clone());
            move || seen.borrow_mut().push(shown.get())
        });

        text.set("b".into());
        assert_eq!(*seen.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn computed_values_read_through() {
        let n = Signal::new(2);
        let squared: MaybeSignal<i32> = Computed::new({
            let n = n.clone();
            move || n.get() * n.get()
        })
        .into();

        assert_eq!(squared.peek(), 4);
        n.set(3);
        assert_eq!(squared.with(|v| *v), 9);
    }

    #[test]
    fn debug_names_the_variant() {
        assert_eq!(format!("{:?}", MaybeSignal::from(3)), "Static(3)");
        let shown = format!("{:?}", MaybeSignal::<i32>::from(Signal::new(3)));
        assert!(shown.starts_with("Signal("));
    }
}
