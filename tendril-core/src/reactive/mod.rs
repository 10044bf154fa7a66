//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds and
//! effects, plus the scopes that own and parameterize them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changed and someone reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects synchronize reactive state with external
//! systems, such as a rendered tree or a log.
//!
//! ## Batches
//!
//! Writes are grouped into batches. Effects run once per batch, after every
//! write in it, so they never observe half-applied state.
//!
//! ## Scopes
//!
//! [`DisposalScope`] owns cleanups and everything created while it is
//! active. [`ContextScope`] carries provided [`Context`] values, including
//! across `await` points via [`ContextFutureExt`].
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, record the dependency.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod batch;
mod boundary;
mod bridge;
mod computed;
mod context;
mod context_scope;
mod effect;
mod maybe;
mod registry;
mod runtime;
mod scope;
mod signal;
pub(crate) mod subscriber;

pub use batch::batch;
pub use boundary::{
    current_error_handler, pop_error_handler, push_error_handler, with_error_handler, ErrorHandler,
};
pub use bridge::MutationBridge;
pub use computed::{Computed, ComputedState};
pub use context::{untrack, ReactiveContext};
pub use context_scope::{Context, ContextFutureExt, ContextId, ContextScope, WithContext};
pub use effect::Effect;
pub use maybe::MaybeSignal;
pub use registry::{LocalRegistry, Registry};
pub use runtime::{Runtime, RuntimeStats};
pub use scope::{on_cleanup, DisposalScope, ScopeId};
pub use signal::{Equality, Signal};
pub use subscriber::SubscriberId;
