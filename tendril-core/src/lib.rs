//! Tendril Core
//!
//! This crate provides a fine-grained reactive runtime. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Batched, glitch-free effect scheduling
//! - Hierarchical disposal scopes for cleanup
//! - Context values that survive synchronous and asynchronous boundaries
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives, scheduling and scopes
//! - `graph`: The dependency graph the primitives are wired into
//! - `config`: Runtime tuning knobs
//! - `error`: Error types
//!
//! Every thread runs its own independent runtime. Reactive handles are
//! `!Send`.
//!
//! # Example
//!
//! ```rust
//! use tendril_core::reactive::{Computed, Effect, Signal};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _effect = Effect::new({
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     move || log.borrow_mut().push((count.get(), doubled.get()))
//! });
//!
//! // Update the signal
//! count.set(5);
//! assert_eq!(*log.borrow(), vec![(0, 0), (5, 10)]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{EffectError, ReactiveError};
pub use reactive::{batch, untrack, Computed, Context, DisposalScope, Effect, Signal};
