//! Batch Scheduler
//!
//! Writes never run effects directly. They queue effects on the runtime and
//! the outermost open batch flushes the queue when it closes. A write made
//! outside any batch opens and closes its own, so it still flushes before
//! returning.
//!
//! # Flush
//!
//! A flush runs in rounds. Each round takes the whole queue and runs every
//! effect in it once, in first-enqueued order. Effects queued while a round
//! is running go into the next round, except that a notification for an
//! effect that has not run yet in the current round is absorbed by that run.
//! The flush ends when a round queues nothing new.
//!
//! Because effects only run after all writes of the batch are in, and
//! computeds are recomputed on read, an effect never observes a partially
//! applied batch.
//!
//! # Failures
//!
//! Effect failures nobody handled are collected while flushing and
//! escalated after the flush completes and the runtime is consistent again.
//!
//! If the body of the outermost batch panics, the writes it made before the
//! panic are still flushed, then the panic continues.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, warn};

use super::runtime::Runtime;
use crate::config::RuntimeConfig;
use crate::error::ReactiveError;

/// Run `f` as one transaction, flushing queued effects when the outermost
/// batch closes.
///
/// Nested calls flatten into the outermost batch.
///
/// # Example
///
/// ```rust
/// use tendril_core::reactive::{batch, Effect, Signal};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let a = Signal::new(1);
/// let b = Signal::new(2);
/// let runs = Rc::new(Cell::new(0));
///
/// let _effect = Effect::new({
///     let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
///     move || {
///         let _ = a.get() + b.get();
///         runs.set(runs.get() + 1);
///     }
/// });
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
/// assert_eq!(runs.get(), 2);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let outermost = Runtime::with(|rt| {
        let depth = rt.batch_depth.get();
        rt.batch_depth.set(depth + 1);
        depth == 0
    });

    if !outermost {
        let _guard = BatchGuard;
        return f();
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _guard = BatchGuard;
        f()
    }));

    match result {
        Ok(value) => {
            settle();
            value
        }
        Err(payload) => {
            // The body's panic wins over anything the flush escalates.
            if panic::catch_unwind(settle).is_err() {
                warn!("flush after a panicking batch escalated; keeping the original panic");
            }
            panic::resume_unwind(payload)
        }
    }
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let _ = Runtime::try_with(|rt| rt.batch_depth.set(rt.batch_depth.get().saturating_sub(1)));
    }
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = Runtime::try_with(|rt| rt.flushing.set(false));
    }
}

/// Flush and escalate, unless a flush is already running further up.
fn settle() {
    let start = Runtime::with(|rt| {
        if rt.flushing.get() || rt.batch_depth.get() > 0 {
            false
        } else {
            rt.flushing.set(true);
            true
        }
    });
    if !start {
        return;
    }

    let outcome = {
        let _guard = FlushGuard;
        flush()
    };
    escalate(outcome);
}

fn flush() -> Result<(), ReactiveError> {
    let max_rounds = RuntimeConfig::current().max_flush_rounds;
    let mut rounds = 0;

    loop {
        let round = Runtime::with(|rt| std::mem::take(&mut *rt.pending.borrow_mut()));
        if round.is_empty() {
            return Ok(());
        }

        rounds += 1;
        if rounds > max_rounds {
            Runtime::with(|rt| rt.pending.borrow_mut().clear());
            return Err(ReactiveError::FlushLimitExceeded { rounds: max_rounds });
        }

        debug!(round = rounds, effects = round.len(), "flushing effects");

        for (id, node) in round {
            // This run will see whatever triggered a re-queue so far.
            Runtime::with(|rt| rt.pending.borrow_mut().shift_remove(&id));

            let runner = Runtime::with_graph(|graph| graph.runner(node));
            if let Some(runner) = runner {
                runner.rerun();
            }
        }
    }
}

fn escalate(outcome: Result<(), ReactiveError>) {
    let errors = Runtime::with(|rt| std::mem::take(&mut *rt.unhandled.borrow_mut()));
    if errors.is_empty() && outcome.is_ok() {
        return;
    }

    for err in &errors {
        error!(error = %err, "unhandled effect failure");
    }
    if let Err(err) = &outcome {
        error!(error = %err, "effect flush abandoned");
    }

    if !RuntimeConfig::current().escalate_unhandled {
        return;
    }
    if let Some(first) = errors.into_iter().next() {
        first.escalate();
    }
    if let Err(err) = outcome {
        panic!("{err}");
    }
}
