//! End-to-end behaviour of the runtime: the canonical usage scenarios plus
//! property tests over arbitrary write sequences.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;
use tendril_core::reactive::{
    batch, on_cleanup, Computed, Context, ContextFutureExt, DisposalScope, Effect, MutationBridge,
    Signal,
};

fn recorder<T: 'static>() -> Rc<RefCell<Vec<T>>> {
    Rc::new(RefCell::new(Vec::new()))
}

/// A logging effect sees every write, once each.
#[test]
fn scenario_a_effect_logs_each_write() {
    let s = Signal::new(1);
    let log = recorder();
    let _effect = Effect::new({
        let (s, log) = (s.clone(), log.clone());
        move || log.borrow_mut().push(s.get())
    });

    s.set(2);
    assert_eq!(*log.borrow(), vec![1, 2]);
}

/// Two writes in one batch derive a computed once.
#[test]
fn scenario_b_batched_sum_derives_once() {
    let a = Signal::new(1);
    let b = Signal::new(2);
    let derivations = Rc::new(Cell::new(0));
    let sum = Computed::new({
        let (a, b, derivations) = (a.clone(), b.clone(), derivations.clone());
        move || {
            derivations.set(derivations.get() + 1);
            a.get() + b.get()
        }
    });

    batch(|| {
        a.set(10);
        b.set(20);
    });
    assert_eq!(sum.get(), 30);
    assert_eq!(derivations.get(), 1);
}

/// Disposing an outer scope runs the inner scope's cleanups first.
#[test]
fn scenario_c_nested_scopes_unwind_inside_out() {
    let log = recorder();
    let outer = DisposalScope::root();

    outer.run(|| {
        let log_x = log.clone();
        on_cleanup(move || log_x.borrow_mut().push("X")).unwrap();

        let inner = DisposalScope::new();
        inner.run(|| {
            let log_y = log.clone();
            on_cleanup(move || log_y.borrow_mut().push("Y")).unwrap();
        });
    });

    outer.dispose();
    assert_eq!(*log.borrow(), vec!["Y", "X"]);

    // Idempotent
    outer.dispose();
    assert_eq!(log.borrow().len(), 2);
}

/// A provided value is visible inside the callback only.
#[test]
fn scenario_d_provider_is_lexical() {
    let theme = Context::new("light");

    let inside = theme.provide("dark", || theme.get());
    assert_eq!(inside, "dark");
    assert_eq!(theme.get(), "light");
}

/// A continuation spawned by an effect keeps the effect's context after
/// the provider has returned.
#[tokio::test(flavor = "current_thread")]
async fn scenario_e_deferred_continuation_keeps_context() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let theme = Context::new("light");
            let seen = recorder();
            let tasks = recorder();

            let _effect = theme.provide("dark", || {
                let (theme, seen, tasks) = (theme.clone(), seen.clone(), tasks.clone());
                Effect::new(move || {
                    let (theme, seen) = (theme.clone(), seen.clone());
                    let task = tokio::task::spawn_local(
                        async move {
                            tokio::task::yield_now().await;
                            seen.borrow_mut().push(theme.get());
                        }
                        .in_current_context(),
                    );
                    tasks.borrow_mut().push(task);
                })
            });

            // The provider has exited.
            assert_eq!(theme.get(), "light");

            let pending: Vec<_> = tasks.borrow_mut().drain(..).collect();
            for task in pending {
                task.await.unwrap();
            }
            assert_eq!(*seen.borrow(), vec!["dark"]);
        })
        .await;
}

/// Without re-attaching, a continuation only sees what is ambient when it
/// is polled.
#[tokio::test(flavor = "current_thread")]
async fn detached_continuation_sees_default() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let theme = Context::new("light");
            let task = theme.provide("dark", || {
                let theme = theme.clone();
                tokio::task::spawn_local(async move {
                    tokio::task::yield_now().await;
                    theme.get()
                })
            });
            assert_eq!(task.await.unwrap(), "light");
        })
        .await;
}

/// A continuation can re-enter the effect run's disposal scope and
/// register cleanups there.
#[tokio::test(flavor = "current_thread")]
async fn continuation_resumes_effect_scope() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let trigger = Signal::new(0);
            let log = recorder();
            let tasks = recorder();

            let _effect = Effect::new({
                let (trigger, log, tasks) = (trigger.clone(), log.clone(), tasks.clone());
                move || {
                    let run = trigger.get();
                    let Some(scope) = DisposalScope::current() else {
                        return;
                    };
                    let log = log.clone();
                    tasks.borrow_mut().push(tokio::task::spawn_local(async move {
                        tokio::task::yield_now().await;
                        scope.resume(|| {
                            let log = log.clone();
                            on_cleanup(move || log.borrow_mut().push(format!("cleanup {run}")))
                                .unwrap();
                        });
                    }));
                }
            });

            let first: Vec<_> = tasks.borrow_mut().drain(..).collect();
            for task in first {
                task.await.unwrap();
            }

            trigger.set(1);
            assert_eq!(*log.borrow(), vec!["cleanup 0"]);
        })
        .await;
}

/// Every run's scope resumes into the effect's creation context, even when
/// the run was triggered from under another provider.
#[test]
fn rerun_scopes_resume_the_creation_context() {
    let theme = Context::new("light");
    let signal = Signal::new(0);
    let scopes: Rc<RefCell<Vec<DisposalScope>>> = recorder();

    let _effect = theme.provide("dark", || {
        let (signal, scopes) = (signal.clone(), scopes.clone());
        Effect::new(move || {
            signal.get();
            if let Some(scope) = DisposalScope::current() {
                scopes.borrow_mut().push(scope);
            }
        })
    });

    theme.provide("sepia", || signal.set(1));
    signal.set(2);

    let seen: Vec<_> = scopes
        .borrow()
        .iter()
        .map(|scope| scope.resume(|| theme.get()))
        .collect();
    assert_eq!(seen, vec!["dark", "dark", "dark"]);
}

/// In-place mutation goes through the same notification path as `set`.
#[test]
fn container_mutation_through_bridge() {
    let todos = Signal::new(vec!["write tests"]);
    let count = Computed::new({
        let todos = todos.clone();
        move || todos.with(Vec::len)
    });
    let counts = recorder();
    let _effect = Effect::new({
        let (count, counts) = (count.clone(), counts.clone());
        move || counts.borrow_mut().push(count.get())
    });

    todos.mutate(|todos| todos.push("ship"));
    {
        let mut guard = todos.peek_mut();
        guard.push("celebrate");
    }
    todos.notify();

    assert_eq!(*counts.borrow(), vec![1, 2, 3]);
}

proptest! {
    /// Any sequence of writes in one batch runs a dependent effect once and
    /// shows it the last value.
    #[test]
    fn batched_writes_run_effect_once(writes in prop::collection::vec(-5i32..5, 1..20)) {
        let signal = Signal::new(0);
        let seen = recorder();
        let _effect = Effect::new({
            let (signal, seen) = (signal.clone(), seen.clone());
            move || seen.borrow_mut().push(signal.get())
        });

        batch(|| {
            for value in &writes {
                signal.set(*value);
            }
        });

        let changed = writes.iter().any(|value| *value != 0);
        let seen = seen.borrow();
        prop_assert_eq!(seen.len(), if changed { 2 } else { 1 });
        if changed {
            prop_assert_eq!(seen.last(), writes.last());
        }
    }

    /// Repeated reads with no writes in between derive once.
    #[test]
    fn repeated_reads_derive_once(reads in 1usize..40) {
        let derivations = Rc::new(Cell::new(0));
        let signal = Signal::new(3);
        let computed = Computed::new({
            let (signal, derivations) = (signal.clone(), derivations.clone());
            move || {
                derivations.set(derivations.get() + 1);
                signal.get() * 2
            }
        });

        for _ in 0..reads {
            prop_assert_eq!(computed.get(), 6);
        }
        prop_assert_eq!(derivations.get(), 1);
    }

    /// `peek` reflects the last `set`, and `notify` leaves it alone.
    #[test]
    fn peek_follows_set(values in prop::collection::vec(".{0,8}", 1..10)) {
        let signal = Signal::new(String::new());
        for value in &values {
            signal.set(value.clone());
            prop_assert_eq!(&signal.peek(), value);
            signal.notify();
            prop_assert_eq!(&signal.peek(), value);
        }
    }

    /// Effects downstream of a diamond only ever see consistent pairs.
    #[test]
    fn diamond_never_glitches(writes in prop::collection::vec(prop::collection::vec(-100i64..100, 1..4), 1..10)) {
        let base = Signal::new(0i64);
        let doubled = Computed::new({
            let base = base.clone();
            move || base.get() * 2
        });
        let shifted = Computed::new({
            let base = base.clone();
            move || base.get() + 7
        });
        let seen = recorder();
        let _effect = Effect::new({
            let (doubled, shifted, seen) = (doubled.clone(), shifted.clone(), seen.clone());
            move || seen.borrow_mut().push((doubled.get(), shifted.get()))
        });

        for group in &writes {
            batch(|| {
                for value in group {
                    base.set(*value);
                }
            });
        }

        for (doubled, shifted) in seen.borrow().iter() {
            prop_assert_eq!(*doubled, (*shifted - 7) * 2);
        }
    }
}
