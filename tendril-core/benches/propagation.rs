//! Write-to-effect propagation benchmarks.

use std::cell::Cell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tendril_core::reactive::{batch, Computed, Effect, Signal};

fn bench_signal_to_effect(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal_to_effect");

    for fanout in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(fanout), &fanout, |b, &fanout| {
            let signal = Signal::new(0u64);
            let sink = Rc::new(Cell::new(0u64));
            let _effects: Vec<Effect> = (0..fanout)
                .map(|_| {
                    let (signal, sink) = (signal.clone(), sink.clone());
                    Effect::new(move || sink.set(sink.get().wrapping_add(signal.get())))
                })
                .collect();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                signal.set(black_box(next));
            });
        });
    }

    group.finish();
}

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");

    for depth in [1usize, 10, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let source = Signal::new(0u64);
            let mut tail = {
                let source = source.clone();
                Computed::new(move || source.get())
            };
            for _ in 1..depth {
                let previous = tail.clone();
                tail = Computed::new(move || previous.get() + 1);
            }

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(next);
                black_box(tail.get())
            });
        });
    }

    group.finish();
}

fn bench_batched_writes(c: &mut Criterion) {
    c.bench_function("batch_100_writes_one_effect", |b| {
        let signals: Vec<Signal<u64>> = (0..100).map(|_| Signal::new(0)).collect();
        let _effect = Effect::new({
            let signals = signals.clone();
            move || {
                black_box(signals.iter().map(Signal::get).sum::<u64>());
            }
        });

        let mut next = 0u64;
        b.iter(|| {
            next += 1;
            batch(|| {
                for signal in &signals {
                    signal.set(next);
                }
            });
        });
    });
}

criterion_group!(benches, bench_signal_to_effect, bench_computed_chain, bench_batched_writes);
criterion_main!(benches);
