//! Benchmarks for the reactive hot paths: notification fan-out, batched
//! flushes, and memoized re-reads.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use skein_core::reactive::{
    next_tick, noop_callback, Scope, Value, WatchSource, Watcher, WatcherOptions,
};

fn scope_with_counter() -> Scope {
    Scope::new(Value::from_json(serde_json::json!({"count": 0})))
}

fn bench_set_and_flush(c: &mut Criterion) {
    let scope = scope_with_counter();
    for _ in 0..10 {
        scope.watch("count", noop_callback(), WatcherOptions::default());
    }

    let mut n = 0i64;
    c.bench_function("set_and_flush_10_watchers", |b| {
        b.iter(|| {
            n += 1;
            scope.root().set("count", Value::from(n));
            next_tick::drain();
        })
    });
}

fn bench_untracked_read(c: &mut Criterion) {
    let scope = scope_with_counter();
    c.bench_function("untracked_read", |b| {
        b.iter(|| scope.root().get_untracked("count"))
    });
}

fn bench_lazy_reread(c: &mut Criterion) {
    let scope = scope_with_counter();
    let lazy = Watcher::new(
        &scope,
        WatchSource::getter(|s: &Scope| Ok(s.root().get("count"))),
        noop_callback(),
        WatcherOptions {
            lazy: true,
            ..Default::default()
        },
        false,
    );
    lazy.evaluate().unwrap();

    c.bench_function("lazy_clean_reread", |b| {
        b.iter(|| {
            if lazy.is_dirty() {
                lazy.evaluate().unwrap();
            }
            lazy.value()
        })
    });
}

fn bench_watcher_churn(c: &mut Criterion) {
    c.bench_function("watcher_create_teardown", |b| {
        let scope = scope_with_counter();
        b.iter_batched(
            || scope.clone(),
            |scope| {
                let watcher = scope.watch("count", noop_callback(), WatcherOptions::default());
                watcher.teardown();
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_set_and_flush,
    bench_untracked_read,
    bench_lazy_reread,
    bench_watcher_churn
);
criterion_main!(benches);
