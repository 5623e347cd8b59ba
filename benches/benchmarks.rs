use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;

use tincan_persist::platform::{Origin, StorageArea, StorageEvent};
use tincan_persist::{local_storage_with, persist, PersistOptions, Signal, StorageOptions};

fn synced() -> StorageOptions<i32> {
    StorageOptions::new().sync_tabs(true)
}

fn signal_write_benchmark(c: &mut Criterion) {
    let signal: Signal<i32> = Signal::new(0);

    c.bench_function("signal_write", |b| {
        let mut i = 0;
        b.iter(|| {
            signal.set(black_box(i));
            i += 1;
        });
    });
}

fn persisted_write_benchmark(c: &mut Criterion) {
    let window = Origin::new().open_window();
    let value = persist(
        local_storage_with(Some(&window), "bench", 0, synced()),
        PersistOptions::wide(),
    )
    .unwrap();

    c.bench_function("persisted_write", |b| {
        let mut i = 0;
        b.iter(|| {
            value.set(black_box(i));
            i += 1;
        });
    });
    value.cleanup();
}

fn registry_dispatch_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_dispatch");

    for key_count in [1, 10, 100].iter() {
        let window = Origin::new().open_window();
        let registry = window.broadcast_registry(StorageArea::Local);
        for n in 0..*key_count {
            registry.register(format!("key-{n}"), Arc::new(|raw: Option<&str>| {
                black_box(raw);
            }));
        }
        let event = StorageEvent::local("key-0", Some("1"));

        group.bench_with_input(
            BenchmarkId::from_parameter(key_count),
            key_count,
            |b, _| {
                b.iter(|| window.dispatch_storage_event(black_box(&event)));
            },
        );
    }
    group.finish();
}

fn cross_window_sync_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_window_sync");

    for window_count in [2, 8].iter() {
        let origin = Origin::new();
        let windows: Vec<_> = (0..*window_count).map(|_| origin.open_window()).collect();
        let bindings: Vec<_> = windows
            .iter()
            .map(|w| {
                persist(
                    local_storage_with(Some(w), "shared", 0, synced()),
                    PersistOptions::wide(),
                )
                .unwrap()
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(window_count),
            window_count,
            |b, _| {
                let mut i = 1;
                b.iter(|| {
                    bindings[0].set(black_box(i));
                    i += 1;
                });
            },
        );

        for binding in &bindings {
            binding.cleanup();
        }
    }
    group.finish();
}

criterion_group!(
    benches,
    signal_write_benchmark,
    persisted_write_benchmark,
    registry_dispatch_benchmark,
    cross_window_sync_benchmark,
);
criterion_main!(benches);
