//! Uncontended acquire/release latency for `LockManager`.

use concur_lock_manager::LockManager;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn uncontended_exclusive(c: &mut Criterion) {
    let manager = LockManager::new();
    let handle = manager.exclusive("bench-exclusive");
    c.bench_function("exclusive acquire/release uncontended", |b| {
        b.iter(|| {
            handle.acquire().unwrap();
            black_box(handle.is_held_by_current_thread());
            handle.release().unwrap();
        });
    });
}

fn uncontended_shared(c: &mut Criterion) {
    let manager = LockManager::new();
    let handle = manager.shared("bench-shared");
    c.bench_function("shared acquire/release uncontended", |b| {
        b.iter(|| {
            handle.acquire().unwrap();
            black_box(handle.is_held_by_current_thread());
            handle.release().unwrap();
        });
    });
}

criterion_group!(benches, uncontended_exclusive, uncontended_shared);
criterion_main!(benches);
