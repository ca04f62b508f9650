//! One test per spec.md §8.2 "Concrete scenarios" bullet, run against
//! the real `CuckooMap` rather than a model.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use concur_cuckoo_map::CuckooMap;
use concur_test_helpers::Rendezvous;

const ABSENT: i64 = i64::MIN + 1;

/// Initial capacity hint 2. Insert keys {0, 509, 1018, 1527, 2036} with
/// values equal to `-k`. `get(k, sentinel)` returns `-k` for each.
/// `rehash_count()` may be 0 or more but remains stable after
/// quiescence.
#[test]
fn sparse_keys_survive_growth_from_a_tiny_initial_capacity() {
    let map = CuckooMap::new(2);
    let keys = [0i64, 509, 1018, 1527, 2036];
    for &k in &keys {
        map.put(k, -k, ABSENT).unwrap();
    }
    for &k in &keys {
        assert_eq!(map.get(k, ABSENT).unwrap(), -k);
    }
    let stable = map.rehash_count();
    for &k in &keys {
        assert_eq!(map.get(k, ABSENT).unwrap(), -k);
    }
    assert_eq!(map.rehash_count(), stable);
}

/// Insert keys 1..1000, then `remove` keys 1..500. `contains_key(i)`
/// returns true for i∈[501,1000] and false for i∈[1,500]; iterator
/// yields exactly the 500 surviving pairs (modulo the documented
/// fuzziness).
#[test]
fn remove_half_then_iterate_surviving_pairs() {
    let map = CuckooMap::new(64);
    for k in 1..1000i64 {
        map.put(k, k * 2, ABSENT).unwrap();
    }
    for k in 1..500i64 {
        map.remove(k, ABSENT).unwrap();
    }

    for k in 1..500i64 {
        assert!(!map.contains_key(k), "key {k} should have been removed");
    }
    for k in 500..1000i64 {
        assert!(map.contains_key(k), "key {k} should still be present");
    }

    let mut surviving = std::collections::HashSet::new();
    let mut cursor = map.iterator();
    while cursor.next() {
        surviving.insert(cursor.key());
    }
    assert_eq!(surviving.len(), 500);
    for k in 500..1000i64 {
        assert!(surviving.contains(&k));
    }
}

/// Two threads repeatedly swap `put(1, A)` and `put(1, B)` 10⁶ times
/// each. At the end, `get(1, sentinel)` ∈ {A, B}; no other value, no
/// sentinel returned.
#[test]
fn racing_swap_never_yields_a_foreign_or_sentinel_value() {
    const A: i64 = 111;
    const B: i64 = 222;
    const ITERATIONS: u64 = 1_000_000;

    let map = Arc::new(CuckooMap::new(8));
    map.put(1, A, ABSENT).unwrap();
    let gate = Rendezvous::new(2);

    let m1 = map.clone();
    let g1 = gate.clone();
    let t1 = std::thread::spawn(move || {
        g1.wait();
        for _ in 0..ITERATIONS {
            m1.put(1, A, ABSENT).unwrap();
        }
    });
    let m2 = map.clone();
    let g2 = gate.clone();
    let t2 = std::thread::spawn(move || {
        g2.wait();
        for _ in 0..ITERATIONS {
            m2.put(1, B, ABSENT).unwrap();
        }
    });

    t1.join().unwrap();
    t2.join().unwrap();

    let observed = map.get(1, ABSENT).unwrap();
    assert!(observed == A || observed == B, "observed {observed}");
}

/// `compute_if_absent(k, λx. 42)` called concurrently by 16 threads on
/// the same absent key: exactly one factory invocation installs 42 (the
/// others observe it); all 16 return 42.
#[test]
fn sixteen_concurrent_compute_if_absent_calls_install_once() {
    const WORKERS: usize = 16;

    let map = Arc::new(CuckooMap::new(8));
    let factory_calls = Arc::new(AtomicU32::new(0));
    let gate = Rendezvous::new(WORKERS);

    let results: Vec<i64> = (0..WORKERS)
        .map(|_| {
            let map = map.clone();
            let factory_calls = factory_calls.clone();
            let gate = gate.clone();
            std::thread::spawn(move || {
                gate.wait();
                map.compute_if_absent(7, |_| {
                    factory_calls.fetch_add(1, Ordering::SeqCst);
                    42
                })
                .unwrap()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    assert!(results.iter().all(|&v| v == 42));
    assert_eq!(factory_calls.load(Ordering::SeqCst), 1);
}
