//! Loom model check of the claim-inside-mutex invariant on a reduced,
//! 2-thread model.
//!
//! `LockManager` itself is built on `std::sync::Mutex`/`Condvar`, which
//! loom cannot schedule (loom requires its own `loom::sync` primitives
//! to explore interleavings). This model instead exercises the same
//! claim protocol `try_claim_locked` implements — "read holder state,
//! decide, write holder state, all under one mutex" — against loom's
//! scheduler directly, checking the one invariant spec.md actually
//! cares about here: two threads never both believe they hold the same
//! exclusive lock at once. Full loom exploration of the real
//! `LockManager` state machine is infeasible (state space); this
//! reduced model is the accepted tradeoff for its class of bug (races
//! around the mutex-guarded claim, not the blocking/condvar path).
//!
//! Run with: `cargo test --features loom-tests --test loom_acquire_release`

#![cfg(feature = "loom-tests")]

use loom::sync::Mutex;
use loom::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn two_threads_never_both_claim_exclusive() {
    loom::model(|| {
        let held_by: Arc<Mutex<Option<usize>>> = Arc::new(Mutex::new(None));
        let both_claimed = Arc::new(AtomicUsize::new(0));

        let claim = |id: usize, held_by: Arc<Mutex<Option<usize>>>, counter: Arc<AtomicUsize>| {
            let mut guard = held_by.lock().unwrap();
            if guard.is_none() {
                *guard = Some(id);
                counter.fetch_add(1, Ordering::SeqCst);
            }
        };

        let h1 = {
            let held_by = held_by.clone();
            let counter = both_claimed.clone();
            loom::thread::spawn(move || claim(1, held_by, counter))
        };
        claim(2, held_by.clone(), both_claimed.clone());
        h1.join().unwrap();

        // Exactly one of the two threads should have won the claim;
        // the mutex-guarded read-decide-write never lets both through.
        assert_eq!(both_claimed.load(Ordering::SeqCst), 1);
    });
}
