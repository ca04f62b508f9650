//! Shared helpers for the concurrent tests in `concur-lock-manager` and
//! `concur-cuckoo-map`: a thread rendezvous so every worker starts its
//! racy section at the same instant, and per-test deterministic RNG
//! derivation so a failing interleaving can be replayed from a seed.

#![forbid(unsafe_code)]

use std::sync::{Arc, Barrier};

pub use concur_core::{Rng64, seed_from_env};

/// Blocks every clone's caller until `n` clones have called
/// [`Rendezvous::wait`], then releases them all at once.
///
/// Spawning `n` threads that each do setup, call `wait`, then immediately
/// run the section under test maximizes the chance of the scheduler
/// actually interleaving them, instead of one thread finishing before
/// the next is even scheduled.
#[derive(Clone)]
pub struct Rendezvous {
    barrier: Arc<Barrier>,
}

impl Rendezvous {
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            barrier: Arc::new(Barrier::new(n)),
        }
    }

    pub fn wait(&self) {
        self.barrier.wait();
    }
}

/// Spawn `n` workers, hand each its index and a shared [`Rendezvous`],
/// and join all of them before returning their results.
///
/// # Panics
/// Panics (propagating the worker's panic) if any worker thread panics.
pub fn run_rendezvoused<T, F>(n: usize, worker: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, Rendezvous) -> T + Send + Sync + 'static,
{
    let gate = Rendezvous::new(n);
    let worker = Arc::new(worker);
    let handles: Vec<_> = (0..n)
        .map(|i| {
            let gate = gate.clone();
            let worker = worker.clone();
            std::thread::spawn(move || worker(i, gate))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("worker thread panicked"))
        .collect()
}

/// Derive a reproducible per-test RNG from the process-wide seed
/// (`CONCUR_TEST_SEED`, see [`seed_from_env`]) and a stable name, so two
/// tests running concurrently in the same process get independent
/// streams without stepping on each other's seed state.
#[must_use]
pub fn rng_for_test(name: &str) -> Rng64 {
    let mut base = Rng64::new(seed_from_env());
    let discriminator = name.bytes().fold(0u64, |acc, b| {
        acc.wrapping_mul(31).wrapping_add(u64::from(b))
    });
    base.fork(discriminator)
}
