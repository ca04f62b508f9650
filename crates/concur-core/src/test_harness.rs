//! Deterministic seeded randomness for reproducible concurrency tests.
//!
//! Interleavings between threads are inherently nondeterministic, which
//! makes a failing concurrent test nearly useless unless its randomness
//! can be replayed. Every property test and fuzz loop in this workspace
//! drives its random choices (which lock to acquire, which key to probe,
//! how long to sleep) from an [`Rng64`] seeded once at the top of the
//! test, so a failure can be reproduced by re-running with the same seed.

#![allow(clippy::missing_const_for_fn)]

/// Deterministic pseudo-random number generator (xorshift64).
///
/// Produces a reproducible sequence given the same seed. Not
/// cryptographically secure; intended only for driving test and fuzz
/// interleavings.
#[derive(Debug, Clone)]
pub struct Rng64 {
    state: u64,
}

impl Rng64 {
    /// Create a new PRNG with the given seed. Zero seeds are remapped to
    /// a fixed non-zero value to avoid the xorshift degenerate case.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 {
                0x517c_c1b7_2722_0a95
            } else {
                seed
            },
        }
    }

    /// Advance the state and return the next pseudo-random `u64`.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Return a value in `[0, bound)`. Returns 0 when `bound == 0`.
    pub fn next_bounded(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.next_u64() % bound
    }

    /// Return a value in `[lo, hi)`. Panics if `lo >= hi`.
    pub fn next_range(&mut self, lo: u64, hi: u64) -> u64 {
        assert!(lo < hi, "next_range requires lo < hi");
        lo + self.next_bounded(hi - lo)
    }

    /// Return `true` with probability `numerator / denominator`.
    pub fn next_chance(&mut self, numerator: u64, denominator: u64) -> bool {
        self.next_bounded(denominator) < numerator
    }

    /// Pick a random element from a slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        assert!(!items.is_empty(), "choose requires non-empty slice");
        let idx = self.next_bounded(items.len() as u64) as usize;
        &items[idx]
    }

    /// Derive a child RNG with a new seed based on current state + discriminator.
    ///
    /// Used to hand each worker thread in a concurrent test its own
    /// independent stream while keeping the overall run reproducible from
    /// a single top-level seed.
    #[must_use]
    pub fn fork(&mut self, discriminator: u64) -> Self {
        Self::new(self.next_u64().wrapping_add(discriminator))
    }
}

/// Read a u64 seed from `CONCUR_TEST_SEED`, defaulting to a fixed value
/// so unset-env runs are still reproducible from run to run.
#[must_use]
pub fn seed_from_env() -> u64 {
    std::env::var("CONCUR_TEST_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0xC0FF_EE15_BAD5_EED)
}
