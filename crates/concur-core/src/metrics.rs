//! Lock-free metrics primitives + a small global metrics surface.
//!
//! Design goals:
//! - Hot-path recording: O(1), no allocations, no locks.
//! - Snapshotting: lock-free loads + derived quantiles (approx) for histograms.
//!
//! This is intentionally lightweight (std-only) so both component crates
//! (`concur-lock-manager`, `concur-cuckoo-map`) can record metrics without
//! depending on each other.

#![forbid(unsafe_code)]

use serde::Serialize;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Counter {
    v: AtomicU64,
}

impl Counter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            v: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc(&self) {
        self.v.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, delta: u64) {
        self.v.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> u64 {
        self.v.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn store(&self, value: u64) {
        self.v.store(value, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
pub struct GaugeI64 {
    v: AtomicI64,
}

impl GaugeI64 {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            v: AtomicI64::new(0),
        }
    }

    #[inline]
    pub fn add(&self, delta: i64) {
        self.v.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn set(&self, value: i64) {
        self.v.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> i64 {
        self.v.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct GaugeU64 {
    v: AtomicU64,
}

impl GaugeU64 {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            v: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn add(&self, delta: u64) {
        self.v.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn set(&self, value: u64) {
        self.v.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> u64 {
        self.v.load(Ordering::Relaxed)
    }

    /// Lock-free CAS loop to update an atomic max value.
    #[inline]
    pub fn fetch_max(&self, value: u64) {
        let mut cur = self.v.load(Ordering::Relaxed);
        while value > cur {
            match self
                .v
                .compare_exchange_weak(cur, value, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(next) => cur = next,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Histogram (fixed-bucket log2)
// ---------------------------------------------------------------------------

const LOG2_BUCKETS: usize = 64;

#[derive(Debug)]
pub struct Log2Histogram {
    buckets: [AtomicU64; LOG2_BUCKETS],
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
}

impl Default for Log2Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Log2Histogram {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.min.fetch_min(value, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
        let idx = bucket_index(value);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        // count is written LAST with Release so that an Acquire load on count
        // in snapshot() establishes a happens-before edge for all prior writes.
        self.count.fetch_add(1, Ordering::Release);
    }

    /// Reset all counters to their initial state.
    pub fn reset(&self) {
        for bucket in &self.buckets {
            bucket.store(0, Ordering::Relaxed);
        }
        self.count.store(0, Ordering::Relaxed);
        self.sum.store(0, Ordering::Relaxed);
        self.min.store(u64::MAX, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        // Acquire on count pairs with Release in record(), ensuring all prior
        // writes (sum, min, max, buckets) are visible.
        let count = self.count.load(Ordering::Acquire);
        if count == 0 {
            return HistogramSnapshot::default();
        }

        let buckets: [u64; LOG2_BUCKETS] =
            std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed));

        let raw_min = self.min.load(Ordering::Relaxed);
        let max = self.max.load(Ordering::Relaxed);
        // Clamp min <= max to maintain invariant even under concurrent races.
        let min = raw_min.min(max);
        let p50 = estimate_quantile_frac(&buckets, count, 1, 2, max);
        let p95 = estimate_quantile_frac(&buckets, count, 19, 20, max);
        let p99 = estimate_quantile_frac(&buckets, count, 99, 100, max);

        HistogramSnapshot {
            count,
            sum: self.sum.load(Ordering::Relaxed),
            min,
            max,
            p50,
            p95,
            p99,
        }
    }
}

#[inline]
const fn bucket_index(value: u64) -> usize {
    if value == 0 {
        return 0;
    }
    let lz = value.leading_zeros() as usize;
    // floor(log2(value)) in range 0..=63
    63usize.saturating_sub(lz)
}

const fn bucket_upper_bound(idx: usize) -> u64 {
    if idx >= 63 {
        return u64::MAX;
    }
    (1u64 << (idx + 1)).saturating_sub(1)
}

fn estimate_quantile_frac(
    buckets: &[u64; LOG2_BUCKETS],
    count: u64,
    numerator: u64,
    denominator: u64,
    observed_max: u64,
) -> u64 {
    debug_assert!(denominator > 0);
    // Nearest-rank method: smallest value x such that F(x) >= q.
    let numerator = numerator.min(denominator);
    let mut rank = count
        .saturating_mul(numerator)
        .saturating_add(denominator.saturating_sub(1))
        / denominator;
    rank = rank.clamp(1, count);

    let mut cumulative = 0u64;
    for (idx, c) in buckets.iter().copied().enumerate() {
        cumulative = cumulative.saturating_add(c);
        if cumulative >= rank {
            return bucket_upper_bound(idx).min(observed_max);
        }
    }
    observed_max
}

// ---------------------------------------------------------------------------
// Lock manager contention metrics
// ---------------------------------------------------------------------------

/// Per-`NamedLock` contention statistics (lock-free atomics).
#[derive(Debug, Default)]
pub struct LockMetrics {
    pub acquires_total: Counter,
    pub contended_total: Counter,
    pub deadlocks_total: Counter,
    pub wait_us: Log2Histogram,
    pub hold_us: Log2Histogram,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LockMetricsSnapshot {
    pub acquires_total: u64,
    pub contended_total: u64,
    pub deadlocks_total: u64,
    pub wait_us: HistogramSnapshot,
    pub hold_us: HistogramSnapshot,
}

impl LockMetrics {
    #[inline]
    pub fn record_acquire(&self, contended: bool, wait_us: u64) {
        self.acquires_total.inc();
        if contended {
            self.contended_total.inc();
            self.wait_us.record(wait_us);
        }
    }

    #[inline]
    pub fn record_deadlock(&self) {
        self.deadlocks_total.inc();
    }

    #[inline]
    pub fn record_hold(&self, hold_us: u64) {
        self.hold_us.record(hold_us);
    }

    #[must_use]
    pub fn snapshot(&self) -> LockMetricsSnapshot {
        LockMetricsSnapshot {
            acquires_total: self.acquires_total.load(),
            contended_total: self.contended_total.load(),
            deadlocks_total: self.deadlocks_total.load(),
            wait_us: self.wait_us.snapshot(),
            hold_us: self.hold_us.snapshot(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cuckoo map metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CuckooMetrics {
    pub gets_total: Counter,
    pub puts_total: Counter,
    pub removes_total: Counter,
    pub bumps_total: Counter,
    pub rehashes_total: Counter,
    pub table_capacity: GaugeU64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CuckooMetricsSnapshot {
    pub gets_total: u64,
    pub puts_total: u64,
    pub removes_total: u64,
    pub bumps_total: u64,
    pub rehashes_total: u64,
    pub table_capacity: u64,
}

impl CuckooMetrics {
    #[must_use]
    pub fn snapshot(&self) -> CuckooMetricsSnapshot {
        CuckooMetricsSnapshot {
            gets_total: self.gets_total.load(),
            puts_total: self.puts_total.load(),
            removes_total: self.removes_total.load(),
            bumps_total: self.bumps_total.load(),
            rehashes_total: self.rehashes_total.load(),
            table_capacity: self.table_capacity.load(),
        }
    }
}

#[derive(Debug, Default)]
pub struct GlobalMetrics {
    pub lock_manager: LockMetrics,
    pub cuckoo_map: CuckooMetrics,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GlobalMetricsSnapshot {
    pub lock_manager: LockMetricsSnapshot,
    pub cuckoo_map: CuckooMetricsSnapshot,
}

impl GlobalMetrics {
    #[must_use]
    pub fn snapshot(&self) -> GlobalMetricsSnapshot {
        GlobalMetricsSnapshot {
            lock_manager: self.lock_manager.snapshot(),
            cuckoo_map: self.cuckoo_map.snapshot(),
        }
    }
}

static GLOBAL_METRICS: LazyLock<GlobalMetrics> = LazyLock::new(GlobalMetrics::default);

#[must_use]
pub fn global_metrics() -> &'static GlobalMetrics {
    &GLOBAL_METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log2_bucket_indexing_smoke() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(1), 0);
        assert_eq!(bucket_index(2), 1);
        assert_eq!(bucket_index(3), 1);
        assert_eq!(bucket_index(4), 2);
        assert_eq!(bucket_index(7), 2);
        assert_eq!(bucket_index(8), 3);
    }

    #[test]
    fn histogram_snapshot_empty_is_zeros() {
        let h = Log2Histogram::new();
        let snap = h.snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(snap.min, 0);
        assert_eq!(snap.p99, 0);
    }

    #[test]
    fn histogram_quantiles_are_monotonic() {
        let h = Log2Histogram::new();
        for v in [1u64, 2, 3, 4, 10, 100, 1000, 10_000] {
            h.record(v);
        }
        let snap = h.snapshot();
        assert!(snap.p50 <= snap.p95);
        assert!(snap.p95 <= snap.p99);
        assert!(snap.max >= snap.p99);
    }

    #[test]
    fn histogram_min_max_clamped_invariant() {
        use std::sync::Arc;
        use std::thread;

        let h = Arc::new(Log2Histogram::new());
        let h1 = Arc::clone(&h);
        let t1 = thread::spawn(move || h1.record(1000));
        let h2 = Arc::clone(&h);
        let t2 = thread::spawn(move || h2.record(1));
        t1.join().unwrap();
        t2.join().unwrap();

        let snap = h.snapshot();
        assert!(
            snap.min <= snap.max,
            "Invariant violated: min={} > max={}",
            snap.min,
            snap.max
        );
        assert_eq!(snap.count, 2);
    }

    #[test]
    fn counter_store_and_load() {
        let c = Counter::new();
        assert_eq!(c.load(), 0);
        c.store(42);
        assert_eq!(c.load(), 42);
    }

    #[test]
    fn counter_inc_and_add() {
        let c = Counter::new();
        c.inc();
        c.inc();
        assert_eq!(c.load(), 2);
        c.add(10);
        assert_eq!(c.load(), 12);
    }

    #[test]
    fn gauge_i64_add_set_load() {
        let g = GaugeI64::new();
        g.set(100);
        g.add(-30);
        assert_eq!(g.load(), 70);
    }

    #[test]
    fn gauge_u64_fetch_max() {
        let g = GaugeU64::new();
        g.set(10);
        g.fetch_max(5);
        assert_eq!(g.load(), 10);
        g.fetch_max(20);
        assert_eq!(g.load(), 20);
    }

    #[test]
    fn histogram_reset_clears_all_state() {
        let h = Log2Histogram::new();
        h.record(100);
        h.record(200);
        let snap = h.snapshot();
        assert_eq!(snap.count, 2);
        h.reset();
        let snap2 = h.snapshot();
        assert_eq!(snap2.count, 0);
    }

    #[test]
    fn lock_metrics_record_acquire_and_deadlock() {
        let m = LockMetrics::default();
        m.record_acquire(false, 0);
        m.record_acquire(true, 150);
        m.record_deadlock();
        let snap = m.snapshot();
        assert_eq!(snap.acquires_total, 2);
        assert_eq!(snap.contended_total, 1);
        assert_eq!(snap.deadlocks_total, 1);
        assert_eq!(snap.wait_us.count, 1);
    }

    #[test]
    fn global_metrics_returns_consistent_reference() {
        let gm1 = super::global_metrics();
        let gm2 = super::global_metrics();
        assert!(std::ptr::eq(gm1, gm2));
    }
}
