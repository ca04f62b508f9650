//! [`CuckooMap`]: the lock-free `i64 -> i64` map itself — read/write/bump
//! protocols, rehashing, and the best-effort iterator.
//!
//! `unsafe` is confined to this one module's table-pointer swap. Per-bucket
//! CAS in `table.rs` is ordinary safe `std::sync::atomic`; only publishing a
//! whole replacement [`Table`] behind a single atomically-swapped pointer
//! (spec.md §3.2: "the active table is referenced atomically by a single
//! pointer that may transiently be null") needs a raw pointer, the same way
//! every lock-free-structure implementation in the ecosystem does (cf.
//! `AtomicPtr`-based stacks/queues in the wider corpus) — an `Arc`-based
//! swap would add a second reclamation scheme on top of the one the bucket
//! protocol already provides for free (old tables are never read once the
//! winning rehasher nulls the pointer).

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use concur_core::{Config, global_metrics};
use tracing::trace;

use crate::addressing::{
    SENTINEL, bump_source_is_primary, candidate_indices, next_capacity_after,
    next_capacity_at_least,
};
use crate::error::{Error, Result};
use crate::table::{Bucket, Table};

/// A thread-safe `i64 -> i64` map using cuckoo hashing, with concurrent
/// readers and writers coordinated entirely through per-bucket CAS and a
/// revision-guarded sequence-lock read protocol — no mutex guards
/// `get`/`put`/`remove`.
///
/// Rehashing briefly nulls the table pointer while the winning thread
/// rebuilds it (spec.md §4.2 "Rehash"); every other reader/writer just
/// busy-waits for the replacement, exactly as spec.md describes. It never
/// blocks on a mutex.
pub struct CuckooMap {
    table: AtomicPtr<Table>,
    rehash_count: AtomicU32,
    bump_depth_limit: u32,
}

impl Drop for CuckooMap {
    fn drop(&mut self) {
        let ptr = self.table.load(Ordering::Acquire);
        if !ptr.is_null() {
            // SAFETY: `self.table` is the sole owner of this allocation;
            // no other thread can be operating on it once `self` is
            // being dropped.
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

impl CuckooMap {
    /// Create a map sized for at least `2 * initial_capacity_hint + 1`
    /// entries, rounded up to the smallest progression prime (spec.md
    /// §6.2).
    #[must_use]
    pub fn new(initial_capacity_hint: usize) -> Self {
        Self::with_config(initial_capacity_hint, &Config::default())
    }

    /// As [`Self::new`], but with explicit tuning (bump depth limit).
    #[must_use]
    pub fn with_config(initial_capacity_hint: usize, config: &Config) -> Self {
        let minimum = initial_capacity_hint.saturating_mul(2).saturating_add(1);
        let capacity = next_capacity_at_least(minimum.max(1)).unwrap_or(usize::MAX);
        let table = Box::new(Table::with_capacity(capacity));
        global_metrics()
            .cuckoo_map
            .table_capacity
            .set(capacity as u64);
        Self {
            table: AtomicPtr::new(Box::into_raw(table)),
            rehash_count: AtomicU32::new(0),
            bump_depth_limit: config.cuckoo_bump_depth_limit.max(1),
        }
    }

    /// Number of buckets in the currently active table.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.with_table(Table::capacity)
    }

    /// Number of rehashes performed so far. Monotone non-decreasing: a
    /// rollback (discarded candidate table during a rehash attempt)
    /// also advances this counter rather than only successful rehashes.
    #[must_use]
    pub fn rehash_count(&self) -> u32 {
        self.rehash_count.load(Ordering::Relaxed)
    }

    /// Spin until the table pointer is non-null, then run `f` against
    /// it. The pointer is only transiently null while a rehash is
    /// publishing its replacement (spec.md §3.2).
    fn with_table<R>(&self, f: impl FnOnce(&Table) -> R) -> R {
        loop {
            let ptr = self.table.load(Ordering::Acquire);
            if let Some(table) = unsafe { ptr.as_ref() } {
                return f(table);
            }
            std::hint::spin_loop();
        }
    }

    /// `get(k, absent)` — spec.md §4.2 "Read protocol".
    ///
    /// # Errors
    /// Returns [`Error::InvalidSentinel`] if `k` is the sentinel value.
    pub fn get(&self, k: i64, absent: i64) -> Result<i64> {
        check_not_sentinel(k)?;
        global_metrics().cuckoo_map.gets_total.inc();
        Ok(self.with_table(|table| {
            let (primary, secondary) = candidate_indices(k, table.capacity());
            read_bucket(table.bucket(primary), k)
                .or_else(|| read_bucket(table.bucket(secondary), k))
                .unwrap_or(absent)
        }))
    }

    #[must_use]
    pub fn contains_key(&self, k: i64) -> bool {
        self.get(k, SENTINEL).is_ok_and(|v| v != SENTINEL)
    }

    /// Linear scan over every live bucket; `O(capacity)`, per spec.md
    /// §4.2 ("value is a linear scan").
    #[must_use]
    pub fn contains_value(&self, v: i64) -> bool {
        if v == SENTINEL {
            return false;
        }
        self.with_table(|table| {
            table
                .iter()
                .any(|bucket| read_bucket_value(bucket) == Some(v))
        })
    }

    /// `put(k, v, absent)` — install `v` for `k`, returning the previous
    /// value or `absent` if there was none.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSentinel`] if `k` or `v` is the sentinel
    /// value.
    pub fn put(&self, k: i64, v: i64, absent: i64) -> Result<i64> {
        check_not_sentinel(k)?;
        check_not_sentinel(v)?;
        global_metrics().cuckoo_map.puts_total.inc();
        self.put_inner(k, v, absent, Overwrite::Always)
    }

    /// `put_if_absent(k, v, absent)` — install `v` for `k` only if `k`
    /// is not already present; returns the existing value (or `absent`)
    /// either way, never overwriting.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSentinel`] if `k` or `v` is the sentinel
    /// value.
    pub fn put_if_absent(&self, k: i64, v: i64, absent: i64) -> Result<i64> {
        check_not_sentinel(k)?;
        check_not_sentinel(v)?;
        global_metrics().cuckoo_map.puts_total.inc();
        self.put_inner(k, v, absent, Overwrite::IfAbsent)
    }

    /// `compute_if_absent(k, factory)` — if `k` is present, return its
    /// value; otherwise call `factory(k)` exactly once per successful
    /// installation, store and return the result (spec.md §4.2, §8.2
    /// property 3: "f invoked at most once per successful installation").
    ///
    /// Reserves `k`'s bucket (CAS `key` sentinel -> `k`, leaving `value`
    /// at sentinel so concurrent readers spin exactly as they already do
    /// for an in-flight claim) before calling `factory` at all. Racers
    /// that lose the reservation spin for the winner's value instead of
    /// ever invoking `factory` themselves.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSentinel`] if `k` is the sentinel value
    /// or `factory` returns the sentinel value.
    pub fn compute_if_absent(&self, k: i64, factory: impl FnOnce(i64) -> i64) -> Result<i64> {
        check_not_sentinel(k)?;
        global_metrics().cuckoo_map.gets_total.inc();

        let reservation = loop {
            let step = self.with_table(|table| {
                let capacity = table.capacity();
                let (primary, secondary) = candidate_indices(k, capacity);
                let (first, second) = if bump_source_is_primary(k, capacity) {
                    (primary, secondary)
                } else {
                    (secondary, primary)
                };
                for idx in [first, second] {
                    match try_reserve_or_read(table.bucket(idx), k) {
                        ReserveOutcome::Present(v) => return ReservationStep::Present(v),
                        ReserveOutcome::Reserved => {
                            let table_ptr = std::ptr::from_ref(table).cast_mut();
                            return ReservationStep::Reserved { table_ptr, index: idx };
                        }
                        ReserveOutcome::Foreign => continue,
                    }
                }
                // Both candidates busy with foreign keys: bump, same as
                // a plain put would.
                let (source, dest) = if bump_source_is_primary(k, capacity) {
                    (first, second)
                } else {
                    (second, first)
                };
                match bump(table, source, dest, 0, self.bump_depth_limit) {
                    BumpOutcome::Vacated | BumpOutcome::Contended => ReservationStep::Retry,
                    BumpOutcome::DepthExhausted => ReservationStep::NeedsRehash,
                }
            });
            match step {
                ReservationStep::Present(v) => break Reservation::Present(v),
                ReservationStep::Reserved { table_ptr, index } => {
                    break Reservation::Reserved { table_ptr, index };
                }
                ReservationStep::Retry => continue,
                ReservationStep::NeedsRehash => {
                    self.rehash(1)?;
                    continue;
                }
            }
        };

        match reservation {
            Reservation::Present(v) => Ok(v),
            Reservation::Reserved { table_ptr, index } => {
                let computed = factory(k);
                check_not_sentinel(computed)?;
                if self.table.load(Ordering::Acquire) == table_ptr {
                    // SAFETY: the pointer we reserved a bucket in is still
                    // the active table, so no rehash has swapped (and
                    // freed) it out from under us since.
                    let table = unsafe { &*table_ptr };
                    let bucket = table.bucket(index);
                    bucket.bump_revision();
                    bucket.store_value(computed);
                    global_metrics().cuckoo_map.puts_total.inc();
                    Ok(computed)
                } else {
                    // A rehash ran while `factory` was computing. Our
                    // reservation's value was still sentinel, so the
                    // rehasher's live-entry snapshot silently dropped it;
                    // reinsert through the normal path instead of calling
                    // `factory` again.
                    global_metrics().cuckoo_map.puts_total.inc();
                    let previous = self.put_inner(k, computed, SENTINEL, Overwrite::IfAbsent)?;
                    Ok(if previous == SENTINEL { computed } else { previous })
                }
            }
        }
    }

    /// `remove(k, absent)` — clear `k`'s bucket, returning its previous
    /// value or `absent`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSentinel`] if `k` is the sentinel value.
    pub fn remove(&self, k: i64, absent: i64) -> Result<i64> {
        check_not_sentinel(k)?;
        global_metrics().cuckoo_map.removes_total.inc();
        Ok(self.with_table(|table| {
            let (primary, secondary) = candidate_indices(k, table.capacity());
            for idx in [primary, secondary] {
                if let Some(removed) = try_remove(table.bucket(idx), k) {
                    return removed;
                }
            }
            absent
        }))
    }

    /// Best-effort clear: walks every bucket and removes whatever key it
    /// currently holds. Not atomic; concurrent mutators may leave
    /// residue (spec.md §4.2).
    pub fn clear(&self) {
        self.with_table(|table| {
            for bucket in table.iter() {
                loop {
                    let key = bucket.key(Ordering::Acquire);
                    if key == SENTINEL {
                        break;
                    }
                    if bucket.cas_value(bucket.value(Ordering::Acquire), SENTINEL).is_ok() {
                        bucket.bump_revision();
                        bucket.store_key(SENTINEL);
                        break;
                    }
                }
            }
        });
    }

    /// A best-effort cursor over the table this call observes. See
    /// [`MapCursor`] for its fuzziness guarantees.
    #[must_use]
    pub fn iterator(&self) -> MapCursor<'_> {
        MapCursor {
            map: self,
            index: 0,
        }
    }

    fn put_inner(&self, k: i64, v: i64, absent: i64, overwrite: Overwrite) -> Result<i64> {
        loop {
            let outcome = self.with_table(|table| {
                let capacity = table.capacity();
                let (primary, secondary) = candidate_indices(k, capacity);
                let (first, second) = if bump_source_is_primary(k, capacity) {
                    (primary, secondary)
                } else {
                    (secondary, primary)
                };
                for idx in [first, second] {
                    match try_claim_or_overwrite(table.bucket(idx), k, v, absent, overwrite) {
                        ClaimOutcome::Done(prev) => return PutOutcome::Done(prev),
                        ClaimOutcome::Foreign => continue,
                        ClaimOutcome::Retry => return PutOutcome::Retry,
                    }
                }
                // Both candidates busy with foreign keys: bump.
                let (source, dest) = if bump_source_is_primary(k, capacity) {
                    (first, second)
                } else {
                    (second, first)
                };
                match bump(table, source, dest, 0, self.bump_depth_limit) {
                    BumpOutcome::Vacated | BumpOutcome::Contended => PutOutcome::Retry,
                    BumpOutcome::DepthExhausted => PutOutcome::NeedsRehash,
                }
            });
            match outcome {
                PutOutcome::Done(prev) => return Ok(prev),
                PutOutcome::Retry => continue,
                PutOutcome::NeedsRehash => {
                    self.rehash(1)?;
                    continue;
                }
            }
        }
    }

    /// Trigger (or wait out) a rehash to a table with at least
    /// `extra_headroom` more buckets than strictly required.
    ///
    /// Implements spec.md §4.2's "Rehash" protocol literally: exactly one
    /// thread wins `CAS(table_pointer, old -> null)`; everyone else sees
    /// null via [`Self::with_table`] and busy-waits. The winner computes
    /// the replacement from the table it now exclusively owns (no other
    /// thread can dereference a null pointer), then publishes it with a
    /// plain store; on failure to find a viable capacity it restores the
    /// original pointer and reports [`Error::AllocationFailure`].
    fn rehash(&self, extra_headroom: usize) -> Result<()> {
        let current = loop {
            let observed = self.table.load(Ordering::Acquire);
            if observed.is_null() {
                // Another thread is already rehashing; wait for it to
                // publish and let the caller retry its own operation.
                self.with_table(|_| ());
                return Ok(());
            }
            if self
                .table
                .compare_exchange(
                    observed,
                    std::ptr::null_mut(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                break observed;
            }
        };

        // SAFETY: the pointer is now null, so every other thread is
        // spinning in `with_table` rather than dereferencing `current`;
        // we are the sole owner of this allocation until we either
        // restore it or publish a replacement.
        let old_table = unsafe { &*current };
        let live_entries: Vec<(i64, i64)> = old_table
            .iter()
            .filter_map(|b| read_bucket_pair(b))
            .collect();
        let minimum = live_entries
            .len()
            .saturating_mul(2)
            .saturating_add(1)
            .saturating_add(extra_headroom);
        let mut target_capacity =
            next_capacity_after(old_table.capacity()).unwrap_or(old_table.capacity());
        if target_capacity < minimum {
            target_capacity = minimum;
        }

        loop {
            let Some(candidate_capacity) = next_capacity_at_least(target_capacity) else {
                // Progression exhausted: restore the original table and
                // report failure, per spec.md §4.2/§7.
                self.table.store(current, Ordering::Release);
                self.rehash_count.fetch_add(1, Ordering::Relaxed);
                return Err(Error::AllocationFailure);
            };

            let new_table = Table::with_capacity(candidate_capacity);
            let mut ok = true;
            for &(k, v) in &live_entries {
                if !insert_during_rehash(&new_table, k, v, self.bump_depth_limit) {
                    ok = false;
                    break;
                }
            }

            self.rehash_count.fetch_add(1, Ordering::Relaxed);
            if ok {
                global_metrics()
                    .cuckoo_map
                    .table_capacity
                    .set(candidate_capacity as u64);
                global_metrics().cuckoo_map.rehashes_total.inc();
                trace!(capacity = candidate_capacity, "cuckoo map rehashed");
                self.table
                    .store(Box::into_raw(Box::new(new_table)), Ordering::Release);
                // SAFETY: the pointer was null while we owned `current`;
                // we have just published its replacement, so nothing can
                // still be reading through `current`.
                drop(unsafe { Box::from_raw(current) });
                return Ok(());
            }

            target_capacity = match next_capacity_after(candidate_capacity) {
                Some(cap) => cap,
                None => {
                    self.table.store(current, Ordering::Release);
                    self.rehash_count.fetch_add(1, Ordering::Relaxed);
                    return Err(Error::AllocationFailure);
                }
            };
        }
    }
}

#[derive(Clone, Copy)]
enum Overwrite {
    Always,
    IfAbsent,
}

enum PutOutcome {
    Done(i64),
    Retry,
    NeedsRehash,
}

enum ClaimOutcome {
    Done(i64),
    Foreign,
    Retry,
}

/// Try to install `(k, v)` into `bucket`, which is one of `k`'s two
/// candidates. Implements spec.md §4.2's "Write protocol" for a single
/// bucket: claim-if-empty, overwrite-if-same-key, or report foreign.
fn try_claim_or_overwrite(
    bucket: &Bucket,
    k: i64,
    v: i64,
    absent: i64,
    overwrite: Overwrite,
) -> ClaimOutcome {
    let observed_key = bucket.key(Ordering::Acquire);
    if observed_key == SENTINEL {
        if bucket.cas_key(SENTINEL, k).is_err() {
            return ClaimOutcome::Retry;
        }
        // Claimed the empty bucket. Only the claimant may now write
        // VALUE (spec.md §3.2 protocol invariant).
        bucket.bump_revision();
        bucket.store_value(v);
        return ClaimOutcome::Done(absent);
    }
    if observed_key != k {
        return ClaimOutcome::Foreign;
    }
    if matches!(overwrite, Overwrite::IfAbsent) {
        // The key already exists, so this is logically a read: report its
        // value without CASing VALUE to sentinel, which would otherwise
        // force concurrent readers to spin over a live entry for no
        // reason.
        return match read_bucket(bucket, k) {
            Some(existing) => ClaimOutcome::Done(existing),
            None => ClaimOutcome::Foreign, // vacated/relocated concurrently
        };
    }
    // Same-key bucket, unconditional overwrite: CAS VALUE away to
    // sentinel to claim it.
    loop {
        let old_value = bucket.value(Ordering::Acquire);
        if old_value == SENTINEL {
            // Mid-mutation by someone else; spin.
            std::hint::spin_loop();
            if bucket.key(Ordering::Acquire) != k {
                return ClaimOutcome::Foreign;
            }
            continue;
        }
        let revision_before = bucket.revision(Ordering::Acquire);
        if bucket.cas_value(old_value, SENTINEL).is_err() {
            continue;
        }
        if bucket.key(Ordering::Acquire) != k || bucket.revision(Ordering::Acquire) != revision_before {
            // Shouldn't happen under the single-claimant invariant, but
            // guard against it defensively by restoring.
            bucket.store_value(old_value);
            return ClaimOutcome::Retry;
        }
        bucket.bump_revision();
        bucket.store_value(v);
        return ClaimOutcome::Done(old_value);
    }
}

enum ReserveOutcome {
    Present(i64),
    Reserved,
    Foreign,
}

/// Reserve `bucket` for `k` without writing a value yet: CAS `key`
/// sentinel -> `k` and leave `value` at sentinel, which already looks to
/// concurrent readers exactly like an in-flight claim (spec.md §4.2's
/// write protocol). Used by `compute_if_absent` so only the bucket's
/// eventual winner ever runs the factory.
fn try_reserve_or_read(bucket: &Bucket, k: i64) -> ReserveOutcome {
    let observed_key = bucket.key(Ordering::Acquire);
    if observed_key == SENTINEL {
        if bucket.cas_key(SENTINEL, k).is_ok() {
            return ReserveOutcome::Reserved;
        }
        // Lost the claim race; whoever holds it now, read instead of
        // reserving ourselves.
        return match read_bucket(bucket, k) {
            Some(v) => ReserveOutcome::Present(v),
            None => ReserveOutcome::Foreign,
        };
    }
    if observed_key != k {
        return ReserveOutcome::Foreign;
    }
    match read_bucket(bucket, k) {
        Some(v) => ReserveOutcome::Present(v),
        None => ReserveOutcome::Foreign,
    }
}

enum ReservationStep {
    Present(i64),
    Reserved { table_ptr: *mut Table, index: usize },
    Retry,
    NeedsRehash,
}

enum Reservation {
    Present(i64),
    Reserved { table_ptr: *mut Table, index: usize },
}

fn try_remove(bucket: &Bucket, k: i64) -> Option<i64> {
    loop {
        let observed_key = bucket.key(Ordering::Acquire);
        if observed_key != k {
            return None;
        }
        let old_value = bucket.value(Ordering::Acquire);
        if old_value == SENTINEL {
            std::hint::spin_loop();
            continue;
        }
        let revision_before = bucket.revision(Ordering::Acquire);
        if bucket.cas_value(old_value, SENTINEL).is_err() {
            continue;
        }
        if bucket.key(Ordering::Acquire) != k || bucket.revision(Ordering::Acquire) != revision_before {
            bucket.store_value(old_value);
            continue;
        }
        bucket.bump_revision();
        bucket.store_key(SENTINEL);
        return Some(old_value);
    }
}

enum BumpOutcome {
    Vacated,
    /// A lost CAS against a sibling writer racing the same buckets:
    /// ordinary write-write contention, not a full table. Callers retry
    /// from scratch rather than growing the table.
    Contended,
    DepthExhausted,
}

/// Relocate bucket `source`'s contents to bucket `dest` (spec.md §4.2
/// "Relocation (bump) protocol"), recursing into `dest` if it too is
/// occupied by a foreign key, up to `depth_limit`.
fn bump(table: &Table, source: usize, dest: usize, depth: u32, depth_limit: u32) -> BumpOutcome {
    if depth >= depth_limit {
        return BumpOutcome::DepthExhausted;
    }
    let dest_bucket = table.bucket(dest);
    let dest_key = dest_bucket.key(Ordering::Acquire);
    if dest_key == SENTINEL {
        return relocate(table.bucket(source), dest_bucket);
    }
    // Destination occupied by a foreign key: recurse into its other
    // candidate before giving up on this chain.
    let source_bucket_key = table.bucket(source).key(Ordering::Acquire);
    if source_bucket_key == SENTINEL {
        // Source vacated concurrently (another writer got there first).
        return BumpOutcome::Vacated;
    }
    let (dest_primary, dest_secondary) = candidate_indices(dest_key, table.capacity());
    let dest_alt = if dest_primary == dest {
        dest_secondary
    } else {
        dest_primary
    };
    match bump(table, dest, dest_alt, depth + 1, depth_limit) {
        BumpOutcome::Vacated => bump(table, source, dest, depth, depth_limit),
        BumpOutcome::Contended => BumpOutcome::Contended,
        BumpOutcome::DepthExhausted => BumpOutcome::DepthExhausted,
    }
}

/// Move `source`'s current contents into `dest`, which has just been
/// observed empty. Spec.md §4.2's five-step relocation protocol.
fn relocate(source: &Bucket, dest: &Bucket) -> BumpOutcome {
    // Step 1: claim the destination as ours by staging the source key.
    let s_key = source.key(Ordering::Acquire);
    if s_key == SENTINEL {
        return BumpOutcome::Vacated;
    }
    if dest.cas_key(SENTINEL, s_key).is_err() {
        // Another writer claimed the destination first.
        return BumpOutcome::Contended;
    }

    // Step 2: read the source with the read protocol.
    let Some((s_revision, s_value)) = read_source_for_bump(source, s_key) else {
        dest.store_key(SENTINEL);
        return BumpOutcome::Vacated;
    };

    // Step 3: claim the source by CASing its value to sentinel.
    if source.cas_value(s_value, SENTINEL).is_err() {
        dest.store_key(SENTINEL);
        return BumpOutcome::Contended;
    }

    // Step 4: verify the source key/revision are unchanged; otherwise
    // roll back.
    if source.key(Ordering::Acquire) != s_key || source.revision(Ordering::Acquire) != s_revision {
        source.store_value(s_value);
        dest.store_key(SENTINEL);
        return BumpOutcome::Contended;
    }

    // Step 5: publish the destination, then vacate the source.
    dest.bump_revision();
    dest.store_value(s_value);
    source.bump_revision();
    source.store_key(SENTINEL);
    global_metrics().cuckoo_map.bumps_total.inc();
    BumpOutcome::Vacated
}

fn read_source_for_bump(source: &Bucket, expected_key: i64) -> Option<(u64, i64)> {
    loop {
        let r1 = source.revision(Ordering::Acquire);
        if source.key(Ordering::Acquire) != expected_key {
            return None;
        }
        let value = source.value(Ordering::Acquire);
        if value == SENTINEL {
            std::hint::spin_loop();
            continue;
        }
        let r2 = source.revision(Ordering::Acquire);
        if r1 != r2 {
            continue;
        }
        return Some((r1, value));
    }
}

/// Insert `(k, v)` into a brand-new table during rehash, where no other
/// thread can observe or mutate it yet — bumps here skip the concurrent
/// CAS dance and just move values directly (spec.md §4.2 "Rehash": "this
/// thread owns the world").
fn insert_during_rehash(table: &Table, k: i64, v: i64, depth_limit: u32) -> bool {
    let capacity = table.capacity();
    let (primary, secondary) = candidate_indices(k, capacity);
    for idx in [primary, secondary] {
        let bucket = table.bucket(idx);
        if bucket.key(Ordering::Relaxed) == SENTINEL {
            bucket.store_key(k);
            bucket.store_value(v);
            bucket.bump_revision();
            return true;
        }
    }
    rehash_bump(table, k, v, primary, 0, depth_limit)
}

fn rehash_bump(table: &Table, k: i64, v: i64, start: usize, depth: u32, depth_limit: u32) -> bool {
    if depth >= depth_limit {
        return false;
    }
    let bucket = table.bucket(start);
    let evicted_key = bucket.key(Ordering::Relaxed);
    let evicted_value = bucket.value(Ordering::Relaxed);
    bucket.store_key(k);
    bucket.store_value(v);
    bucket.bump_revision();

    let capacity = table.capacity();
    let (p, s) = candidate_indices(evicted_key, capacity);
    let alt = if p == start { s } else { p };
    let alt_bucket = table.bucket(alt);
    if alt_bucket.key(Ordering::Relaxed) == SENTINEL {
        alt_bucket.store_key(evicted_key);
        alt_bucket.store_value(evicted_value);
        alt_bucket.bump_revision();
        return true;
    }
    rehash_bump(table, evicted_key, evicted_value, alt, depth + 1, depth_limit)
}

/// Spec.md §4.2 "Read protocol", scoped to one candidate bucket.
/// Returns `None` if the bucket holds a different key (not mid-mutation
/// of `k`, just foreign — caller tries the other candidate).
fn read_bucket(bucket: &Bucket, k: i64) -> Option<i64> {
    loop {
        let r1 = bucket.revision(Ordering::Acquire);
        let observed_key = bucket.key(Ordering::Acquire);
        if observed_key != k {
            return None;
        }
        let value = bucket.value(Ordering::Acquire);
        if value == SENTINEL {
            std::hint::spin_loop();
            continue;
        }
        let r2 = bucket.revision(Ordering::Acquire);
        if r1 != r2 {
            continue;
        }
        return Some(value);
    }
}

/// Best-effort single read of whatever `(key, value)` a bucket currently
/// holds, used by `contains_value`, `clear`, and the iterator, which
/// accept staleness/duplication rather than retrying indefinitely.
fn read_bucket_value(bucket: &Bucket) -> Option<i64> {
    let key = bucket.key(Ordering::Acquire);
    if key == SENTINEL {
        return None;
    }
    let value = bucket.value(Ordering::Acquire);
    if value == SENTINEL {
        return None;
    }
    Some(value)
}

fn read_bucket_pair(bucket: &Bucket) -> Option<(i64, i64)> {
    let key = bucket.key(Ordering::Acquire);
    if key == SENTINEL {
        return None;
    }
    let value = bucket.value(Ordering::Acquire);
    if value == SENTINEL {
        return None;
    }
    Some((key, value))
}

fn check_not_sentinel(value: i64) -> Result<()> {
    if value == SENTINEL {
        Err(Error::InvalidSentinel)
    } else {
        Ok(())
    }
}

/// A pull-cursor over a [`CuckooMap`]'s table, advancing one bucket at a
/// time. Holds a reference to the table it was created against; if a
/// rehash publishes a new table afterward, the cursor keeps walking its
/// original one, so entries added after creation may be missed and
/// entries relocated mid-walk may be seen twice or not at all (spec.md
/// §4.2 "Iterator").
pub struct MapCursor<'a> {
    map: &'a CuckooMap,
    index: usize,
}

impl MapCursor<'_> {
    /// Advance to the next live bucket. Returns `false` once the table
    /// is exhausted.
    pub fn next(&mut self) -> bool {
        self.map.with_table(|table| {
            while self.index < table.capacity() {
                let bucket = table.bucket(self.index);
                self.index += 1;
                if read_bucket_pair(bucket).is_some() {
                    return true;
                }
            }
            false
        })
    }

    /// The key at the cursor's current position.
    ///
    /// # Panics
    /// Panics if called before a successful [`Self::next`] or after the
    /// bucket the cursor just visited has since been vacated (the
    /// fuzziness spec.md documents as a contract).
    #[must_use]
    pub fn key(&self) -> i64 {
        self.current_pair().0
    }

    /// The value at the cursor's current position. See [`Self::key`]
    /// for the same fuzziness caveat.
    #[must_use]
    pub fn value(&self) -> i64 {
        self.current_pair().1
    }

    fn current_pair(&self) -> (i64, i64) {
        assert!(self.index > 0, "MapCursor::key/value called before next()");
        self.map.with_table(|table| {
            read_bucket_pair(table.bucket(self.index - 1))
                .expect("cursor position vacated between next() and key()/value()")
        })
    }

    /// Remove the entry at the cursor's current position, per spec.md
    /// §4.2: "`remove` on the current entry issues `remove(key)` on the
    /// map."
    pub fn remove(&mut self) {
        let key = self.key();
        let _ = self.map.remove(key, SENTINEL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_threaded_put_get_remove_roundtrips() {
        let map = CuckooMap::new(16);
        for k in 0..200i64 {
            assert_eq!(map.put(k, -k, SENTINEL).unwrap(), SENTINEL);
        }
        for k in 0..200i64 {
            assert_eq!(map.get(k, SENTINEL).unwrap(), -k);
        }
        for k in 0..200i64 {
            assert_eq!(map.remove(k, SENTINEL).unwrap(), -k);
        }
        for k in 0..200i64 {
            assert_eq!(map.get(k, SENTINEL).unwrap(), SENTINEL);
        }
    }

    #[test]
    fn put_returns_previous_value() {
        let map = CuckooMap::new(8);
        assert_eq!(map.put(1, 100, -1).unwrap(), -1);
        assert_eq!(map.put(1, 200, -1).unwrap(), 100);
        assert_eq!(map.get(1, -1).unwrap(), 200);
    }

    #[test]
    fn put_if_absent_never_overwrites() {
        let map = CuckooMap::new(8);
        assert_eq!(map.put_if_absent(1, 100, -1).unwrap(), -1);
        assert_eq!(map.put_if_absent(1, 200, -1).unwrap(), 100);
        assert_eq!(map.get(1, -1).unwrap(), 100);
    }

    #[test]
    fn compute_if_absent_installs_once() {
        let map = CuckooMap::new(8);
        let mut calls = 0;
        let v = map
            .compute_if_absent(42, |_| {
                calls += 1;
                7
            })
            .unwrap();
        assert_eq!(v, 7);
        assert_eq!(calls, 1);
        let v2 = map
            .compute_if_absent(42, |_| {
                calls += 1;
                99
            })
            .unwrap();
        assert_eq!(v2, 7);
        assert_eq!(calls, 1);
    }

    #[test]
    fn sentinel_key_is_invalid_argument() {
        let map = CuckooMap::new(8);
        assert_eq!(map.get(SENTINEL, 0).unwrap_err(), Error::InvalidSentinel);
        assert_eq!(map.put(SENTINEL, 1, 0).unwrap_err(), Error::InvalidSentinel);
    }

    #[test]
    fn sentinel_value_is_invalid_argument() {
        let map = CuckooMap::new(8);
        assert_eq!(map.put(1, SENTINEL, 0).unwrap_err(), Error::InvalidSentinel);
    }

    #[test]
    fn compute_if_absent_factory_returning_sentinel_is_invalid() {
        let map = CuckooMap::new(8);
        assert_eq!(
            map.compute_if_absent(1, |_| SENTINEL).unwrap_err(),
            Error::InvalidSentinel
        );
    }

    #[test]
    fn contains_key_and_value() {
        let map = CuckooMap::new(8);
        map.put(5, 500, -1).unwrap();
        assert!(map.contains_key(5));
        assert!(!map.contains_key(6));
        assert!(map.contains_value(500));
        assert!(!map.contains_value(999));
    }

    #[test]
    fn clear_removes_everything_single_threaded() {
        let map = CuckooMap::new(32);
        for k in 0..50i64 {
            map.put(k, k * 2, -1).unwrap();
        }
        map.clear();
        for k in 0..50i64 {
            assert!(!map.contains_key(k));
        }
    }

    #[test]
    fn iterator_yields_all_surviving_pairs() {
        let map = CuckooMap::new(64);
        for k in 1..=1000i64 {
            map.put(k, -k, i64::MIN + 1).unwrap();
        }
        for k in 1..=500i64 {
            map.remove(k, i64::MIN + 1).unwrap();
        }
        let mut seen = std::collections::HashSet::new();
        let mut cursor = map.iterator();
        while cursor.next() {
            seen.insert((cursor.key(), cursor.value()));
        }
        for k in 501..=1000i64 {
            assert!(seen.contains(&(k, -k)), "missing {k}");
        }
        for k in 1..=500i64 {
            assert!(!seen.iter().any(|(kk, _)| *kk == k), "stale {k}");
        }
    }

    #[test]
    fn rehash_triggers_when_table_fills_up() {
        let map = CuckooMap::new(2);
        for k in [0i64, 509, 1018, 1527, 2036] {
            map.put(k, -k, i64::MIN + 1).unwrap();
        }
        for k in [0i64, 509, 1018, 1527, 2036] {
            assert_eq!(map.get(k, i64::MIN + 1).unwrap(), -k);
        }
    }

    #[test]
    fn rehash_count_is_stable_after_quiescence() {
        let map = CuckooMap::new(4);
        for k in 0..100i64 {
            map.put(k, -k, i64::MIN + 1).unwrap();
        }
        let count_after = map.rehash_count();
        for k in 0..100i64 {
            assert_eq!(map.get(k, i64::MIN + 1).unwrap(), -k);
        }
        assert_eq!(map.rehash_count(), count_after);
    }

    #[test]
    fn concurrent_puts_and_gets_on_disjoint_keys() {
        use std::sync::Arc;
        let map = Arc::new(CuckooMap::new(64));
        let mut handles = Vec::new();
        for t in 0..8i64 {
            let map = map.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..200i64 {
                    let k = t * 1000 + i;
                    map.put(k, -k, i64::MIN + 1).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        for t in 0..8i64 {
            for i in 0..200i64 {
                let k = t * 1000 + i;
                assert_eq!(map.get(k, i64::MIN + 1).unwrap(), -k);
            }
        }
    }

    #[test]
    fn concurrent_put_swap_on_same_key_never_yields_sentinel_or_foreign_value() {
        use std::sync::Arc;
        let map = Arc::new(CuckooMap::new(8));
        map.put(1, 0, i64::MIN + 1).unwrap();
        let m1 = map.clone();
        let h1 = std::thread::spawn(move || {
            for _ in 0..5000 {
                m1.put(1, 111, i64::MIN + 1).unwrap();
            }
        });
        let m2 = map.clone();
        let h2 = std::thread::spawn(move || {
            for _ in 0..5000 {
                m2.put(1, 222, i64::MIN + 1).unwrap();
            }
        });
        h1.join().unwrap();
        h2.join().unwrap();
        let v = map.get(1, i64::MIN + 1).unwrap();
        assert!(v == 111 || v == 222, "got {v}");
    }

    #[test]
    fn capacity_reflects_progression() {
        let map = CuckooMap::new(2);
        assert!(map.capacity() >= 5);
    }
}
