//! Bucket and table layout for the lock-free cuckoo map.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::addressing::SENTINEL;

/// One slot: a key, a value, and a revision counter bumped by every
/// successful write. Readers snapshot the revision before and after
/// reading key and value; a mismatch, or an observed sentinel value
/// mid-read, means a concurrent writer interleaved and the caller
/// retries (sequence-lock protocol, spec.md §4.2 "Read protocol").
///
/// There is no separate lock flag: a writer claims a bucket by CASing
/// KEY or VALUE directly, exactly as spec.md's write protocol
/// describes, and the bucket looks "mid-mutation" to readers purely
/// through those CASed sentinel states.
pub struct Bucket {
    key: AtomicI64,
    value: AtomicI64,
    revision: AtomicU64,
}

impl Bucket {
    fn empty() -> Self {
        Self {
            key: AtomicI64::new(SENTINEL),
            value: AtomicI64::new(SENTINEL),
            revision: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn key(&self, order: Ordering) -> i64 {
        self.key.load(order)
    }

    #[inline]
    pub fn value(&self, order: Ordering) -> i64 {
        self.value.load(order)
    }

    #[inline]
    pub fn revision(&self, order: Ordering) -> u64 {
        self.revision.load(order)
    }

    #[inline]
    pub fn cas_key(&self, current: i64, new: i64) -> std::result::Result<i64, i64> {
        self.key
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }

    #[inline]
    pub fn cas_value(&self, current: i64, new: i64) -> std::result::Result<i64, i64> {
        self.value
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }

    #[inline]
    pub fn store_key(&self, v: i64) {
        self.key.store(v, Ordering::Release);
    }

    #[inline]
    pub fn store_value(&self, v: i64) {
        self.value.store(v, Ordering::Release);
    }

    /// Advance the revision by one, returning the value observed before
    /// the bump. Called once per successful write or relocation so
    /// concurrent readers can detect the interleaving.
    #[inline]
    pub fn bump_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::AcqRel)
    }
}

/// A fixed-capacity array of buckets. Never resized in place; growth
/// always replaces the whole table (see `CuckooMap::rehash`).
pub struct Table {
    buckets: Box<[Bucket]>,
    capacity: usize,
}

impl Table {
    pub fn with_capacity(capacity: usize) -> Self {
        let buckets = (0..capacity).map(|_| Bucket::empty()).collect();
        Self { buckets, capacity }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn bucket(&self, index: usize) -> &Bucket {
        &self.buckets[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter()
    }
}
