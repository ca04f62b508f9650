//! Loom model check of the bucket claim/read protocol on a reduced,
//! single-bucket model.
//!
//! `CuckooMap` itself is too large a state space for exhaustive loom
//! exploration (multiple buckets, bump chains, rehash). This model
//! instead exercises the one invariant spec.md's read protocol exists
//! to guarantee: a reader using the revision-guarded retry loop never
//! observes a torn (key, value) pair, even when a writer claims the
//! bucket and a second writer overwrites its value concurrently.
//!
//! Run with: `cargo test --features loom-tests --test loom_bucket_protocol`

#![cfg(feature = "loom-tests")]

use loom::sync::Arc;
use loom::sync::atomic::{AtomicI64, AtomicU64, Ordering};

const SENTINEL: i64 = i64::MIN;

struct Bucket {
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
}

/// Mirrors `CuckooMap::read_bucket`'s sequence-lock retry loop.
fn read(bucket: &Bucket, want_key: i64) -> Option<i64> {
    loop {
        let before = bucket.revision.load(Ordering::Acquire);
        let k = bucket.key.load(Ordering::Acquire);
        let v = bucket.value.load(Ordering::Acquire);
        let after = bucket.revision.load(Ordering::Acquire);
        if before != after {
            continue;
        }
        if k != want_key {
            return None;
        }
        if v == SENTINEL {
            continue;
        }
        return Some(v);
    }
}

#[test]
fn reader_never_observes_torn_write() {
    loom::model(|| {
        let bucket = Arc::new(Bucket::empty());

        let writer = {
            let bucket = bucket.clone();
            loom::thread::spawn(move || {
                bucket
                    .key
                    .compare_exchange(SENTINEL, 1, Ordering::AcqRel, Ordering::Acquire)
                    .unwrap();
                bucket.value.store(100, Ordering::Release);
                bucket.revision.fetch_add(1, Ordering::AcqRel);
            })
        };

        let observed = read(&bucket, 1);

        writer.join().unwrap();

        // Either the reader saw nothing (key not yet claimed, or claimed
        // but not yet revision-bumped so it retried until the writer
        // finished) or it saw the fully-written value. It must never see
        // a half-written state.
        if let Some(v) = observed {
            assert_eq!(v, 100);
        }
    });
}

#[test]
fn second_writer_overwrite_is_seen_whole_or_not_at_all() {
    loom::model(|| {
        let bucket = Arc::new(Bucket::empty());
        bucket
            .key
            .compare_exchange(SENTINEL, 1, Ordering::AcqRel, Ordering::Acquire)
            .unwrap();
        bucket.value.store(100, Ordering::Release);
        bucket.revision.fetch_add(1, Ordering::AcqRel);

        let writer = {
            let bucket = bucket.clone();
            loom::thread::spawn(move || {
                bucket.value.store(200, Ordering::Release);
                bucket.revision.fetch_add(1, Ordering::AcqRel);
            })
        };

        let observed = read(&bucket, 1);

        writer.join().unwrap();

        assert!(observed == Some(100) || observed == Some(200));
    });
}
