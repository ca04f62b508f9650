//! `Map`/`Cursor`: an owned, non-generic wrapper over
//! [`concur_cuckoo_map::CuckooMap`]/`MapCursor`.

use std::sync::Arc;

use concur_core::Config;
use concur_cuckoo_map::{CuckooMap, SENTINEL};

use crate::error_code::ErrorCode;

/// An owned, shareable handle to a [`CuckooMap`]. Cheap to clone; clones
/// share the same underlying map.
#[derive(Clone)]
pub struct Map {
    inner: Arc<CuckooMap>,
}

impl Map {
    #[must_use]
    pub fn new(initial_capacity_hint: usize) -> Self {
        Self {
            inner: Arc::new(CuckooMap::new(initial_capacity_hint)),
        }
    }

    #[must_use]
    pub fn with_config(initial_capacity_hint: usize, config: &Config) -> Self {
        Self {
            inner: Arc::new(CuckooMap::with_config(initial_capacity_hint, config)),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    #[must_use]
    pub fn rehash_count(&self) -> u32 {
        self.inner.rehash_count()
    }

    pub fn get(&self, k: i64) -> Result<i64, ErrorCode> {
        self.inner.get(k, SENTINEL).map_err(ErrorCode::from)
    }

    #[must_use]
    pub fn contains_key(&self, k: i64) -> bool {
        self.inner.contains_key(k)
    }

    #[must_use]
    pub fn contains_value(&self, v: i64) -> bool {
        self.inner.contains_value(v)
    }

    pub fn put(&self, k: i64, v: i64) -> Result<i64, ErrorCode> {
        self.inner.put(k, v, SENTINEL).map_err(ErrorCode::from)
    }

    pub fn put_if_absent(&self, k: i64, v: i64) -> Result<i64, ErrorCode> {
        self.inner
            .put_if_absent(k, v, SENTINEL)
            .map_err(ErrorCode::from)
    }

    pub fn compute_if_absent(
        &self,
        k: i64,
        factory: impl FnOnce(i64) -> i64,
    ) -> Result<i64, ErrorCode> {
        self.inner
            .compute_if_absent(k, factory)
            .map_err(ErrorCode::from)
    }

    pub fn remove(&self, k: i64) -> Result<i64, ErrorCode> {
        self.inner.remove(k, SENTINEL).map_err(ErrorCode::from)
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    /// A snapshot cursor over the pairs observable at the moment this is
    /// called (spec.md's "a pair may be missed or duplicated if its key
    /// moves during iteration" fuzziness applies here too, folded into a
    /// single eager scan rather than `CuckooMap::MapCursor`'s live,
    /// bucket-at-a-time walk — this crate's boundary has no lifetime to
    /// tie a borrowed cursor to, so it trades liveness for an owned,
    /// `'static` `Cursor`).
    #[must_use]
    pub fn iterator(&self) -> Cursor {
        let mut pairs = Vec::new();
        let mut live = self.inner.iterator();
        while live.next() {
            pairs.push((live.key(), live.value()));
        }
        Cursor {
            map: self.inner.clone(),
            pairs,
            position: 0,
        }
    }
}

/// An owned snapshot cursor returned by [`Map::iterator`].
pub struct Cursor {
    map: Arc<CuckooMap>,
    pairs: Vec<(i64, i64)>,
    position: usize,
}

impl Cursor {
    /// Advance to the next pair. Returns `false` once exhausted.
    pub fn next(&mut self) -> bool {
        if self.position >= self.pairs.len() {
            return false;
        }
        self.position += 1;
        true
    }

    /// # Panics
    /// Panics if called before the first `next()` or after exhaustion.
    #[must_use]
    pub fn key(&self) -> i64 {
        self.pairs[self.position - 1].0
    }

    /// # Panics
    /// Panics if called before the first `next()` or after exhaustion.
    #[must_use]
    pub fn value(&self) -> i64 {
        self.pairs[self.position - 1].1
    }

    /// Remove the current pair's key from the live map (not just this
    /// snapshot).
    pub fn remove(&self) -> Result<i64, ErrorCode> {
        let key = self.key();
        self.map.remove(key, SENTINEL).map_err(ErrorCode::from)
    }
}
