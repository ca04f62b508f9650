//! A lock-free `i64 -> i64` map using cuckoo hashing, allowing concurrent
//! readers and writers without a mutex.
//!
//! [`CuckooMap`] addresses each key to two candidate buckets (spec.md
//! §4.2); `get` uses a revision-guarded sequence-lock read, `put` claims a
//! bucket via CAS and relocates ("bumps") occupants when both candidates
//! are full, and a bump that exceeds its depth limit triggers a full
//! rehash to a larger table.
//!
//! ```
//! use concur_cuckoo_map::CuckooMap;
//!
//! let map = CuckooMap::new(16);
//! const ABSENT: i64 = i64::MIN + 1; // any value other than the sentinel
//! map.put(1, 100, ABSENT).unwrap();
//! assert_eq!(map.get(1, ABSENT).unwrap(), 100);
//! ```

mod addressing;
mod error;
mod map;
mod table;

pub use addressing::SENTINEL;
pub use error::{Error, Result};
pub use map::{CuckooMap, MapCursor};
