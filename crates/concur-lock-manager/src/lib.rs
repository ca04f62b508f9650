//! Named, reentrant shared/exclusive locks with online deadlock
//! detection, per-thread snapshot/restore, and timed try-acquire.
//!
//! A [`LockManager`] issues [`LockHandle`]s bound to a name and a
//! [`LockMode`]. Acquisitions that cannot be granted immediately run a
//! graph walk over the implicit waits-for graph (locks carry who holds
//! them, threads carry what they're waiting on) before blocking, so a
//! cyclic wait fails fast with [`Error::Deadlock`] instead of hanging.
//!
//! ```
//! use concur_lock_manager::LockManager;
//!
//! let manager = LockManager::new();
//! let handle = manager.exclusive("example");
//! handle.acquire().unwrap();
//! assert!(handle.is_held_by_current_thread());
//! handle.release().unwrap();
//! ```

#![forbid(unsafe_code)]

mod error;
mod manager;
mod named_lock;

pub use error::{Error, Result};
pub use manager::{LockHandle, LockManager};
pub use named_lock::{HoldCounts, LockMode, ThreadLockState};
