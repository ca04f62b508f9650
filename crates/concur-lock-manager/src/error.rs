//! Failure taxonomy for [`crate::LockManager`] operations.

use thiserror::Error;

/// Result type alias for lock-manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong acquiring, releasing, or snapshotting a
/// [`crate::LockManager`]'s locks.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested acquisition would complete a cycle in the waits-for
    /// graph (or is a forbidden shared-to-exclusive self-upgrade).
    #[error("acquiring this lock would deadlock")]
    Deadlock,

    /// `try_acquire_for` ran out of its allotted time without acquiring
    /// the lock.
    #[error("acquire timed out")]
    AcquireTimeout,

    /// `release` was called for a mode the current thread does not
    /// hold. Always a programming error; never retried.
    #[error("current thread does not hold this lock in the requested mode")]
    NotHeld,

    /// `restore_lock_state` was given a snapshot that would require
    /// acquiring a lock rather than only releasing. Restoration is
    /// strictly a release-only operation.
    #[error("restoring this snapshot would require acquiring a lock")]
    IllegalRestore,

    /// A blocking wait was interrupted before the lock was acquired.
    /// Only surfaced from `try_acquire_for`; `acquire` swallows and
    /// retries instead.
    #[error("wait was interrupted before the lock was acquired")]
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_distinct_message() {
        let messages: Vec<String> = [
            Error::Deadlock,
            Error::AcquireTimeout,
            Error::NotHeld,
            Error::IllegalRestore,
            Error::Interrupted,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        let unique: std::collections::HashSet<_> = messages.iter().collect();
        assert_eq!(unique.len(), messages.len());
    }
}
