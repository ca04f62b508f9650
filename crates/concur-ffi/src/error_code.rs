//! A flat, C-like error enum mirroring spec.md §6.1's error-code list,
//! for embedders that would rather match on an integer-backed enum than
//! a Rust `enum Error` with associated data.

/// Everything a [`crate::Manager`], [`crate::Handle`], [`crate::Map`], or
/// [`crate::Cursor`] call can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Acquiring this lock would complete a deadlock cycle.
    Deadlock,
    /// A blocking or timed acquire ran out of time.
    AcquireFailed,
    /// `release` was called for a mode the current thread does not hold.
    NotHeld,
    /// A restore would require acquiring rather than only releasing.
    IllegalRestore,
    /// A blocking wait was interrupted.
    Interrupted,
    /// The map's reserved sentinel value was used as a key or stored value.
    InvalidSentinel,
    /// A rehash could not allocate its replacement table.
    AllocationFailure,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Deadlock => "DEADLOCK",
            Self::AcquireFailed => "ACQUIRE_FAILED",
            Self::NotHeld => "NOT_HELD",
            Self::IllegalRestore => "ILLEGAL_RESTORE",
            Self::Interrupted => "INTERRUPTED",
            Self::InvalidSentinel => "INVALID_SENTINEL",
            Self::AllocationFailure => "ALLOCATION_FAILURE",
        };
        f.write_str(s)
    }
}

impl std::error::Error for ErrorCode {}

impl From<concur_lock_manager::Error> for ErrorCode {
    fn from(err: concur_lock_manager::Error) -> Self {
        match err {
            concur_lock_manager::Error::Deadlock => Self::Deadlock,
            concur_lock_manager::Error::AcquireTimeout => Self::AcquireFailed,
            concur_lock_manager::Error::NotHeld => Self::NotHeld,
            concur_lock_manager::Error::IllegalRestore => Self::IllegalRestore,
            concur_lock_manager::Error::Interrupted => Self::Interrupted,
        }
    }
}

impl From<concur_cuckoo_map::Error> for ErrorCode {
    fn from(err: concur_cuckoo_map::Error) -> Self {
        match err {
            concur_cuckoo_map::Error::InvalidSentinel => Self::InvalidSentinel,
            concur_cuckoo_map::Error::AllocationFailure => Self::AllocationFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_manager_errors_map_to_expected_codes() {
        assert_eq!(
            ErrorCode::from(concur_lock_manager::Error::Deadlock),
            ErrorCode::Deadlock
        );
        assert_eq!(
            ErrorCode::from(concur_lock_manager::Error::AcquireTimeout),
            ErrorCode::AcquireFailed
        );
    }

    #[test]
    fn cuckoo_map_errors_map_to_expected_codes() {
        assert_eq!(
            ErrorCode::from(concur_cuckoo_map::Error::InvalidSentinel),
            ErrorCode::InvalidSentinel
        );
        assert_eq!(
            ErrorCode::from(concur_cuckoo_map::Error::AllocationFailure),
            ErrorCode::AllocationFailure
        );
    }

    #[test]
    fn display_matches_screaming_snake_names() {
        assert_eq!(ErrorCode::Deadlock.to_string(), "DEADLOCK");
        assert_eq!(ErrorCode::AcquireFailed.to_string(), "ACQUIRE_FAILED");
    }
}
