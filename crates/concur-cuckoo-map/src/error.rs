//! Failure taxonomy for [`crate::CuckooMap`] operations.

use thiserror::Error;

/// Result type alias for cuckoo-map operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The sentinel value was passed as a key, a `put` value, or
    /// returned from a `compute_if_absent` factory. The sentinel is
    /// reserved to mean "absent" and can never be stored.
    #[error("the sentinel value cannot be used as a key or stored value")]
    InvalidSentinel,

    /// A rehash could not allocate its replacement table. The prior
    /// table is preserved and the map continues to operate at its old
    /// capacity.
    #[error("allocation failure during rehash; prior table preserved")]
    AllocationFailure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_distinct() {
        assert_ne!(
            Error::InvalidSentinel.to_string(),
            Error::AllocationFailure.to_string()
        );
    }
}
