//! Ambient error type for `concur-core` itself.
//!
//! The two component crates (`concur-lock-manager`, `concur-cuckoo-map`)
//! each define their own focused error enum matching their own failure
//! taxonomy one-for-one, rather than sharing this type — a `Deadlock` and
//! an `InvalidSentinel` have nothing to do with each other and forcing
//! call sites to match a combined enum would just add dead arms. This
//! type exists only for the ambient concerns that live in this crate:
//! configuration parsing and environment loading.

use thiserror::Error;

/// Result type alias for `concur-core` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by `concur-core`'s ambient layer (config, env parsing).
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    #[error("environment variable {0} is not valid unicode")]
    InvalidEnvEncoding(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_informative() {
        let err = Error::InvalidConfig {
            key: "CONCUR_BUMP_DEPTH",
            reason: "must be a positive integer".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid configuration value for CONCUR_BUMP_DEPTH: must be a positive integer"
        );
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::other("disk full");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
