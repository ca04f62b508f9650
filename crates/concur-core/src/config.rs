//! Runtime configuration, loaded from environment variables.
//!
//! Deadlock detection itself is always on and unconfigurable (spec
//! invariant, not a knob). What is configurable is the handful of
//! tuning parameters both components expose: how much slack a timed
//! acquire is allowed past its nominal deadline, how deep a cuckoo bump
//! chain may go before giving up and rehashing, how much headroom a
//! rehash requests over the minimum needed capacity, and the log level.

use crate::error::{Error, Result};

/// Tuning knobs shared by `concur-lock-manager` and `concur-cuckoo-map`.
///
/// Constructed once at process startup via [`Config::from_env`] and
/// passed by reference (or cloned, it's cheap) into `LockManager::new`
/// and `CuckooMap::new`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Multiple of the requested `try_acquire_for` duration the
    /// implementation is allowed to overrun by while finishing a
    /// pending deadlock walk. Default: 10 (so a 50ms request may run up
    /// to 500ms).
    pub try_acquire_overrun_factor: u32,

    /// Maximum bump-chain depth before a cuckoo `put` gives up and
    /// triggers a rehash. Default: 64.
    pub cuckoo_bump_depth_limit: u32,

    /// Extra capacity (beyond the minimum the rehashing thread
    /// computes it needs) requested when allocating the next table.
    /// Default: 0 (use the next prime in the progression as-is).
    pub cuckoo_rehash_headroom: usize,

    /// Default log verbosity for newly created `NamedLock`s and for the
    /// manager's own diagnostic log lines. Default: `LogLevel::Warn`.
    pub default_log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            try_acquire_overrun_factor: 10,
            cuckoo_bump_depth_limit: 64,
            cuckoo_rehash_headroom: 0,
            default_log_level: LogLevel::Warn,
        }
    }
}

impl Config {
    /// Build a [`Config`] from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// Recognised variables: `CONCUR_TRY_ACQUIRE_OVERRUN_FACTOR`,
    /// `CONCUR_BUMP_DEPTH_LIMIT`, `CONCUR_REHASH_HEADROOM`,
    /// `CONCUR_LOG_LEVEL`.
    ///
    /// # Errors
    /// Returns `Err` if a recognised variable is set but cannot be
    /// parsed into its expected type.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            try_acquire_overrun_factor: parse_env_or(
                "CONCUR_TRY_ACQUIRE_OVERRUN_FACTOR",
                defaults.try_acquire_overrun_factor,
            )?,
            cuckoo_bump_depth_limit: parse_env_or(
                "CONCUR_BUMP_DEPTH_LIMIT",
                defaults.cuckoo_bump_depth_limit,
            )?,
            cuckoo_rehash_headroom: parse_env_or(
                "CONCUR_REHASH_HEADROOM",
                defaults.cuckoo_rehash_headroom,
            )?,
            default_log_level: match std::env::var("CONCUR_LOG_LEVEL") {
                Ok(raw) => raw.parse()?,
                Err(_) => defaults.default_log_level,
            },
        })
    }
}

fn parse_env_or<T>(key: &'static str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| Error::InvalidConfig {
            key,
            reason: format!("could not parse {raw:?}"),
        }),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(std::env::VarError::NotUnicode(_)) => Err(Error::InvalidEnvEncoding(key)),
    }
}

/// Log verbosity, mirroring spec.md's "off/warn/debug/trace" levels for
/// a `NamedLock` or the manager as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Off,
    #[default]
    Warn,
    Debug,
    Trace,
}

impl std::str::FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "warn" => Ok(Self::Warn),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(Error::InvalidConfig {
                key: "CONCUR_LOG_LEVEL",
                reason: format!("unknown level {other:?}, expected off|warn|debug|trace"),
            }),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Off => "off",
            Self::Warn => "warn",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(s)
    }
}
