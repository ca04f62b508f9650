//! Ambient types shared by `concur-lock-manager` and `concur-cuckoo-map`:
//! configuration, error plumbing for the ambient layer, string interning,
//! lock-free metrics primitives, `tracing` setup, and deterministic test
//! randomness.
//!
//! Neither component's core algorithm lives here. This crate only carries
//! the engineering both components sit on top of.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod intern;
pub mod metrics;
pub mod setup;
pub mod test_harness;

pub use config::{Config, LogLevel};
pub use error::{Error, Result};
pub use intern::{InternedStr, intern, intern_count, pre_intern, pre_intern_policies};
pub use metrics::{
    Counter, CuckooMetrics, CuckooMetricsSnapshot, GaugeI64, GaugeU64, GlobalMetrics,
    GlobalMetricsSnapshot, HistogramSnapshot, Log2Histogram, LockMetrics, LockMetricsSnapshot,
    global_metrics,
};
pub use setup::init_tracing;
pub use test_harness::{Rng64, seed_from_env};
