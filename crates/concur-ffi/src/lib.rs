//! Non-generic, panic-free binding layer over [`concur_lock_manager`] and
//! [`concur_cuckoo_map`].
//!
//! This crate adds no new logic: it's a thin `From`/`Into` translation at
//! the boundary, for embedders that want a C-ABI-shaped or scripting-host
//! surface rather than Rust generics and enums. Every public function
//! here returns `Result<_, ErrorCode>` and never panics on
//! caller-supplied input.

mod error_code;
mod lock;
mod log_sink;
mod map;
mod stubs;

pub use error_code::ErrorCode;
pub use lock::{Handle, LockModeCode, Manager};
pub use log_sink::{LogSink, TracingLogSink, register_log_sink};
pub use map::{Cursor, Map};
pub use stubs::{CubeProjection, RemoteEndpoint, WireCodec};
