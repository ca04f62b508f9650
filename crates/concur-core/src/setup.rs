//! Process-wide `tracing` initialization.
//!
//! Every binary in this workspace (`concur-cli`, the conformance suite)
//! calls [`init_tracing`] exactly once at startup. Library crates never
//! install a subscriber themselves; they only emit events.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a `tracing-subscriber` `fmt` subscriber driven by the
/// `RUST_LOG` environment variable, defaulting to `warn` when unset.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
