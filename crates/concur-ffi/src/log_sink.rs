//! Logging sink seam (spec.md §6.3): callers that don't want `tracing`
//! directly can register their own [`LogSink`] to receive level-tagged
//! lines instead.

use std::sync::{OnceLock, RwLock};

use concur_core::LogLevel;

/// A callback sink for level-tagged log lines, mirroring spec.md §6.3's
/// `fn(Level, &str)` framing.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// The default sink: forwards into `tracing`, so registering nothing
/// leaves behaviour identical to the rest of the workspace.
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Off => {}
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Trace => tracing::trace!("{message}"),
        }
    }
}

static REGISTERED_SINK: OnceLock<RwLock<Box<dyn LogSink>>> = OnceLock::new();

/// Replace the process-wide log sink. Later calls overwrite earlier
/// ones; unset defaults to [`TracingLogSink`].
pub fn register_log_sink(sink: Box<dyn LogSink>) {
    let cell = REGISTERED_SINK.get_or_init(|| RwLock::new(Box::new(TracingLogSink)));
    *cell.write().expect("log sink lock poisoned") = sink;
}

/// Dispatch a line through whichever sink is currently registered.
pub(crate) fn dispatch(level: LogLevel, message: &str) {
    let cell = REGISTERED_SINK.get_or_init(|| RwLock::new(Box::new(TracingLogSink)));
    cell.read().expect("log sink lock poisoned").log(level, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static CAPTURED: Mutex<Vec<String>> = Mutex::new(Vec::new());

    struct CapturingSink;
    impl LogSink for CapturingSink {
        fn log(&self, _level: LogLevel, message: &str) {
            CAPTURED.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn registered_sink_receives_dispatched_lines() {
        register_log_sink(Box::new(CapturingSink));
        dispatch(LogLevel::Warn, "hello from test");
        assert!(
            CAPTURED
                .lock()
                .unwrap()
                .iter()
                .any(|line| line == "hello from test")
        );
        // Restore the default so other tests in this process aren't affected.
        register_log_sink(Box::new(TracingLogSink));
    }
}
