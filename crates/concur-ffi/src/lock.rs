//! `Manager`/`Handle`: an owned, non-generic wrapper over
//! [`concur_lock_manager::LockManager`]/`LockHandle` for embedders that
//! don't want Rust lifetimes at their boundary.

use std::sync::Arc;
use std::time::Duration;

use concur_core::{Config, LogLevel};
use concur_lock_manager::LockManager;

use crate::error_code::ErrorCode;
use crate::log_sink::dispatch;

/// Mirrors [`concur_lock_manager::LockMode`] without exposing the inner
/// crate's type at this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockModeCode {
    Shared,
    Exclusive,
}

impl From<LockModeCode> for concur_lock_manager::LockMode {
    fn from(mode: LockModeCode) -> Self {
        match mode {
            LockModeCode::Shared => Self::Shared,
            LockModeCode::Exclusive => Self::Exclusive,
        }
    }
}

/// An owned lock registry. Cheap to clone (wraps an `Arc`); clones share
/// the same underlying [`LockManager`].
#[derive(Clone)]
pub struct Manager {
    inner: Arc<LockManager>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LockManager::new()),
        }
    }

    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            inner: Arc::new(LockManager::with_config(config)),
        }
    }

    /// Bind a reusable handle to `name` in `mode`.
    #[must_use]
    pub fn handle(&self, name: &str, mode: LockModeCode) -> Handle {
        Handle {
            manager: self.inner.clone(),
            name: name.to_string(),
            mode,
        }
    }

    pub fn set_log_level(&self, name: &str, level: LogLevel) {
        self.inner.set_log_level(name, level);
    }

    pub fn drop_all_thread_locks(&self) -> bool {
        self.inner.drop_all_thread_locks()
    }
}

/// A handle bound to one [`Manager`], one named lock, and one
/// [`LockModeCode`]. Unlike [`concur_lock_manager::LockHandle`] this
/// owns its manager reference (via `Arc`) rather than borrowing it, so
/// it can be stored, sent across an FFI boundary, or held past the
/// `Manager`'s own lexical scope.
#[derive(Clone)]
pub struct Handle {
    manager: Arc<LockManager>,
    name: String,
    mode: LockModeCode,
}

impl Handle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn mode(&self) -> LockModeCode {
        self.mode
    }

    pub fn acquire(&self) -> Result<(), ErrorCode> {
        let inner = self.manager.get(&self.name, self.mode.into());
        inner.acquire().map_err(|err| {
            dispatch(
                LogLevel::Warn,
                &format!("acquire of {:?} failed: {err}", self.name),
            );
            ErrorCode::from(err)
        })
    }

    pub fn try_acquire(&self) -> Result<bool, ErrorCode> {
        let inner = self.manager.get(&self.name, self.mode.into());
        inner.try_acquire().map_err(ErrorCode::from)
    }

    pub fn try_acquire_for(&self, duration: Duration) -> Result<bool, ErrorCode> {
        let inner = self.manager.get(&self.name, self.mode.into());
        inner.try_acquire_for(duration).map_err(ErrorCode::from)
    }

    pub fn release(&self) -> Result<(), ErrorCode> {
        let inner = self.manager.get(&self.name, self.mode.into());
        inner.release().map_err(ErrorCode::from)
    }

    #[must_use]
    pub fn is_held_by_current_thread(&self) -> bool {
        let inner = self.manager.get(&self.name, self.mode.into());
        inner.is_held_by_current_thread()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_roundtrip() {
        let manager = Manager::new();
        let handle = manager.handle("res", LockModeCode::Exclusive);
        handle.acquire().unwrap();
        assert!(handle.is_held_by_current_thread());
        handle.release().unwrap();
        assert!(!handle.is_held_by_current_thread());
    }

    #[test]
    fn release_without_holding_reports_not_held() {
        let manager = Manager::new();
        let handle = manager.handle("res", LockModeCode::Shared);
        assert_eq!(handle.release().unwrap_err(), ErrorCode::NotHeld);
    }

    #[test]
    fn cloned_handle_shares_state_with_original() {
        let manager = Manager::new();
        let handle = manager.handle("res", LockModeCode::Exclusive);
        handle.acquire().unwrap();
        let cloned = handle.clone();
        assert!(cloned.is_held_by_current_thread());
        cloned.release().unwrap();
    }
}
