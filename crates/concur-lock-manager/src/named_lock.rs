//! The data model behind [`crate::LockManager`]: named locks, their
//! locker lists, and the per-thread index used by the deadlock walk.

use std::collections::HashMap;
use std::sync::Condvar;
use std::thread::ThreadId;

use concur_core::{InternedStr, LogLevel};

/// The two ways a thread can hold (or wait for) a [`NamedLock`].
///
/// Many shared holders may coexist; an exclusive holder excludes all
/// others, including other exclusive holders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Exclusive => "exclusive",
        }
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(thread, mode, holding)` record in a [`NamedLock`]'s locker
/// list. `holding = false` means the thread is queued waiting for this
/// mode rather than currently owning it.
#[derive(Debug, Clone, Copy)]
pub struct LockerRecord {
    pub thread: ThreadId,
    pub mode: LockMode,
    pub holding: bool,
}

/// How many times the current thread holds a lock in each mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoldCounts {
    pub exclusive: u32,
    pub shared: u32,
}

impl HoldCounts {
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.exclusive == 0 && self.shared == 0
    }

    #[must_use]
    pub const fn count(self, mode: LockMode) -> u32 {
        match mode {
            LockMode::Shared => self.shared,
            LockMode::Exclusive => self.exclusive,
        }
    }
}

/// Registry-internal state for one named lock: its locker list, the
/// colour used by the deadlock walk, its condition variable, and its
/// configured log level.
///
/// Lives inside [`crate::manager::Registry`], which is itself behind the
/// manager's single coordination mutex — every field here is only ever
/// touched while that mutex is held.
pub struct LockState {
    pub name: InternedStr,
    pub lockers: Vec<LockerRecord>,
    pub colour: u64,
    pub condvar: std::sync::Arc<Condvar>,
    pub log_level: LogLevel,
}

impl LockState {
    pub fn new(name: InternedStr, log_level: LogLevel) -> Self {
        Self {
            name,
            lockers: Vec::new(),
            colour: 0,
            condvar: std::sync::Arc::new(Condvar::new()),
            log_level,
        }
    }

    /// Thread IDs currently holding this lock (in either mode).
    pub fn holders(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.lockers.iter().filter(|l| l.holding).map(|l| l.thread)
    }

    /// Whether any thread other than `thread` holds this lock in
    /// `mode`.
    #[must_use]
    pub fn has_other_holder(&self, thread: ThreadId, mode: LockMode) -> bool {
        self.lockers
            .iter()
            .any(|l| l.holding && l.mode == mode && l.thread != thread)
    }
}

/// Per-thread bookkeeping used by the deadlock walk and by
/// `save_lock_state`/`restore_lock_state`.
pub struct ThreadIndex {
    pub holds: HashMap<InternedStr, HoldCounts>,
    /// Insertion order of locks touched, for deterministic iteration
    /// (e.g. when restoring a snapshot).
    pub touched_order: Vec<InternedStr>,
    pub colour: u64,
    /// The single lock (and mode) this thread is currently blocked
    /// waiting to acquire, if any. A thread can only ever be blocked on
    /// one acquisition at a time.
    pub waiting_on: Option<(InternedStr, LockMode)>,
}

impl ThreadIndex {
    pub fn new() -> Self {
        Self {
            holds: HashMap::new(),
            touched_order: Vec::new(),
            colour: 0,
            waiting_on: None,
        }
    }

    pub fn record_touch(&mut self, name: &InternedStr) {
        if !self.holds.contains_key(name) {
            self.touched_order.push(name.clone());
        }
    }

    pub fn forget(&mut self, name: &InternedStr) {
        self.holds.remove(name);
        self.touched_order.retain(|n| n != name);
    }
}

impl Default for ThreadIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable snapshot of one thread's holdings across every
/// [`NamedLock`] it has touched, as of [`crate::LockManager::save_lock_state`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadLockState {
    pub(crate) holds: HashMap<InternedStr, HoldCounts>,
}

impl ThreadLockState {
    /// The hold counts this snapshot records for `name`, or zero if the
    /// thread had not touched that lock yet.
    #[must_use]
    pub fn counts(&self, name: &str) -> HoldCounts {
        self.holds.get(name).copied().unwrap_or_default()
    }

    /// True if this snapshot records no holdings at all — the snapshot
    /// taken by a thread that has never acquired anything, and the
    /// target of [`crate::LockManager::drop_all_thread_locks`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.holds.values().all(|c| c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_counts_is_empty() {
        assert!(HoldCounts::default().is_empty());
        assert!(!HoldCounts { exclusive: 1, shared: 0 }.is_empty());
    }

    #[test]
    fn thread_index_record_touch_is_idempotent_for_ordering() {
        let mut idx = ThreadIndex::new();
        let a = concur_core::intern("a");
        idx.record_touch(&a);
        idx.holds.insert(a.clone(), HoldCounts { exclusive: 1, shared: 0 });
        idx.record_touch(&a);
        assert_eq!(idx.touched_order, vec![a]);
    }

    #[test]
    fn thread_index_forget_removes_from_order() {
        let mut idx = ThreadIndex::new();
        let a = concur_core::intern("a");
        let b = concur_core::intern("b");
        idx.record_touch(&a);
        idx.holds.insert(a.clone(), HoldCounts { exclusive: 1, shared: 0 });
        idx.record_touch(&b);
        idx.holds.insert(b.clone(), HoldCounts { exclusive: 0, shared: 1 });
        idx.forget(&a);
        assert_eq!(idx.touched_order, vec![b]);
        assert!(!idx.holds.contains_key(&a));
    }

    #[test]
    fn lock_state_has_other_holder() {
        let mut state = LockState::new(concur_core::intern("l"), LogLevel::Off);
        let t1 = std::thread::current().id();
        state.lockers.push(LockerRecord { thread: t1, mode: LockMode::Shared, holding: true });
        assert!(!state.has_other_holder(t1, LockMode::Shared));
    }
}
