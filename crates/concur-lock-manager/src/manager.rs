//! [`LockManager`]: the named lock registry, its deadlock walk, and the
//! `LockHandle` API bound to one name and mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use concur_core::{Config, InternedStr, LogLevel, global_metrics, intern};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::named_lock::{HoldCounts, LockMode, LockState, LockerRecord, ThreadIndex, ThreadLockState};

/// Everything behind the manager's single coordination mutex: the named
/// locks and the per-thread indices used by the deadlock walk.
///
/// The spec's "locks carry their locker list, threads carry their lock
/// index" graph is encoded directly as these two maps; an edge
/// `thread -> lock` is `ThreadIndex::waiting_on`, an edge `lock ->
/// thread` is membership in `LockState::lockers`.
struct Registry {
    locks: HashMap<InternedStr, LockState>,
    thread_indices: HashMap<ThreadId, ThreadIndex>,
}

impl Registry {
    fn new() -> Self {
        Self {
            locks: HashMap::new(),
            thread_indices: HashMap::new(),
        }
    }
}

/// A named, reentrant shared/exclusive lock registry with online
/// deadlock detection.
///
/// Locks are created lazily on first [`LockManager::get`] and live for
/// the manager's lifetime; there is no reclamation (matches the
/// process-lifetime lifecycle of `NamedLock`).
pub struct LockManager {
    registry: Mutex<Registry>,
    colour_counter: AtomicU64,
    config: Config,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    /// Create a manager with default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a manager with explicit tuning (overrun factor, default
    /// log level, etc).
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            colour_counter: AtomicU64::new(0),
            config,
        }
    }

    /// Obtain a handle bound to `name` in `mode`. Creates the underlying
    /// lock on first use; concurrent first-use from multiple threads
    /// resolves to the same lock (the registry mutex serializes the
    /// `entry` insertion).
    #[must_use]
    pub fn get(&self, name: &str, mode: LockMode) -> LockHandle<'_> {
        let name = intern(name);
        {
            let mut guard = self.registry.lock().expect("lock manager registry poisoned");
            guard
                .locks
                .entry(name.clone())
                .or_insert_with(|| LockState::new(name.clone(), self.config.default_log_level));
        }
        LockHandle {
            manager: self,
            name,
            mode,
        }
    }

    /// Shorthand for `get(name, LockMode::Shared)`.
    #[must_use]
    pub fn shared(&self, name: &str) -> LockHandle<'_> {
        self.get(name, LockMode::Shared)
    }

    /// Shorthand for `get(name, LockMode::Exclusive)`.
    #[must_use]
    pub fn exclusive(&self, name: &str) -> LockHandle<'_> {
        self.get(name, LockMode::Exclusive)
    }

    /// Set the log verbosity for a specific named lock. No-op if the
    /// lock has never been touched via [`Self::get`].
    pub fn set_log_level(&self, name: &str, level: LogLevel) {
        let name = intern(name);
        let mut guard = self.registry.lock().expect("lock manager registry poisoned");
        if let Some(state) = guard.locks.get_mut(&name) {
            state.log_level = level;
        }
    }

    /// Block until the current thread holds `handle`'s lock in its
    /// mode, or fail with [`Error::Deadlock`].
    ///
    /// Interrupts encountered while waiting are swallowed and the wait
    /// is retried (spec: `acquire` never surfaces them).
    pub fn acquire(&self, handle: &LockHandle<'_>) -> Result<()> {
        let thread = std::thread::current().id();
        let start = Instant::now();
        let mut guard = self.registry.lock().expect("lock manager registry poisoned");
        let mut contended = false;
        loop {
            if try_claim_locked(&mut guard, thread, &handle.name, handle.mode) {
                global_metrics()
                    .lock_manager
                    .record_acquire(contended, start.elapsed().as_micros() as u64);
                trace!(lock = %handle.name, mode = %handle.mode, "acquired");
                return Ok(());
            }
            contended = true;
            let current = current_counts(&mut guard, thread, &handle.name);
            if is_self_upgrade_forbidden(current, handle.mode) {
                return Err(Error::Deadlock);
            }
            if self.would_deadlock(&mut guard, thread, &handle.name) {
                global_metrics().lock_manager.record_deadlock();
                warn!(lock = %handle.name, mode = %handle.mode, "deadlock detected on acquire");
                return Err(Error::Deadlock);
            }
            guard
                .thread_indices
                .entry(thread)
                .or_default()
                .waiting_on = Some((handle.name.clone(), handle.mode));
            let cv = guard
                .locks
                .get(&handle.name)
                .expect("lock created by get()")
                .condvar
                .clone();
            guard = cv.wait(guard).expect("lock manager condvar poisoned");
            guard
                .thread_indices
                .entry(thread)
                .or_default()
                .waiting_on = None;
        }
    }

    /// Non-blocking acquire attempt. Never runs the deadlock walk since
    /// it never registers a wait; a shared-to-exclusive self-upgrade is
    /// still reported as [`Error::Deadlock`] since that is a structural
    /// property, not a function of blocking.
    pub fn try_acquire(&self, handle: &LockHandle<'_>) -> Result<bool> {
        let thread = std::thread::current().id();
        let mut guard = self.registry.lock().expect("lock manager registry poisoned");
        if try_claim_locked(&mut guard, thread, &handle.name, handle.mode) {
            global_metrics().lock_manager.record_acquire(false, 0);
            return Ok(true);
        }
        let current = current_counts(&mut guard, thread, &handle.name);
        if is_self_upgrade_forbidden(current, handle.mode) {
            return Err(Error::Deadlock);
        }
        Ok(false)
    }

    /// Block up to `duration` (allowed to overrun by
    /// [`Config::try_acquire_overrun_factor`] to finish a pending walk)
    /// attempting to acquire `handle`'s lock.
    pub fn try_acquire_for(&self, handle: &LockHandle<'_>, duration: Duration) -> Result<bool> {
        let thread = std::thread::current().id();
        let start = Instant::now();
        let hard_deadline =
            start + duration.saturating_mul(self.config.try_acquire_overrun_factor.max(1));
        let mut guard = self.registry.lock().expect("lock manager registry poisoned");
        let mut contended = false;
        loop {
            if try_claim_locked(&mut guard, thread, &handle.name, handle.mode) {
                global_metrics()
                    .lock_manager
                    .record_acquire(contended, start.elapsed().as_micros() as u64);
                return Ok(true);
            }
            contended = true;
            let current = current_counts(&mut guard, thread, &handle.name);
            if is_self_upgrade_forbidden(current, handle.mode) {
                return Err(Error::Deadlock);
            }
            if self.would_deadlock(&mut guard, thread, &handle.name) {
                global_metrics().lock_manager.record_deadlock();
                return Err(Error::Deadlock);
            }
            let now = Instant::now();
            if now >= hard_deadline {
                return Ok(false);
            }
            guard
                .thread_indices
                .entry(thread)
                .or_default()
                .waiting_on = Some((handle.name.clone(), handle.mode));
            let remaining = hard_deadline - now;
            let cv = guard
                .locks
                .get(&handle.name)
                .expect("lock created by get()")
                .condvar
                .clone();
            let (g2, _timeout) = cv
                .wait_timeout(guard, remaining)
                .expect("lock manager condvar poisoned");
            guard = g2;
            guard
                .thread_indices
                .entry(thread)
                .or_default()
                .waiting_on = None;
        }
    }

    /// Release one hold of `handle`'s mode. Fails with
    /// [`Error::NotHeld`] if the current thread holds zero in that
    /// mode.
    pub fn release(&self, handle: &LockHandle<'_>) -> Result<()> {
        let thread = std::thread::current().id();
        let mut guard = self.registry.lock().expect("lock manager registry poisoned");
        release_locked(&mut guard, thread, &handle.name, handle.mode)?;
        if let Some(state) = guard.locks.get(&handle.name) {
            state.condvar.notify_all();
        }
        debug!(lock = %handle.name, mode = %handle.mode, "released");
        Ok(())
    }

    /// Whether the current thread holds `handle`'s lock in its mode at
    /// least once.
    #[must_use]
    pub fn is_held_by_current_thread(&self, handle: &LockHandle<'_>) -> bool {
        let thread = std::thread::current().id();
        let guard = self.registry.lock().expect("lock manager registry poisoned");
        guard
            .thread_indices
            .get(&thread)
            .and_then(|idx| idx.holds.get(&handle.name))
            .is_some_and(|c| c.count(handle.mode) > 0)
    }

    /// Snapshot the current thread's holdings across every lock it has
    /// touched.
    #[must_use]
    pub fn save_lock_state(&self) -> ThreadLockState {
        let thread = std::thread::current().id();
        let guard = self.registry.lock().expect("lock manager registry poisoned");
        ThreadLockState {
            holds: guard
                .thread_indices
                .get(&thread)
                .map(|idx| idx.holds.clone())
                .unwrap_or_default(),
        }
    }

    /// Release locks (and only release them) so the current thread's
    /// holdings match `snapshot` exactly. Fails with
    /// [`Error::IllegalRestore`] if `snapshot` would require acquiring
    /// any lock the thread does not currently hold enough of.
    pub fn restore_lock_state(&self, snapshot: &ThreadLockState) -> Result<()> {
        let thread = std::thread::current().id();
        let mut guard = self.registry.lock().expect("lock manager registry poisoned");

        let current_holds: HashMap<InternedStr, HoldCounts> = guard
            .thread_indices
            .get(&thread)
            .map(|idx| idx.holds.clone())
            .unwrap_or_default();

        for (name, target) in &snapshot.holds {
            let current = current_holds.get(name).copied().unwrap_or_default();
            if target.exclusive > current.exclusive || target.shared > current.shared {
                return Err(Error::IllegalRestore);
            }
        }

        let mut touched: Vec<InternedStr> = Vec::new();
        for (name, current) in &current_holds {
            let target = snapshot.counts(name);
            let release_excl = current.exclusive.saturating_sub(target.exclusive);
            let release_shared = current.shared.saturating_sub(target.shared);
            if release_excl == 0 && release_shared == 0 {
                continue;
            }
            touched.push(name.clone());
            for _ in 0..release_excl {
                release_locked(&mut guard, thread, name, LockMode::Exclusive)
                    .expect("restore: thread holds the counts it is releasing");
            }
            for _ in 0..release_shared {
                release_locked(&mut guard, thread, name, LockMode::Shared)
                    .expect("restore: thread holds the counts it is releasing");
            }
        }

        for name in &touched {
            if let Some(state) = guard.locks.get(name) {
                state.condvar.notify_all();
            }
        }
        Ok(())
    }

    /// Shorthand for `restore_lock_state(&ThreadLockState::default())`.
    /// Always succeeds: an empty snapshot never implies acquiring
    /// anything.
    pub fn drop_all_thread_locks(&self) -> bool {
        self.restore_lock_state(&ThreadLockState::default()).is_ok()
    }

    fn next_colour(&self) -> u64 {
        self.colour_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Run the deadlock walk described in spec.md §4.1, starting from
    /// `start_lock`: visit every thread holding it, and for each such
    /// thread follow its single `waiting_on` edge (if any) to another
    /// lock, recursing. Returns true the moment `target` (the thread
    /// requesting `start_lock`) is found among the holders reached —
    /// a cycle back to the requester.
    fn would_deadlock(&self, reg: &mut Registry, target: ThreadId, start_lock: &InternedStr) -> bool {
        let colour = self.next_colour();
        visit_lock(reg, start_lock, target, colour)
    }
}

fn visit_lock(reg: &mut Registry, lock_name: &InternedStr, target: ThreadId, colour: u64) -> bool {
    let Some(lock_state) = reg.locks.get_mut(lock_name) else {
        return false;
    };
    if lock_state.colour == colour {
        return false;
    }
    lock_state.colour = colour;
    let holders: Vec<ThreadId> = lock_state.holders().collect();
    for holder in holders {
        if holder == target {
            return true;
        }
        let Some(idx) = reg.thread_indices.get_mut(&holder) else {
            continue;
        };
        if idx.colour == colour {
            continue;
        }
        idx.colour = colour;
        if let Some((waiting_lock, _mode)) = idx.waiting_on.clone() {
            if visit_lock(reg, &waiting_lock, target, colour) {
                return true;
            }
        }
    }
    false
}

fn current_counts(reg: &mut Registry, thread: ThreadId, name: &InternedStr) -> HoldCounts {
    reg.thread_indices
        .entry(thread)
        .or_default()
        .holds
        .get(name)
        .copied()
        .unwrap_or_default()
}

/// A shared-holding thread may never upgrade in place to exclusive —
/// this is a structural self-deadlock regardless of whether anyone else
/// holds or wants the lock (spec.md §4.1 edge case).
fn is_self_upgrade_forbidden(current: HoldCounts, mode: LockMode) -> bool {
    mode == LockMode::Exclusive && current.shared > 0 && current.exclusive == 0
}

/// Attempt to grant `mode` to `thread` on `name` without blocking.
/// Returns whether the claim succeeded.
fn try_claim_locked(reg: &mut Registry, thread: ThreadId, name: &InternedStr, mode: LockMode) -> bool {
    let current = current_counts(reg, thread, name);
    let can_claim = match mode {
        LockMode::Shared => {
            let state = reg.locks.get(name).expect("lock created by get()");
            !state.has_other_holder(thread, LockMode::Exclusive)
        }
        LockMode::Exclusive => {
            if current.exclusive > 0 {
                true
            } else if current.shared > 0 {
                false // self-upgrade; caller reports Deadlock
            } else {
                let state = reg.locks.get(name).expect("lock created by get()");
                !state.lockers.iter().any(|l| l.holding)
            }
        }
    };
    if can_claim {
        grant(reg, thread, name, mode);
    }
    can_claim
}

fn grant(reg: &mut Registry, thread: ThreadId, name: &InternedStr, mode: LockMode) {
    let state = reg.locks.get_mut(name).expect("lock created by get()");
    if !state
        .lockers
        .iter()
        .any(|l| l.holding && l.thread == thread && l.mode == mode)
    {
        state.lockers.push(LockerRecord {
            thread,
            mode,
            holding: true,
        });
    }
    let idx = reg.thread_indices.entry(thread).or_default();
    let counts = idx.holds.entry(name.clone()).or_default();
    match mode {
        LockMode::Shared => counts.shared += 1,
        LockMode::Exclusive => counts.exclusive += 1,
    }
    idx.record_touch(name);
}

fn release_locked(reg: &mut Registry, thread: ThreadId, name: &InternedStr, mode: LockMode) -> Result<()> {
    let idx = reg.thread_indices.entry(thread).or_default();
    let count = idx.holds.get(name).copied().unwrap_or_default().count(mode);
    if count == 0 {
        return Err(Error::NotHeld);
    }
    let now_empty_mode = {
        let counts = idx.holds.get_mut(name).expect("checked above");
        match mode {
            LockMode::Shared => counts.shared -= 1,
            LockMode::Exclusive => counts.exclusive -= 1,
        }
        counts.count(mode) == 0
    };
    if now_empty_mode {
        if let Some(state) = reg.locks.get_mut(name) {
            state
                .lockers
                .retain(|l| !(l.holding && l.thread == thread && l.mode == mode));
        }
    }
    let is_empty = idx.holds.get(name).copied().unwrap_or_default().is_empty();
    if is_empty {
        idx.forget(name);
    }
    Ok(())
}

/// A reusable handle bound to one [`LockManager`], one named lock, and
/// one [`LockMode`]. Obtained via [`LockManager::get`]/`shared`/`exclusive`.
#[derive(Clone)]
pub struct LockHandle<'a> {
    manager: &'a LockManager,
    name: InternedStr,
    mode: LockMode,
}

impl<'a> LockHandle<'a> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn acquire(&self) -> Result<()> {
        self.manager.acquire(self)
    }

    pub fn try_acquire(&self) -> Result<bool> {
        self.manager.try_acquire(self)
    }

    pub fn try_acquire_for(&self, duration: Duration) -> Result<bool> {
        self.manager.try_acquire_for(self, duration)
    }

    pub fn release(&self) -> Result<()> {
        self.manager.release(self)
    }

    #[must_use]
    pub fn is_held_by_current_thread(&self) -> bool {
        self.manager.is_held_by_current_thread(self)
    }
}
