//! Scheduler integration
//!
//! The hotplug subsystem does not schedule anything itself. It needs to know
//! which task a core is running, to park that task's context when the core
//! goes away, and to hold the global ready-queue lock while a core's idle
//! slot is being reinitialized.

pub mod context;

pub use context::CpuContext;

use crate::hotplug::CoreId;

/// Opaque handle to a task control block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub usize);

impl TaskHandle {
    /// Raw task id
    pub const fn id(self) -> usize {
        self.0
    }
}

/// Scheduler operations used by the hotplug subsystem
pub trait Scheduler: Sync {
    /// Core the caller is executing on
    fn this_core(&self) -> CoreId;

    /// Lock the global ready queue
    fn lock(&self);

    /// Unlock the global ready queue
    fn unlock(&self);

    /// Task currently assigned to `core`'s run-queue slot
    fn current_task(&self, core: CoreId) -> TaskHandle;

    /// Idle/placeholder task of `core`
    fn idle_task(&self, core: CoreId) -> TaskHandle;

    /// Store `ctx` as the resume context of `task`
    fn save_context(&self, task: TaskHandle, ctx: &CpuContext);

    /// Mark `task`'s run slot inactive so nothing is dispatched onto it
    fn mark_inactive(&self, task: TaskHandle);

    /// Whether `core` is running nothing but its idle task
    fn is_idle(&self, core: CoreId) -> bool {
        self.current_task(core) == self.idle_task(core)
    }
}

/// RAII holder of the scheduler lock
///
/// Unlocks on drop, so every early return on an error path releases it.
pub struct SchedulerGuard<'a> {
    sched: &'a dyn Scheduler,
}

impl<'a> SchedulerGuard<'a> {
    /// Lock the scheduler
    pub fn lock(sched: &'a dyn Scheduler) -> Self {
        sched.lock();
        Self { sched }
    }
}

impl Drop for SchedulerGuard<'_> {
    fn drop(&mut self) {
        self.sched.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    struct CountingSched {
        locks: AtomicU32,
        unlocks: AtomicU32,
    }

    impl Scheduler for CountingSched {
        fn this_core(&self) -> CoreId {
            CoreId::BOOT
        }
        fn lock(&self) {
            self.locks.fetch_add(1, Ordering::SeqCst);
        }
        fn unlock(&self) {
            self.unlocks.fetch_add(1, Ordering::SeqCst);
        }
        fn current_task(&self, core: CoreId) -> TaskHandle {
            TaskHandle(core.index() + 100)
        }
        fn idle_task(&self, core: CoreId) -> TaskHandle {
            TaskHandle(core.index())
        }
        fn save_context(&self, _task: TaskHandle, _ctx: &CpuContext) {}
        fn mark_inactive(&self, _task: TaskHandle) {}
    }

    fn try_under_lock(sched: &CountingSched, fail: bool) -> Result<(), ()> {
        let _guard = SchedulerGuard::lock(sched);
        if fail {
            return Err(());
        }
        Ok(())
    }

    #[test]
    fn test_guard_unlocks_on_every_path() {
        let sched = CountingSched {
            locks: AtomicU32::new(0),
            unlocks: AtomicU32::new(0),
        };

        assert!(try_under_lock(&sched, false).is_ok());
        assert!(try_under_lock(&sched, true).is_err());

        assert_eq!(sched.locks.load(Ordering::SeqCst), 2);
        assert_eq!(sched.unlocks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_idle_check() {
        let sched = CountingSched {
            locks: AtomicU32::new(0),
            unlocks: AtomicU32::new(0),
        };
        assert!(!sched.is_idle(CoreId::BOOT));
        assert_eq!(TaskHandle(7).id(), 7);
    }
}
