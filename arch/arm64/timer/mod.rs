//! Generic timer tick gating for ARM64
//!
//! A core being taken offline must not run the scheduler tick while it is
//! inside the hotplug handshake. The controller pauses the tick through
//! [`TickGate`]; the target's tick interrupt consults the gate and, while
//! paused, skips the scheduler and pushes its own comparator one interval
//! out. The timer interrupt itself is never masked, so once the gate is
//! resumed the next tick reaches the scheduler again.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::MAX_CPUS;
use crate::hotplug::{CoreId, TickSource};

/// The calling core's tick timer
pub trait LocalTimer: Sync {
    /// Fire the next tick `ticks` counter ticks from now
    fn rearm(&self, ticks: u64);
}

/// EL1 physical generic timer (CNTP_*_EL0)
pub struct GenericTimer;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        impl LocalTimer for GenericTimer {
            fn rearm(&self, ticks: u64) {
                use aarch64_cpu::registers::CNTP_TVAL_EL0;
                use tock_registers::interfaces::Writeable;

                // Writing TVAL also drops the pending timer condition
                CNTP_TVAL_EL0.set(ticks);
            }
        }
    } else {
        impl LocalTimer for GenericTimer {
            fn rearm(&self, _ticks: u64) {}
        }
    }
}

/// Per-core tick enable flags
pub struct TickGate<T: LocalTimer = GenericTimer> {
    timer: T,
    interval: u64,
    paused: [AtomicBool; MAX_CPUS],
}

impl TickGate {
    /// Create a gate over the generic timer, every core's tick running
    ///
    /// `interval` is the tick period in counter ticks.
    pub const fn new(interval: u64) -> Self {
        Self::with_timer(GenericTimer, interval)
    }
}

impl<T: LocalTimer> TickGate<T> {
    /// Create a gate over `timer`
    pub const fn with_timer(timer: T, interval: u64) -> Self {
        const UNPAUSED: AtomicBool = AtomicBool::new(false);
        Self {
            timer,
            interval,
            paused: [UNPAUSED; MAX_CPUS],
        }
    }

    /// Whether ticks to `core` are paused
    pub fn is_paused(&self, core: CoreId) -> bool {
        self.paused[core.index()].load(Ordering::Acquire)
    }

    /// Tick interrupt hook, called on `core` itself
    ///
    /// Returns whether the scheduler tick should run. When it does, the
    /// scheduler re-arms the timer as usual; a swallowed tick is re-armed
    /// here.
    pub fn on_tick(&self, core: CoreId) -> bool {
        if self.is_paused(core) {
            self.timer.rearm(self.interval);
            false
        } else {
            true
        }
    }
}

impl<T: LocalTimer> TickSource for TickGate<T> {
    fn pause(&self, core: CoreId) {
        self.paused[core.index()].store(true, Ordering::Release);
    }

    fn resume(&self, core: CoreId) {
        log::trace!("Tick: resume {}", core);
        self.paused[core.index()].store(false, Ordering::Release);
    }
}
