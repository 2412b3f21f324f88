//! Utility functions
//!
//! Memory barriers and spin helpers shared by the hotplug protocol and
//! its collaborators.

pub mod log;

use core::sync::atomic::{fence, Ordering};

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        use aarch64_cpu::asm::barrier;

        /// Full memory barrier (inner shareable)
        #[inline]
        pub fn mb() {
            fence(Ordering::SeqCst);
            barrier::dmb(barrier::ISH);
        }
    } else {
        /// Full memory barrier
        #[inline]
        pub fn mb() {
            fence(Ordering::SeqCst);
        }
    }
}

/// Relax the CPU inside a busy-wait loop
#[inline]
pub fn cpu_relax() {
    core::hint::spin_loop();
}

/// Spin until `done` returns true or `limit` iterations pass
///
/// A `limit` of zero spins forever. Returns whether `done` was observed.
#[inline]
pub fn spin_until(limit: u32, mut done: impl FnMut() -> bool) -> bool {
    let mut spins: u32 = 0;
    loop {
        if done() {
            return true;
        }
        if limit != 0 {
            spins += 1;
            if spins >= limit {
                return false;
            }
        }
        cpu_relax();
    }
}
