//! Architecture support
//!
//! Hardware back-ends for the hotplug collaborator traits. The register
//! layouts are plain data and build on every target so they can be tested
//! on the host; only the instructions themselves are gated on AArch64.

#[cfg(feature = "arch_arm64")]
pub mod arm64;

/// Idle the calling core until the next interrupt
#[inline]
pub fn wait_for_interrupt() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "aarch64")] {
            aarch64_cpu::asm::wfi();
        } else {
            core::hint::spin_loop();
        }
    }
}
