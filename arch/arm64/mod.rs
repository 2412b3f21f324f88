//! ARM64 (AArch64) back-ends
//!
//! - [`interrupt`] - GICv2 SGI delivery, end-of-interrupt and active
//!   priority bookkeeping
//! - [`psci`] - core power domains through PSCI 0.2 firmware calls
//! - [`timer`] - per-core gating of the generic timer tick
//!
//! ## References
//! - [ARM Generic Interrupt Controller Architecture Specification](https://developer.arm.com/documentation/ihi0048/latest)
//! - [ARM Power State Coordination Interface](https://developer.arm.com/documentation/den0022/latest)

pub mod interrupt;
pub mod psci;
pub mod timer;

pub use interrupt::GicV2;
pub use psci::{Hvc, PsciConduit, PsciPowerController, Smc};
pub use timer::{GenericTimer, LocalTimer, TickGate};

/// Affinity fields of an MPIDR_EL1 value
pub const MPIDR_AFFINITY_MASK: u64 = 0xff_00ff_ffff;

/// Strip the non-affinity bits from an MPIDR_EL1 value
#[inline]
pub const fn mpidr_affinity(mpidr: u64) -> u64 {
    mpidr & MPIDR_AFFINITY_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpidr_affinity() {
        // Bits 31 and 30 (U) are not affinity
        assert_eq!(mpidr_affinity(0x8000_0001), 0x01);
        assert_eq!(mpidr_affinity(0x01_0000_0203), 0x01_0000_0203);
        assert_eq!(mpidr_affinity(0xC000_0100), 0x100);
    }
}
