//! Interrupt controller support for ARM64
//!
//! Only the GICv2 pieces the hotplug path touches: raising an SGI on one
//! core, ending an interrupt by hand, and dropping active priority state
//! of a core that is about to lose power.

pub mod gic;

pub use gic::{gicc, gicd, GiccCtlr, GicV2};

/// First private peripheral interrupt id; ids below are SGIs
pub const PPI_BASE: u32 = 16;

/// Spurious interrupt id returned by an IAR read with nothing pending
pub const SPURIOUS_IRQ: u32 = 1023;

/// Whether `irq` is a software generated interrupt
#[inline]
pub const fn is_sgi(irq: u32) -> bool {
    irq < PPI_BASE
}
