//! GICv2 driver for ARM64
//!
//! Reference: ARM IHI 0048B (GIC architecture specification)

use core::ptr::NonNull;

use bitflags::bitflags;
use volatile::VolatilePtr;

use super::{is_sgi, SPURIOUS_IRQ};
use crate::hotplug::{CoreId, InterruptController};

/// GIC Distributor register offsets
pub mod gicd {
    /// GICD_CTLR - Distributor Control Register
    pub const CTLR: usize = 0x000;
    /// GICD_SGIR - Software Generated Interrupt Register
    pub const SGIR: usize = 0xF00;

    /// GICD_SGIR CPUTargetList shift
    pub const SGIR_TARGET_SHIFT: u32 = 16;
    /// GICD_SGIR SGIINTID mask
    pub const SGIR_INTID_MASK: u32 = 0xF;
}

/// GIC CPU Interface register offsets
pub mod gicc {
    /// GICC_CTLR - CPU Interface Control Register
    pub const CTLR: usize = 0x00;
    /// GICC_PMR - Interrupt Priority Mask Register
    pub const PMR: usize = 0x04;
    /// GICC_IAR - Interrupt Acknowledge Register
    pub const IAR: usize = 0x0C;
    /// GICC_EOIR - End of Interrupt Register
    pub const EOIR: usize = 0x10;
    /// GICC_APR - Active Priorities Registers (four of them)
    pub const APR: usize = 0xD0;

    /// Interrupt id field of IAR/EOIR (id plus source CPU)
    pub const IAR_MASK: u32 = 0x1FFF;
    /// Interrupt id without the source CPU
    pub const INTID_MASK: u32 = 0x3FF;
    /// Active priority bits per APR register
    pub const APR_BITS: u32 = 32;
}

bitflags! {
    /// GICC_CTLR bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GiccCtlr: u32 {
        /// Signal Group 0 interrupts
        const ENABLE_GRP0 = 1 << 0;
        /// Signal Group 1 interrupts
        const ENABLE_GRP1 = 1 << 1;
        /// Group 0 IAR reads may acknowledge Group 1
        const ACK_CTL = 1 << 2;
        /// Signal Group 0 as FIQ
        const FIQ_EN = 1 << 3;
        /// Common binary point for both groups
        const CBPR = 1 << 4;
        /// Split priority drop and deactivation
        const EOI_MODE = 1 << 9;
    }
}

/// GICv2 distributor and CPU interface of the calling core
///
/// The CPU interface is banked, so every core reaches its own interface at
/// the same address and one instance serves all cores.
pub struct GicV2 {
    dist_base: usize,
    cpu_base: usize,
}

impl GicV2 {
    /// Create a driver for the given register frames
    ///
    /// # Safety
    ///
    /// Both bases must be non-null, 4-byte aligned and map the GICv2
    /// distributor and CPU interface register frames for the lifetime of
    /// the driver.
    pub const unsafe fn new(dist_base: usize, cpu_base: usize) -> Self {
        Self {
            dist_base,
            cpu_base,
        }
    }

    fn reg(&self, base: usize, offset: usize) -> VolatilePtr<'_, u32> {
        // SAFETY: `new`'s contract guarantees a mapped, aligned frame
        unsafe { VolatilePtr::new(NonNull::new_unchecked((base + offset) as *mut u32)) }
    }

    fn gicd(&self, offset: usize) -> VolatilePtr<'_, u32> {
        self.reg(self.dist_base, offset)
    }

    fn gicc(&self, offset: usize) -> VolatilePtr<'_, u32> {
        self.reg(self.cpu_base, offset)
    }

    /// Enable the calling core's CPU interface
    pub fn enable_cpu_interface(&self, priority_mask: u8) {
        self.gicc(gicc::PMR).write(u32::from(priority_mask));
        self.gicc(gicc::CTLR)
            .write((GiccCtlr::ENABLE_GRP0 | GiccCtlr::ENABLE_GRP1).bits());
    }

    /// Current CPU interface control bits
    pub fn cpu_control(&self) -> GiccCtlr {
        GiccCtlr::from_bits_truncate(self.gicc(gicc::CTLR).read())
    }

    /// Acknowledge the highest priority pending interrupt
    ///
    /// Returns the raw IAR value (needed for the matching EOI), or `None`
    /// if nothing was pending.
    pub fn acknowledge(&self) -> Option<u32> {
        let iar = self.gicc(gicc::IAR).read() & gicc::IAR_MASK;
        if iar & gicc::INTID_MASK == SPURIOUS_IRQ {
            None
        } else {
            Some(iar)
        }
    }

    /// Active priority register `index` of the calling core
    pub fn active_priorities(&self, index: usize) -> u32 {
        self.gicc(gicc::APR + index * 4).read()
    }
}

impl InterruptController for GicV2 {
    fn send_ipi(&self, target: CoreId, sgi: u32) {
        debug_assert!(is_sgi(sgi));

        let value = (u32::from(target.mask()) << gicd::SGIR_TARGET_SHIFT)
            | (sgi & gicd::SGIR_INTID_MASK);
        self.gicd(gicd::SGIR).write(value);
    }

    fn ack_interrupt(&self, irq: u32) {
        self.gicc(gicc::EOIR).write(irq & gicc::IAR_MASK);
    }

    fn clear_active_priority(&self, level: u32) {
        let reg = self.gicc(gicc::APR + (level / gicc::APR_BITS) as usize * 4);
        let bit = 1u32 << (level % gicc::APR_BITS);
        reg.write(reg.read() & !bit);
    }
}
