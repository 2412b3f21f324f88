//! Saved CPU context
//!
//! Register file of an interrupted task as pushed by the exception entry
//! code. Layout matches the AArch64 exception frame: x0-x30, then sp,
//! elr and spsr.

/// Number of general-purpose registers saved (x0-x30)
pub const NUM_GPRS: usize = 31;

/// Interrupted task register file
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuContext {
    /// General purpose registers x0-x30
    pub gprs: [u64; NUM_GPRS],
    /// Stack pointer at the time of the exception
    pub sp: u64,
    /// Exception link register (resume pc)
    pub elr: u64,
    /// Saved program status register
    pub spsr: u64,
}

impl CpuContext {
    /// Empty context
    pub const fn new() -> Self {
        Self {
            gprs: [0; NUM_GPRS],
            sp: 0,
            elr: 0,
            spsr: 0,
        }
    }

    /// Resume program counter
    pub fn pc(&self) -> u64 {
        self.elr
    }

    /// Link register (x30)
    pub fn lr(&self) -> u64 {
        self.gprs[30]
    }
}
