//! Collaborator interfaces
//!
//! Hardware and firmware the hotplug protocol drives, kept behind traits so
//! the protocol itself stays hardware-agnostic.

use super::CoreId;
use crate::kernel::sched::Scheduler;

/// Interrupt controller operations
pub trait InterruptController: Sync {
    /// Raise software interrupt `sgi` on `target` only
    fn send_ipi(&self, target: CoreId, sgi: u32);

    /// Signal end-of-interrupt for `irq` on the calling core
    fn ack_interrupt(&self, irq: u32);

    /// Drop the "being serviced" mark of priority `level` on the calling core
    fn clear_active_priority(&self, level: u32);
}

/// Power-state controller operations (PSCI or vendor sequences)
pub trait PowerController: Sync {
    /// Power down the calling core; never returns
    fn cpu_off(&self, core: CoreId) -> !;

    /// Confirm `core`'s power domain is down
    fn domain_power_off(&self, core: CoreId) -> Result<(), PowerError>;

    /// Re-energize `core`'s power domain
    fn domain_power_on(&self, core: CoreId) -> Result<(), PowerError>;

    /// Start `core` at its boot vector and wait for it to come up
    fn secondary_boot(&self, core: CoreId) -> Result<(), PowerError>;
}

/// Periodic scheduler tick of each core
pub trait TickSource: Sync {
    /// Stop delivering ticks to `core`
    fn pause(&self, core: CoreId);

    /// Resume ticks on `core`
    fn resume(&self, core: CoreId);
}

/// Power-state controller failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerError {
    /// Operation not supported by firmware
    NotSupported,
    /// Invalid parameters
    InvalidParameters,
    /// Denied by firmware policy
    Denied,
    /// Core is already on
    AlreadyOn,
    /// A power-on for this core is already pending
    OnPending,
    /// Firmware internal failure
    InternalFailure,
    /// Core not present
    NotPresent,
    /// Core disabled
    Disabled,
    /// Core did not reach the expected state in time
    Timeout,
}

impl PowerError {
    /// Get error message
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotSupported => "not supported",
            Self::InvalidParameters => "invalid parameters",
            Self::Denied => "denied",
            Self::AlreadyOn => "already on",
            Self::OnPending => "on pending",
            Self::InternalFailure => "internal failure",
            Self::NotPresent => "not present",
            Self::Disabled => "disabled",
            Self::Timeout => "timeout",
        }
    }
}

/// The collaborators a [`HotplugController`](super::HotplugController) drives
#[derive(Clone, Copy)]
pub struct HotplugOps {
    /// IPI transport and GIC bookkeeping
    pub irq: &'static dyn InterruptController,
    /// Core power domains
    pub power: &'static dyn PowerController,
    /// Scheduler glue
    pub sched: &'static dyn Scheduler,
    /// Per-core tick
    pub tick: &'static dyn TickSource,
}
