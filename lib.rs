//! SMP CPU hotplug for embedded multi-core kernels
//!
//! This crate takes individual secondary cores offline and brings them back
//! while the scheduler keeps running on the remaining cores. The heart of it
//! is a request/acknowledge rendezvous between a controlling core and the
//! target core, driven by one inter-processor interrupt and a per-core
//! atomic handshake signal.
//!
//! The surrounding kernel plugs in through traits:
//! - [`hotplug::InterruptController`] - IPI delivery and GIC bookkeeping
//! - [`hotplug::PowerController`] - core power domains (PSCI or vendor registers)
//! - [`kernel::sched::Scheduler`] - run-queue slots and saved task context
//! - [`hotplug::TickSource`] - the per-core scheduler tick
//!
//! ARM64 back-ends for the hardware-facing traits live in [`arch::arm64`].

#![cfg_attr(not(test), no_std)]

// Core modules
pub mod utils;
pub mod config;

// Architecture-specific code
pub mod arch;

// Kernel collaborators (locks, scheduler glue)
pub mod kernel;

// CPU hotplug
pub mod hotplug;

pub use hotplug::{
    CoreId, CoreState, HandshakeSignal, HotplugController, HotplugEvent, HotplugOps,
    HotplugStats, PowerError,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global hotplug controller
///
/// After this the free-function interrupt entry point
/// [`hotplug::hotplug_interrupt_handler`] dispatches to `controller`.
pub fn init(controller: &'static HotplugController) -> Result<()> {
    hotplug::install(controller)?;

    log::info!(
        "smp-hotplug v{} initialized ({} CPUs, SGI {})",
        VERSION,
        controller.config().num_cpus,
        controller.config().hotplug_sgi
    );

    Ok(())
}

/// Common error type for the hotplug subsystem
///
/// These are the recoverable failures. Protocol invariant violations are not
/// errors; they halt through [`protocol_assert!`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid argument or configuration
    InvalidArgument,
    /// Core id outside the configured core range
    InvalidCore,
    /// The controller tried to target itself or the boot core
    SelfTarget,
    /// Target core cannot be interrupted right now; retry later
    Busy,
    /// Core is not in the state the operation requires
    InvalidState,
    /// Fixed-capacity table is full
    NoSpace,
    /// A global controller is already installed
    AlreadyInstalled,
    /// No global controller installed
    NotInitialized,
    /// Power domain could not be confirmed off
    PowerOff(PowerError),
    /// Power domain could not be switched on
    PowerOn(PowerError),
    /// Secondary core did not come up after power-on
    Boot(PowerError),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::InvalidCore => f.write_str("invalid core id"),
            Error::SelfTarget => f.write_str("cannot target controller or boot core"),
            Error::Busy => f.write_str("target core busy"),
            Error::InvalidState => f.write_str("core in wrong state"),
            Error::NoSpace => f.write_str("no space left"),
            Error::AlreadyInstalled => f.write_str("controller already installed"),
            Error::NotInitialized => f.write_str("controller not installed"),
            Error::PowerOff(e) => write!(f, "power-off failed: {}", e.as_str()),
            Error::PowerOn(e) => write!(f, "power-on failed: {}", e.as_str()),
            Error::Boot(e) => write!(f, "secondary boot failed: {}", e.as_str()),
        }
    }
}

/// Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// Bare-metal panic handler: report and park the core
#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log::error!("PANIC: {}", info);

    loop {
        arch::wait_for_interrupt();
    }
}
