//! CPU hotplug protocol
//!
//! A controlling core takes a secondary core offline by raising the hotplug
//! SGI on it and waiting for the target's interrupt handler to acknowledge.
//! The target then parks its current task, cleans up its GIC state and
//! powers itself down. Bringing a core back is driven entirely by the
//! controller through the power-state controller.
//!
//! Per-core state (see [`CoreState`]):
//!
//! ```text
//! Running --handler--> HotplugPending --finish_offline--> Halted --bring_online--> Running
//! ```
//!
//! Recoverable failures come back as [`Error`](crate::Error). Broken
//! protocol invariants are bugs and halt through [`protocol_assert!`].

use core::fmt;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

pub mod controller;
pub mod core_id;
pub mod handler;
pub mod handshake;
pub mod notify;
pub mod ops;
pub mod state;


pub use controller::{HotplugController, HotplugStats};
pub use core_id::CoreId;
pub use handshake::{Handshake, HandshakeSignal, HandshakeTable};
pub use notify::{HotplugEvent, HotplugNotifier, NotifierChain};
pub use ops::{HotplugOps, InterruptController, PowerController, PowerError, TickSource};
pub use state::{CoreState, CoreStateStore};

use crate::kernel::sched::CpuContext;
use crate::{Error, Result};

/// Halt on a broken hotplug invariant
///
/// Unlike `assert!` this is kept in release builds and logs before halting.
#[macro_export]
macro_rules! protocol_assert {
    ($cond:expr, $($arg:tt)+) => {{
        if !$cond {
            $crate::hotplug::protocol_violation(format_args!($($arg)+));
        }
    }};
}

/// Report a protocol violation and halt
#[cold]
#[track_caller]
pub fn protocol_violation(args: fmt::Arguments<'_>) -> ! {
    log::error!("Hotplug: protocol violation: {}", args);
    panic!("hotplug protocol violation: {}", args)
}

static CONTROLLER: AtomicPtr<HotplugController> = AtomicPtr::new(ptr::null_mut());

/// Install the controller the interrupt entry point dispatches to
pub fn install(controller: &'static HotplugController) -> Result<()> {
    CONTROLLER
        .compare_exchange(
            ptr::null_mut(),
            controller as *const HotplugController as *mut HotplugController,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .map(|_| ())
        .map_err(|_| Error::AlreadyInstalled)
}

/// The installed controller
pub fn controller() -> Result<&'static HotplugController> {
    let ptr = CONTROLLER.load(Ordering::Acquire);
    // SAFETY: only ever set from a `&'static HotplugController`
    unsafe { ptr.as_ref() }.ok_or(Error::NotInitialized)
}

/// Hotplug SGI entry point
///
/// Called by the platform's interrupt dispatch on the interrupted core with
/// the acknowledged interrupt id and the interrupted context.
pub fn hotplug_interrupt_handler(core: CoreId, irq: u32, ctx: &CpuContext) {
    match controller() {
        Ok(controller) => controller.handle_hotplug_ipi(core, irq, ctx),
        Err(_) => log::warn!("Hotplug: IPI on {} before controller installed", core),
    }
}

/// Whether a hotplug request for `core` is outstanding
///
/// Safe to call from any core, including from the tick path of `core` itself.
pub fn is_hotplug_pending(core: CoreId) -> bool {
    controller().is_ok_and(|controller| controller.is_hotplug_pending(core))
}
