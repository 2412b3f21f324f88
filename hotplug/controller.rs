//! Controller side of the hotplug protocol
//!
//! ## CPU Offline (Hot-remove)
//! 1. Refuse fast if the target is not idle (no IPI, no side effects)
//! 2. Commit the request
//! 3. Pause the target's tick so it cannot enter the tick handler
//!    mid-handshake, then raise the hotplug SGI on it
//! 4. Spin until the target claims and acknowledges, or until the request
//!    is withdrawn. The tick is resumed while the request is still held, so
//!    no other controller can commit and pause in between
//! 5. Ask the power-state controller to confirm the domain is down
//!
//! ## CPU Online (Hot-add)
//! 1. Lock the scheduler so the idle slot is not disturbed
//! 2. Power the domain on and boot the secondary
//! 3. Reset the handshake and mark the core running

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::Vec;

use super::handshake::{HandshakeSignal, HandshakeTable};
use super::notify::{HotplugEvent, HotplugNotifier, NotifierChain};
use super::ops::HotplugOps;
use super::state::{CoreState, CoreStateStore};
use super::CoreId;
use crate::config::{HotplugConfig, MAX_CPUS};
use crate::kernel::sched::SchedulerGuard;
use crate::{Error, Result};

/// CPU hotplug statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HotplugStats {
    /// Configured cores
    pub total_cpus: u32,
    /// Cores currently running
    pub online_cpus: u32,
    /// Cores pending power-down or halted
    pub offline_cpus: u32,
    /// Successful offline handshakes
    pub offline_requests: u32,
    /// Offline requests refused as busy
    pub busy_rejections: u32,
    /// Requests withdrawn before the target claimed them
    pub aborts: u32,
    /// Successful power-ons
    pub online_requests: u32,
    /// Failed power-ons
    pub online_failures: u32,
}

#[derive(Default)]
struct Counters {
    offline: AtomicU32,
    busy: AtomicU32,
    aborts: AtomicU32,
    online: AtomicU32,
    online_failed: AtomicU32,
}

/// CPU hotplug controller
pub struct HotplugController {
    config: HotplugConfig,
    ops: HotplugOps,
    pub(super) states: CoreStateStore,
    pub(super) handshakes: HandshakeTable,
    notifiers: NotifierChain,
    counters: Counters,
}

impl HotplugController {
    /// Create a controller
    ///
    /// All configured cores start out `Running`: they were brought up by the
    /// ordinary SMP boot before hotplug takes over.
    pub fn new(config: HotplugConfig, ops: HotplugOps) -> Result<Self> {
        config.validate()?;

        log::info!("Hotplug: Initializing with {} CPUs", config.num_cpus);

        Ok(Self {
            config,
            ops,
            states: CoreStateStore::new(config.num_cpus),
            handshakes: HandshakeTable::new(),
            notifiers: NotifierChain::new(),
            counters: Counters::default(),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &HotplugConfig {
        &self.config
    }

    pub(super) fn ops(&self) -> &HotplugOps {
        &self.ops
    }

    /// Validate a raw core index against the configured core count
    pub fn core(&self, raw: usize) -> Result<CoreId> {
        match CoreId::new(raw) {
            Some(core) if raw < self.config.num_cpus => Ok(core),
            _ => Err(Error::InvalidCore),
        }
    }

    fn check_target(&self, core: CoreId) -> Result<()> {
        if core.index() >= self.config.num_cpus {
            return Err(Error::InvalidCore);
        }
        if core.is_boot() || core == self.ops.sched.this_core() {
            return Err(Error::SelfTarget);
        }
        Ok(())
    }

    /// Current state of `core`
    pub fn core_state(&self, core: CoreId) -> CoreState {
        self.states.get(core)
    }

    /// Current handshake signal of `core`
    pub fn handshake_signal(&self, core: CoreId) -> HandshakeSignal {
        self.handshakes.get(core).signal()
    }

    /// Whether a hotplug request for `core` is outstanding
    pub fn is_hotplug_pending(&self, core: CoreId) -> bool {
        self.handshakes.get(core).is_requested()
    }

    /// Register a hotplug notifier
    pub fn add_notifier(&self, notifier: &'static dyn HotplugNotifier) -> Result<()> {
        self.notifiers.register(notifier)
    }

    /// Ask `core` to vacate and power itself down
    ///
    /// Returns once the target has committed (state `HotplugPending`, core
    /// powering off) or refused. `Err(Busy)` leaves everything as it was.
    pub fn request_offline(&self, core: CoreId) -> Result<()> {
        self.check_target(core)?;

        let ops = &self.ops;
        let state = self.states.get(core);
        if state != CoreState::Running || !ops.sched.is_idle(core) {
            log::debug!("Hotplug: {} busy ({})", core, state.as_str());
            return Err(self.refuse(core));
        }

        log::info!("Hotplug: Taking {} offline", core);

        // Losing to a concurrent request must not touch the winner's tick
        if let Err(signal) = self.handshakes.get(core).request() {
            log::warn!("Hotplug: {} handshake not at rest ({})", core, signal.as_str());
            return Err(self.refuse(core));
        }

        ops.tick.pause(core);
        ops.irq.send_ipi(core, self.config.hotplug_sgi);

        match self.await_target(core) {
            HandshakeSignal::Acknowledged => {
                crate::protocol_assert!(
                    self.states.get(core) == CoreState::HotplugPending,
                    "{} acknowledged in state {}",
                    core,
                    self.states.get(core).as_str()
                );
                self.counters.offline.fetch_add(1, Ordering::Relaxed);
                log::info!("Hotplug: {} accepted offline request", core);
                Ok(())
            }
            HandshakeSignal::Idle => {
                crate::protocol_assert!(
                    self.states.get(core) == CoreState::Running,
                    "{} withdrawn in state {}",
                    core,
                    self.states.get(core).as_str()
                );
                log::warn!("Hotplug: {} did not take the request", core);
                Err(self.refuse(core))
            }
            other => super::protocol_violation(format_args!(
                "{} handshake settled in {}",
                core,
                other.as_str()
            )),
        }
    }

    /// Spin until the target settles the handshake
    ///
    /// A settled `Idle` means the request was withdrawn and the tick is
    /// already running again.
    fn await_target(&self, core: CoreId) -> HandshakeSignal {
        let handshake = self.handshakes.get(core);
        let limit = self.config.handshake_spin_limit;

        if let Some(settled) = handshake.wait_settled(limit) {
            return settled;
        }

        // Still `Requested`: no other controller can pause this tick yet
        self.ops.tick.resume(core);

        match handshake.withdraw() {
            Ok(()) => {
                self.counters.aborts.fetch_add(1, Ordering::Relaxed);
                log::warn!("Hotplug: {} request timed out, withdrawn", core);
                HandshakeSignal::Idle
            }
            // Withdrawn by `abort_pending`, which resumed the tick as well
            Err(HandshakeSignal::Idle) => HandshakeSignal::Idle,
            // The handler claimed it meanwhile; its remaining work is bounded
            Err(_) => {
                self.ops.tick.pause(core);
                handshake.wait_settled(0).unwrap_or(HandshakeSignal::Idle)
            }
        }
    }

    fn refuse(&self, core: CoreId) -> Error {
        self.counters.busy.fetch_add(1, Ordering::Relaxed);
        self.notifiers.send(HotplugEvent::OfflineFailed(core));
        Error::Busy
    }

    /// Cancel an outstanding request the target has not claimed
    ///
    /// Calling this without an unclaimed request outstanding is a protocol
    /// violation and halts. The target's tick is resumed before the request
    /// is released.
    pub fn abort_pending(&self, core: CoreId) {
        let handshake = self.handshakes.get(core);
        let signal = handshake.signal();

        crate::protocol_assert!(
            signal.is_requested() && !signal.is_handled(),
            "abort of {} with handshake {}",
            core,
            signal.as_str()
        );

        self.ops.tick.resume(core);
        if let Err(observed) = handshake.withdraw() {
            crate::protocol_assert!(
                false,
                "abort of {} lost to handler ({})",
                core,
                observed.as_str()
            );
        }

        self.counters.aborts.fetch_add(1, Ordering::Relaxed);
        log::info!("Hotplug: Request for {} aborted", core);
    }

    /// Confirm the power domain of a committed core is down
    pub fn finish_offline(&self, core: CoreId) -> Result<()> {
        self.check_target(core)?;

        if self.states.get(core) != CoreState::HotplugPending {
            return Err(Error::InvalidState);
        }

        if let Err(e) = self.ops.power.domain_power_off(core) {
            log::error!("Hotplug: {} power-off failed: {}", core, e.as_str());
            return Err(Error::PowerOff(e));
        }

        self.states
            .advance(core, CoreState::HotplugPending, CoreState::Halted)
            .map_err(|_| Error::InvalidState)?;

        log::info!("Hotplug: {} is now offline", core);
        self.notifiers.send(HotplugEvent::CpuOffline(core));
        Ok(())
    }

    /// Take `core` offline completely
    pub fn hotplug_off(&self, core: CoreId) -> Result<()> {
        self.request_offline(core)?;
        self.finish_offline(core)
    }

    /// Bring a halted core back online
    pub fn bring_online(&self, core: CoreId) -> Result<()> {
        self.check_target(core)?;

        let result = self.power_up(core);
        match result {
            Ok(()) => {
                self.counters.online.fetch_add(1, Ordering::Relaxed);
                log::info!("Hotplug: {} is now online", core);
                self.notifiers.send(HotplugEvent::CpuOnline(core));
            }
            Err(Error::InvalidState) => {}
            Err(e) => {
                self.counters.online_failed.fetch_add(1, Ordering::Relaxed);
                log::error!("Hotplug: {} online failed: {}", core, e);
                self.notifiers.send(HotplugEvent::OnlineFailed(core));
            }
        }
        result
    }

    fn power_up(&self, core: CoreId) -> Result<()> {
        let ops = &self.ops;
        let _sched = SchedulerGuard::lock(ops.sched);

        if self.states.get(core) != CoreState::Halted {
            return Err(Error::InvalidState);
        }

        log::info!("Hotplug: Bringing {} online", core);

        ops.power.domain_power_on(core).map_err(Error::PowerOn)?;
        ops.power.secondary_boot(core).map_err(Error::Boot)?;

        self.handshakes.get(core).reset();
        self.states
            .advance(core, CoreState::Halted, CoreState::Running)
            .map_err(|_| Error::InvalidState)?;
        ops.tick.resume(core);

        Ok(())
    }

    /// Bitmask of running cores
    pub fn online_mask(&self) -> u8 {
        self.states.running_mask(self.config.num_cpus)
    }

    /// Running cores
    pub fn online_cores(&self) -> Vec<CoreId, MAX_CPUS> {
        CoreId::range(self.config.num_cpus)
            .filter(|&core| self.states.get(core) == CoreState::Running)
            .collect()
    }

    /// Get hotplug statistics
    pub fn stats(&self) -> HotplugStats {
        let total = self.config.num_cpus as u32;
        let online = self.online_mask().count_ones();

        HotplugStats {
            total_cpus: total,
            online_cpus: online,
            offline_cpus: total - online,
            offline_requests: self.counters.offline.load(Ordering::Relaxed),
            busy_rejections: self.counters.busy.load(Ordering::Relaxed),
            aborts: self.counters.aborts.load(Ordering::Relaxed),
            online_requests: self.counters.online.load(Ordering::Relaxed),
            online_failures: self.counters.online_failed.load(Ordering::Relaxed),
        }
    }
}
