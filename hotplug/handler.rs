//! Target side of the hotplug protocol
//!
//! Runs in interrupt context on the core being taken offline. Once the
//! handler has claimed the request it never returns: the core saves the
//! interrupted task, drops its GIC state and powers itself down.

use super::controller::HotplugController;
use super::handshake::HandshakeSignal;
use super::state::CoreState;
use super::CoreId;
use crate::kernel::sched::CpuContext;

impl HotplugController {
    /// Service the hotplug SGI on `core`
    ///
    /// Returns only when there is nothing to do: the SGI was spurious, or the
    /// controller withdrew its request before this core got to it. The
    /// dispatcher's normal end-of-interrupt then applies.
    pub fn handle_hotplug_ipi(&self, core: CoreId, irq: u32, ctx: &CpuContext) {
        let handshake = self.handshakes.get(core);

        if handshake.signal() != HandshakeSignal::Requested {
            log::debug!("Hotplug: Spurious IPI on {}", core);
            return;
        }

        match handshake.claim() {
            Ok(()) => {}
            Err(HandshakeSignal::Idle) => {
                log::debug!("Hotplug: Request for {} withdrawn", core);
                return;
            }
            Err(other) => super::protocol_violation(format_args!(
                "{} claimed request in {}",
                core,
                other.as_str()
            )),
        }

        let state = self.states.get(core);
        crate::protocol_assert!(
            state == CoreState::Running,
            "{} took hotplug IPI in state {}",
            core,
            state.as_str()
        );
        crate::protocol_assert!(
            self.states
                .advance(core, CoreState::Running, CoreState::HotplugPending)
                .is_ok(),
            "{} lost its state while handling hotplug",
            core
        );

        handshake.acknowledge();

        self.offline_self(core, irq, ctx)
    }

    /// Vacate `core` and power it down
    fn offline_self(&self, core: CoreId, irq: u32, ctx: &CpuContext) -> ! {
        let ops = self.ops();
        let config = self.config();

        let task = ops.sched.current_task(core);
        ops.sched.save_context(task, ctx);
        ops.sched.mark_inactive(task);

        // Nothing below returns through the interrupt exit path, so the GIC
        // must be told by hand that both priority levels are done.
        ops.irq.clear_active_priority(config.ipi_priority_level);
        ops.irq.clear_active_priority(config.resume_priority_level);
        ops.irq.ack_interrupt(irq);

        log::info!("Hotplug: {} powering off", core);

        ops.power.cpu_off(core)
    }
}
