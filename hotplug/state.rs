//! Per-core power/run state store
//!
//! Every write is a release store followed by a full barrier so the next
//! cross-core reader (the controller's post-handshake checks, the power
//! controller deciding to cut power) sees a state the writer has really
//! committed to.

use core::sync::atomic::{AtomicU8, Ordering};

use super::CoreId;
use crate::config::MAX_CPUS;
use crate::utils::mb;

/// Power/run state of one core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoreState {
    /// Core is online and scheduling
    Running = 0,
    /// Core accepted a hotplug request and is powering itself down
    HotplugPending = 1,
    /// Core's power domain is off
    Halted = 2,
}

impl CoreState {
    /// Create from raw value
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::HotplugPending,
            _ => Self::Halted,
        }
    }

    /// Next state in the Running -> HotplugPending -> Halted -> Running cycle
    pub fn next(self) -> Self {
        match self {
            Self::Running => Self::HotplugPending,
            Self::HotplugPending => Self::Halted,
            Self::Halted => Self::Running,
        }
    }

    /// Whether `self -> to` is a legal transition
    pub fn can_become(self, to: CoreState) -> bool {
        self.next() == to
    }

    /// Get state name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::HotplugPending => "hotplug-pending",
            Self::Halted => "halted",
        }
    }
}

/// State registry for all cores
pub struct CoreStateStore {
    states: [AtomicU8; MAX_CPUS],
}

impl CoreStateStore {
    /// Create a store with cores below `online` running and the rest halted
    pub fn new(online: usize) -> Self {
        Self {
            states: core::array::from_fn(|i| {
                let state = if i < online {
                    CoreState::Running
                } else {
                    CoreState::Halted
                };
                AtomicU8::new(state as u8)
            }),
        }
    }

    /// Current state of `core`
    pub fn get(&self, core: CoreId) -> CoreState {
        CoreState::from_raw(self.states[core.index()].load(Ordering::Acquire))
    }

    /// Move `core` from `from` to `to`
    ///
    /// Fails with the observed state if `core` was not in `from`. Illegal
    /// edges are a protocol bug and halt.
    pub fn advance(&self, core: CoreId, from: CoreState, to: CoreState) -> Result<(), CoreState> {
        crate::protocol_assert!(
            from.can_become(to),
            "{}: illegal state transition {} -> {}",
            core,
            from.as_str(),
            to.as_str()
        );

        let result = self.states[core.index()]
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(CoreState::from_raw);
        mb();
        result
    }

    /// Bitmask of cores currently `Running`
    pub fn running_mask(&self, count: usize) -> u8 {
        CoreId::range(count)
            .filter(|&core| self.get(core) == CoreState::Running)
            .fold(0, |mask, core| mask | core.mask())
    }
}
