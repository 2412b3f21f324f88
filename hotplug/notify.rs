//! Hotplug event notification
//!
//! Subsystems that keep per-core bookkeeping (interrupt affinity, per-core
//! allocators, load balancing) register a notifier and hear about cores
//! coming and going. Notifiers run on the controller in thread context,
//! never inside the hotplug interrupt handler.

use heapless::Vec;

use super::CoreId;
use crate::config::MAX_NOTIFIERS;
use crate::kernel::sync::SpinLock;
use crate::{Error, Result};

/// CPU hotplug event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugEvent {
    /// CPU came online
    CpuOnline(CoreId),
    /// CPU went offline
    CpuOffline(CoreId),
    /// CPU online failed
    OnlineFailed(CoreId),
    /// CPU offline failed
    OfflineFailed(CoreId),
}

impl HotplugEvent {
    /// Core the event is about
    pub fn core(self) -> CoreId {
        match self {
            Self::CpuOnline(core)
            | Self::CpuOffline(core)
            | Self::OnlineFailed(core)
            | Self::OfflineFailed(core) => core,
        }
    }
}

/// CPU hotplug notification callback
pub trait HotplugNotifier: Sync {
    /// Called after each hotplug event
    fn notify(&self, event: HotplugEvent);
}

/// Fixed-capacity list of notifiers
pub struct NotifierChain {
    notifiers: SpinLock<Vec<&'static dyn HotplugNotifier, MAX_NOTIFIERS>>,
}

impl NotifierChain {
    /// Create an empty chain
    pub const fn new() -> Self {
        Self {
            notifiers: SpinLock::new(Vec::new()),
        }
    }

    /// Add a notifier
    pub fn register(&self, notifier: &'static dyn HotplugNotifier) -> Result<()> {
        self.notifiers
            .lock()
            .push(notifier)
            .map_err(|_| Error::NoSpace)
    }

    /// Number of registered notifiers
    pub fn len(&self) -> usize {
        self.notifiers.lock().len()
    }

    /// Whether no notifier is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every notifier
    pub fn send(&self, event: HotplugEvent) {
        log::debug!("Hotplug: Event {:?}", event);

        // Call out without the lock so a notifier may register another
        let snapshot = self.notifiers.lock().clone();
        for notifier in snapshot.iter() {
            notifier.notify(event);
        }
    }
}

impl Default for NotifierChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        online: AtomicUsize,
        offline: AtomicUsize,
    }

    impl HotplugNotifier for Counter {
        fn notify(&self, event: HotplugEvent) {
            match event {
                HotplugEvent::CpuOnline(_) => self.online.fetch_add(1, Ordering::SeqCst),
                HotplugEvent::CpuOffline(_) => self.offline.fetch_add(1, Ordering::SeqCst),
                _ => 0,
            };
        }
    }

    fn counter() -> &'static Counter {
        Box::leak(Box::new(Counter {
            online: AtomicUsize::new(0),
            offline: AtomicUsize::new(0),
        }))
    }

    #[test]
    fn test_events_reach_every_notifier() {
        let chain = NotifierChain::new();
        let a = counter();
        let b = counter();
        chain.register(a).unwrap();
        chain.register(b).unwrap();

        let core = CoreId::new(1).unwrap();
        chain.send(HotplugEvent::CpuOffline(core));
        chain.send(HotplugEvent::CpuOnline(core));
        chain.send(HotplugEvent::OfflineFailed(core));

        for c in [a, b] {
            assert_eq!(c.online.load(Ordering::SeqCst), 1);
            assert_eq!(c.offline.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_chain_capacity() {
        let chain = NotifierChain::new();
        let c = counter();
        for _ in 0..MAX_NOTIFIERS {
            chain.register(c).unwrap();
        }
        assert_eq!(chain.register(c), Err(Error::NoSpace));
        assert_eq!(chain.len(), MAX_NOTIFIERS);
    }

    #[test]
    fn test_event_core() {
        let core = CoreId::new(3).unwrap();
        assert_eq!(HotplugEvent::OnlineFailed(core).core(), core);
    }
}
