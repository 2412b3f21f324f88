//! Hotplug handshake signal
//!
//! One atomic per target core carries the whole rendezvous between the
//! controller and the target's interrupt handler. Each signal value maps
//! onto the classic pair of "requested"/"handled" flag locks:
//!
//! | signal         | requested | handled |
//! |----------------|-----------|---------|
//! | `Idle`         | free      | free    |
//! | `Requested`    | held      | free    |
//! | `Claimed`      | held      | held    |
//! | `Acknowledged` | free      | held    |
//!
//! Legal edges:
//!
//! ```text
//! Idle --request--> Requested --claim--> Claimed --acknowledge--> Acknowledged
//!  ^                    |                                              |
//!  +-----withdraw-------+                                              |
//!  +--------------------------------reset------------------------------+
//! ```
//!
//! Every edge is a single compare-exchange, so a withdrawal and a handler
//! claim can never both win.

use core::sync::atomic::{AtomicU8, Ordering};

use super::CoreId;
use crate::config::MAX_CPUS;
use crate::utils::{cpu_relax, spin_until};

/// Handshake state of one target core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeSignal {
    /// No request in flight
    Idle = 0,
    /// Controller committed a request; target has not reacted yet
    Requested = 1,
    /// Target handler committed; controller still waiting
    Claimed = 2,
    /// Target handler signalled completion; held until the core is back
    Acknowledged = 3,
}

impl HandshakeSignal {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Requested,
            2 => Self::Claimed,
            _ => Self::Acknowledged,
        }
    }

    /// Whether `self -> to` is a legal edge
    pub fn can_become(self, to: HandshakeSignal) -> bool {
        use HandshakeSignal::*;
        matches!(
            (self, to),
            (Idle, Requested)
                | (Requested, Idle)
                | (Requested, Claimed)
                | (Claimed, Acknowledged)
                | (Acknowledged, Idle)
        )
    }

    /// "requested" view: a request is outstanding
    pub fn is_requested(self) -> bool {
        matches!(self, Self::Requested | Self::Claimed)
    }

    /// "handled" view: the target handler has committed
    pub fn is_handled(self) -> bool {
        matches!(self, Self::Claimed | Self::Acknowledged)
    }

    /// Get signal name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requested => "requested",
            Self::Claimed => "claimed",
            Self::Acknowledged => "acknowledged",
        }
    }
}

/// Handshake of one target core
pub struct Handshake {
    signal: AtomicU8,
}

impl Handshake {
    /// Create an idle handshake
    pub const fn new() -> Self {
        Self {
            signal: AtomicU8::new(HandshakeSignal::Idle as u8),
        }
    }

    /// Current signal
    pub fn signal(&self) -> HandshakeSignal {
        HandshakeSignal::from_raw(self.signal.load(Ordering::Acquire))
    }

    /// "requested" lock view
    pub fn is_requested(&self) -> bool {
        self.signal().is_requested()
    }

    /// "handled" lock view
    pub fn is_handled(&self) -> bool {
        self.signal().is_handled()
    }

    /// Attempt `from -> to`, returning the observed signal on failure
    fn transition(&self, from: HandshakeSignal, to: HandshakeSignal) -> Result<(), HandshakeSignal> {
        crate::protocol_assert!(
            from.can_become(to),
            "illegal handshake edge {} -> {}",
            from.as_str(),
            to.as_str()
        );

        self.signal
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(HandshakeSignal::from_raw)
    }

    /// Controller: commit a request
    ///
    /// Spins while another controller's request for this core is in flight.
    /// Fails with `Acknowledged` if a previous request completed and the core
    /// has not been brought back yet.
    pub fn request(&self) -> Result<(), HandshakeSignal> {
        loop {
            match self.transition(HandshakeSignal::Idle, HandshakeSignal::Requested) {
                Ok(()) => return Ok(()),
                Err(HandshakeSignal::Requested | HandshakeSignal::Claimed) => cpu_relax(),
                Err(other) => return Err(other),
            }
        }
    }

    /// Controller: take back a request the target has not claimed yet
    pub fn withdraw(&self) -> Result<(), HandshakeSignal> {
        self.transition(HandshakeSignal::Requested, HandshakeSignal::Idle)
    }

    /// Target: commit to handling the outstanding request
    pub fn claim(&self) -> Result<(), HandshakeSignal> {
        self.transition(HandshakeSignal::Requested, HandshakeSignal::Claimed)
    }

    /// Target: signal completion to the waiting controller
    pub fn acknowledge(&self) {
        let result = self.transition(HandshakeSignal::Claimed, HandshakeSignal::Acknowledged);
        crate::protocol_assert!(
            result.is_ok(),
            "acknowledge from {} instead of claimed",
            self.signal().as_str()
        );
    }

    /// Power-on path: return a completed handshake to rest
    ///
    /// A handshake that is already idle is left alone.
    pub fn reset(&self) {
        match self.transition(HandshakeSignal::Acknowledged, HandshakeSignal::Idle) {
            Ok(()) | Err(HandshakeSignal::Idle) => {}
            Err(other) => crate::protocol_assert!(
                false,
                "reset of in-flight handshake ({})",
                other.as_str()
            ),
        }
    }

    /// Controller: wait until the request is no longer outstanding
    ///
    /// Returns the settled signal (`Idle` or `Acknowledged`), or `None` if
    /// `limit` spins pass first. A `limit` of zero waits forever.
    pub fn wait_settled(&self, limit: u32) -> Option<HandshakeSignal> {
        let mut settled = self.signal();
        if spin_until(limit, || {
            settled = self.signal();
            !settled.is_requested()
        }) {
            Some(settled)
        } else {
            None
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

/// Handshakes for all cores
pub struct HandshakeTable {
    entries: [Handshake; MAX_CPUS],
}

impl HandshakeTable {
    /// Create a table with every handshake idle
    pub fn new() -> Self {
        Self {
            entries: core::array::from_fn(|_| Handshake::new()),
        }
    }

    /// Handshake of `core`
    pub fn get(&self, core: CoreId) -> &Handshake {
        &self.entries[core.index()]
    }
}

impl Default for HandshakeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use HandshakeSignal::*;

    #[test_case(Idle, false, false)]
    #[test_case(Requested, true, false)]
    #[test_case(Claimed, true, true)]
    #[test_case(Acknowledged, false, true)]
    fn test_lock_views(signal: HandshakeSignal, requested: bool, handled: bool) {
        assert_eq!(signal.is_requested(), requested);
        assert_eq!(signal.is_handled(), handled);
    }

    #[test]
    fn test_complete_cycle() {
        let hs = Handshake::new();
        hs.request().unwrap();
        assert_eq!(hs.signal(), Requested);
        hs.claim().unwrap();
        hs.acknowledge();
        assert_eq!(hs.wait_settled(1), Some(Acknowledged));
        hs.reset();
        assert_eq!(hs.signal(), Idle);
    }

    #[test]
    fn test_withdraw_beats_late_claim() {
        let hs = Handshake::new();
        hs.request().unwrap();
        hs.withdraw().unwrap();
        assert_eq!(hs.claim(), Err(Idle));
        assert_eq!(hs.wait_settled(1), Some(Idle));
    }

    #[test]
    fn test_claim_beats_late_withdraw() {
        let hs = Handshake::new();
        hs.request().unwrap();
        hs.claim().unwrap();
        assert_eq!(hs.withdraw(), Err(Claimed));
    }

    #[test]
    fn test_request_refused_while_acknowledged() {
        let hs = Handshake::new();
        hs.request().unwrap();
        hs.claim().unwrap();
        hs.acknowledge();
        assert_eq!(hs.request(), Err(Acknowledged));
    }

    #[test]
    fn test_wait_times_out_while_outstanding() {
        let hs = Handshake::new();
        hs.request().unwrap();
        assert_eq!(hs.wait_settled(16), None);
    }

    #[test]
    fn test_reset_of_idle_is_noop() {
        let hs = Handshake::new();
        hs.reset();
        assert_eq!(hs.signal(), Idle);
    }

    #[test]
    #[should_panic(expected = "reset of in-flight handshake")]
    fn test_reset_of_outstanding_request_is_fatal() {
        let hs = Handshake::new();
        hs.request().unwrap();
        hs.reset();
    }

    #[test]
    #[should_panic(expected = "acknowledge from idle")]
    fn test_acknowledge_without_claim_is_fatal() {
        Handshake::new().acknowledge();
    }

    #[test]
    fn test_table_is_per_core() {
        let table = HandshakeTable::new();
        let one = CoreId::new(1).unwrap();
        let two = CoreId::new(2).unwrap();
        table.get(one).request().unwrap();
        assert!(table.get(one).is_requested());
        assert!(!table.get(two).is_requested());
    }
}
