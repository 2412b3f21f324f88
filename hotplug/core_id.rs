//! Validated core identifiers

use core::fmt;

use crate::config::MAX_CPUS;

/// Index of a physical core, always below [`MAX_CPUS`]
///
/// The controller additionally checks ids against the configured core
/// count before acting on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreId(usize);

impl CoreId {
    /// The boot core; always the controller and never a hotplug target
    pub const BOOT: CoreId = CoreId(0);

    /// Validate a raw core index
    pub const fn new(raw: usize) -> Option<Self> {
        if raw < MAX_CPUS {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Raw index
    pub const fn index(self) -> usize {
        self.0
    }

    /// Whether this is the boot core
    pub const fn is_boot(self) -> bool {
        self.0 == 0
    }

    /// Single-bit mask for this core
    pub const fn mask(self) -> u8 {
        1 << self.0
    }

    /// All core ids below `count`
    pub fn range(count: usize) -> impl Iterator<Item = CoreId> {
        (0..count.min(MAX_CPUS)).map(CoreId)
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, true ; "boot core")]
    #[test_case(MAX_CPUS - 1, true ; "last core")]
    #[test_case(MAX_CPUS, false ; "one past the end")]
    #[test_case(usize::MAX, false ; "garbage")]
    fn test_validation(raw: usize, valid: bool) {
        assert_eq!(CoreId::new(raw).is_some(), valid);
    }

    #[test]
    fn test_mask_and_display() {
        let core = CoreId::new(3).unwrap();
        assert_eq!(core.mask(), 0b1000);
        assert_eq!(core.index(), 3);
        assert!(!core.is_boot());
        assert!(CoreId::BOOT.is_boot());
        assert_eq!(std::format!("{}", core), "CPU3");
    }

    #[test]
    fn test_range_is_clamped() {
        assert_eq!(CoreId::range(3).count(), 3);
        assert_eq!(CoreId::range(MAX_CPUS + 4).count(), MAX_CPUS);
    }
}
