//! Configuration management
//!
//! Build-time limits and the runtime settings of the hotplug subsystem.

use crate::{Error, Result};

/// Maximum number of cores the subsystem can manage
///
/// Bounded by the 8-bit CPU target list of a GICv2 SGI.
pub const MAX_CPUS: usize = 8;

/// Maximum number of registered hotplug notifiers
pub const MAX_NOTIFIERS: usize = 8;

/// Number of software-generated interrupt ids on a GIC
pub const NUM_SGIS: u32 = 16;

/// Number of GIC active priority levels tracked by the APR registers
pub const NUM_PRIORITY_LEVELS: u32 = 128;

/// Hotplug configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotplugConfig {
    /// Number of cores present, including the boot core
    pub num_cpus: usize,
    /// SGI used as the hotplug IPI
    pub hotplug_sgi: u32,
    /// Active priority level the hotplug SGI is serviced at
    pub ipi_priority_level: u32,
    /// Active priority level used by the resume/boot path
    pub resume_priority_level: u32,
    /// Controller spin budget while waiting for the target (0 = unbounded)
    pub handshake_spin_limit: u32,
    /// Physical address secondary cores start executing at
    pub secondary_entry: u64,
}

impl Default for HotplugConfig {
    fn default() -> Self {
        Self {
            num_cpus: 4,
            hotplug_sgi: 9,
            ipi_priority_level: 0,
            resume_priority_level: 1,
            handshake_spin_limit: 0,
            secondary_entry: 0,
        }
    }
}

impl HotplugConfig {
    /// Default configuration for `num_cpus` cores
    pub fn with_cpus(num_cpus: usize) -> Self {
        Self {
            num_cpus,
            ..Self::default()
        }
    }

    /// Set the handshake spin budget
    pub fn spin_limit(mut self, limit: u32) -> Self {
        self.handshake_spin_limit = limit;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_cpus == 0 || self.num_cpus > MAX_CPUS {
            return Err(Error::InvalidArgument);
        }

        if self.hotplug_sgi >= NUM_SGIS {
            return Err(Error::InvalidArgument);
        }

        if self.ipi_priority_level >= NUM_PRIORITY_LEVELS
            || self.resume_priority_level >= NUM_PRIORITY_LEVELS
        {
            return Err(Error::InvalidArgument);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config_is_valid() {
        let config = HotplugConfig::default();
        assert_eq!(config.num_cpus, 4);
        assert!(config.validate().is_ok());
    }

    #[test_case(0 ; "no cores")]
    #[test_case(MAX_CPUS + 1 ; "too many cores")]
    fn test_rejects_core_count(num_cpus: usize) {
        let config = HotplugConfig::with_cpus(num_cpus);
        assert_eq!(config.validate(), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_rejects_non_sgi_vector() {
        let config = HotplugConfig {
            hotplug_sgi: NUM_SGIS,
            ..HotplugConfig::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_rejects_priority_level() {
        let config = HotplugConfig {
            resume_priority_level: NUM_PRIORITY_LEVELS,
            ..HotplugConfig::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_builder_helpers() {
        let config = HotplugConfig::with_cpus(MAX_CPUS).spin_limit(64);
        assert_eq!(config.num_cpus, MAX_CPUS);
        assert_eq!(config.handshake_spin_limit, 64);
        assert!(config.validate().is_ok());
    }
}
