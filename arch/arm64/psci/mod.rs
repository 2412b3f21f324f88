//! PSCI (Power State Coordination Interface) for ARM64
//!
//! Core power domains driven through PSCI v0.2 firmware calls.
//! Reference: ARM DEN 0022D - Power State Coordination Interface

use super::mpidr_affinity;
use crate::config::{HotplugConfig, MAX_CPUS};
use crate::hotplug::{CoreId, PowerController, PowerError};
use crate::utils::spin_until;

/// PSCI v0.2 function base
pub const PSCI_0_2_FN_BASE: u32 = 0x84000000;

/// PSCI v0.2 64-bit function base
pub const PSCI_0_2_FN64_BASE: u32 = 0xC4000000;

/// PSCI function ID constructor
pub const fn psci_0_2_fn(n: u32) -> u32 {
    PSCI_0_2_FN_BASE + n
}

/// PSCI 64-bit function ID constructor
pub const fn psci_0_2_fn64(n: u32) -> u32 {
    PSCI_0_2_FN64_BASE + n
}

/// PSCI version
pub const PSCI_0_2_FN_PSCI_VERSION: u32 = psci_0_2_fn(0);
/// CPU off
pub const PSCI_0_2_FN_CPU_OFF: u32 = psci_0_2_fn(2);
/// CPU on (64-bit)
pub const PSCI_0_2_FN64_CPU_ON: u32 = psci_0_2_fn64(3);
/// Affinity info (64-bit)
pub const PSCI_0_2_FN64_AFFINITY_INFO: u32 = psci_0_2_fn64(4);

/// Default number of AFFINITY_INFO polls before giving up
pub const DEFAULT_POLL_LIMIT: u32 = 1 << 20;

/// PSCI return values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum PsciReturn {
    Success = 0,
    NotSupported = -1,
    InvalidParams = -2,
    Denied = -3,
    AlreadyOn = -4,
    OnPending = -5,
    InternalFailure = -6,
    NotPresent = -7,
    Disabled = -8,
}

impl PsciReturn {
    /// Convert from i64
    pub fn from_i64(val: i64) -> Self {
        match val {
            0 => Self::Success,
            -1 => Self::NotSupported,
            -2 => Self::InvalidParams,
            -3 => Self::Denied,
            -4 => Self::AlreadyOn,
            -5 => Self::OnPending,
            -7 => Self::NotPresent,
            -8 => Self::Disabled,
            _ => Self::InternalFailure,
        }
    }

    /// Convert to a power controller result
    pub fn into_result(self) -> Result<(), PowerError> {
        match self {
            Self::Success => Ok(()),
            Self::NotSupported => Err(PowerError::NotSupported),
            Self::InvalidParams => Err(PowerError::InvalidParameters),
            Self::Denied => Err(PowerError::Denied),
            Self::AlreadyOn => Err(PowerError::AlreadyOn),
            Self::OnPending => Err(PowerError::OnPending),
            Self::InternalFailure => Err(PowerError::InternalFailure),
            Self::NotPresent => Err(PowerError::NotPresent),
            Self::Disabled => Err(PowerError::Disabled),
        }
    }
}

/// AFFINITY_INFO result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffinityState {
    /// At least one core in the affinity instance is on
    On,
    /// All cores in the affinity instance are off
    Off,
    /// A CPU_ON for the instance is in progress
    OnPending,
}

/// Firmware call instruction
pub trait PsciConduit: Sync {
    /// Issue PSCI `function` with up to three arguments, returning x0
    fn call(&self, function: u32, arg0: u64, arg1: u64, arg2: u64) -> i64;
}

/// PSCI through `smc #0` (firmware at EL3)
pub struct Smc;

/// PSCI through `hvc #0` (firmware emulated by a hypervisor)
pub struct Hvc;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        impl PsciConduit for Smc {
            fn call(&self, function: u32, arg0: u64, arg1: u64, arg2: u64) -> i64 {
                let ret: u64;
                // SAFETY: SMCCC call; the firmware leaves the stack alone. SMCCC
                // v1.0 may corrupt x4-x17, hence the system ABI clobbers.
                unsafe {
                    core::arch::asm!(
                        "smc #0",
                        inlateout("x0") function as u64 => ret,
                        inlateout("x1") arg0 => _,
                        inlateout("x2") arg1 => _,
                        inlateout("x3") arg2 => _,
                        clobber_abi("system"),
                        options(nostack)
                    );
                }
                ret as i64
            }
        }

        impl PsciConduit for Hvc {
            fn call(&self, function: u32, arg0: u64, arg1: u64, arg2: u64) -> i64 {
                let ret: u64;
                // SAFETY: SMCCC call; the hypervisor leaves the stack alone. SMCCC
                // v1.0 may corrupt x4-x17, hence the system ABI clobbers.
                unsafe {
                    core::arch::asm!(
                        "hvc #0",
                        inlateout("x0") function as u64 => ret,
                        inlateout("x1") arg0 => _,
                        inlateout("x2") arg1 => _,
                        inlateout("x3") arg2 => _,
                        clobber_abi("system"),
                        options(nostack)
                    );
                }
                ret as i64
            }
        }
    } else {
        impl PsciConduit for Smc {
            fn call(&self, _function: u32, _arg0: u64, _arg1: u64, _arg2: u64) -> i64 {
                PsciReturn::NotSupported as i64
            }
        }

        impl PsciConduit for Hvc {
            fn call(&self, _function: u32, _arg0: u64, _arg1: u64, _arg2: u64) -> i64 {
                PsciReturn::NotSupported as i64
            }
        }
    }
}

/// PSCI-backed power controller
pub struct PsciPowerController<C: PsciConduit> {
    conduit: C,
    entry_point: u64,
    mpidrs: [u64; MAX_CPUS],
    poll_limit: u32,
}

impl<C: PsciConduit> PsciPowerController<C> {
    /// Create a controller
    ///
    /// `entry_point` is the physical address secondaries start at after
    /// CPU_ON; `mpidrs` maps core ids to MPIDR_EL1 values, of which only
    /// the affinity fields reach the firmware.
    pub const fn new(conduit: C, entry_point: u64, mpidrs: [u64; MAX_CPUS]) -> Self {
        Self {
            conduit,
            entry_point,
            mpidrs,
            poll_limit: DEFAULT_POLL_LIMIT,
        }
    }

    /// Create a controller booting secondaries at `config.secondary_entry`
    pub fn from_config(conduit: C, config: &HotplugConfig, mpidrs: [u64; MAX_CPUS]) -> Self {
        Self::new(conduit, config.secondary_entry, mpidrs)
    }

    /// Set the AFFINITY_INFO poll budget (0 = unbounded)
    pub fn with_poll_limit(mut self, poll_limit: u32) -> Self {
        self.poll_limit = poll_limit;
        self
    }

    fn mpidr(&self, core: CoreId) -> u64 {
        mpidr_affinity(self.mpidrs[core.index()])
    }

    /// PSCI version as (major, minor)
    pub fn version(&self) -> (u16, u16) {
        let ver = self.conduit.call(PSCI_0_2_FN_PSCI_VERSION, 0, 0, 0) as u32;
        ((ver >> 16) as u16, ver as u16)
    }

    /// Query the power state of `core`
    pub fn affinity_info(&self, core: CoreId) -> Result<AffinityState, PowerError> {
        match self.conduit.call(PSCI_0_2_FN64_AFFINITY_INFO, self.mpidr(core), 0, 0) {
            0 => Ok(AffinityState::On),
            1 => Ok(AffinityState::Off),
            2 => Ok(AffinityState::OnPending),
            err => PsciReturn::from_i64(err)
                .into_result()
                .and(Err(PowerError::InternalFailure)),
        }
    }

    fn wait_for(&self, core: CoreId, want: AffinityState) -> Result<(), PowerError> {
        let mut failure = None;
        let reached = spin_until(self.poll_limit, || match self.affinity_info(core) {
            Ok(state) => state == want,
            Err(e) => {
                failure = Some(e);
                true
            }
        });

        match failure {
            Some(e) => Err(e),
            None if reached => Ok(()),
            None => Err(PowerError::Timeout),
        }
    }
}

impl<C: PsciConduit> PowerController for PsciPowerController<C> {
    fn cpu_off(&self, core: CoreId) -> ! {
        let ret = PsciReturn::from_i64(self.conduit.call(PSCI_0_2_FN_CPU_OFF, 0, 0, 0));

        // CPU_OFF only returns on failure
        log::error!("PSCI: CPU_OFF on {} returned {:?}", core, ret);
        loop {
            crate::arch::wait_for_interrupt();
        }
    }

    fn domain_power_off(&self, core: CoreId) -> Result<(), PowerError> {
        self.wait_for(core, AffinityState::Off)
    }

    fn domain_power_on(&self, core: CoreId) -> Result<(), PowerError> {
        log::debug!(
            "PSCI: CPU_ON {} (MPIDR {:#x}, entry {:#x})",
            core,
            self.mpidr(core),
            self.entry_point
        );

        let ret = self.conduit.call(
            PSCI_0_2_FN64_CPU_ON,
            self.mpidr(core),
            self.entry_point,
            core.index() as u64,
        );
        PsciReturn::from_i64(ret).into_result()
    }

    fn secondary_boot(&self, core: CoreId) -> Result<(), PowerError> {
        self.wait_for(core, AffinityState::On)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::vec::Vec;

    /// Fake firmware: records calls, replays AFFINITY_INFO answers
    struct FakeFirmware {
        calls: Mutex<Vec<(u32, u64, u64, u64)>>,
        cpu_on: i64,
        affinity: Mutex<Vec<i64>>,
    }

    impl FakeFirmware {
        fn new(cpu_on: i64, affinity: &[i64]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                cpu_on,
                affinity: Mutex::new(affinity.iter().rev().copied().collect()),
            }
        }
    }

    impl PsciConduit for FakeFirmware {
        fn call(&self, function: u32, arg0: u64, arg1: u64, arg2: u64) -> i64 {
            self.calls.lock().unwrap().push((function, arg0, arg1, arg2));
            match function {
                PSCI_0_2_FN_PSCI_VERSION => 0x0001_0001,
                PSCI_0_2_FN64_CPU_ON => self.cpu_on,
                PSCI_0_2_FN64_AFFINITY_INFO => {
                    let mut answers = self.affinity.lock().unwrap();
                    if answers.len() > 1 {
                        answers.pop().unwrap()
                    } else {
                        answers[0]
                    }
                }
                _ => PsciReturn::NotSupported as i64,
            }
        }
    }

    const MPIDRS: [u64; MAX_CPUS] = [0x0, 0x1, 0x100, 0x101, 0x200, 0x201, 0x300, 0x301];

    fn core(raw: usize) -> CoreId {
        CoreId::new(raw).unwrap()
    }

    #[test]
    fn test_cpu_on_arguments() {
        let psci = PsciPowerController::new(FakeFirmware::new(0, &[0]), 0x4008_0000, MPIDRS);

        assert_eq!(psci.domain_power_on(core(2)), Ok(()));
        assert_eq!(
            psci.conduit.calls.lock().unwrap()[0],
            (PSCI_0_2_FN64_CPU_ON, 0x100, 0x4008_0000, 2)
        );
    }

    #[test]
    fn test_cpu_on_passes_affinity_only() {
        // Raw MPIDR_EL1 reads carry the RES1 bit 31 and the U bit
        let mut raw = MPIDRS;
        raw[2] = 0x8000_0100;
        raw[3] = 0xC000_0101;
        let psci = PsciPowerController::new(FakeFirmware::new(0, &[1]), 0x4008_0000, raw);

        psci.domain_power_on(core(2)).unwrap();
        psci.domain_power_off(core(3)).unwrap();

        let calls = psci.conduit.calls.lock().unwrap();
        assert_eq!(calls[0], (PSCI_0_2_FN64_CPU_ON, 0x100, 0x4008_0000, 2));
        assert_eq!(calls[1], (PSCI_0_2_FN64_AFFINITY_INFO, 0x101, 0, 0));
    }

    #[test]
    fn test_entry_point_from_config() {
        let config = HotplugConfig {
            secondary_entry: 0x8000_0000,
            ..HotplugConfig::default()
        };
        let psci = PsciPowerController::from_config(FakeFirmware::new(0, &[0]), &config, MPIDRS);

        psci.domain_power_on(core(3)).unwrap();
        assert_eq!(
            psci.conduit.calls.lock().unwrap()[0],
            (PSCI_0_2_FN64_CPU_ON, 0x101, 0x8000_0000, 3)
        );
    }

    #[test]
    fn test_cpu_on_error_mapping() {
        let psci = PsciPowerController::new(FakeFirmware::new(-4, &[0]), 0, MPIDRS);
        assert_eq!(psci.domain_power_on(core(1)), Err(PowerError::AlreadyOn));

        let psci = PsciPowerController::new(FakeFirmware::new(-42, &[0]), 0, MPIDRS);
        assert_eq!(psci.domain_power_on(core(1)), Err(PowerError::InternalFailure));
    }

    #[test]
    fn test_power_off_polls_until_off() {
        let psci = PsciPowerController::new(FakeFirmware::new(0, &[0, 0, 1]), 0, MPIDRS);

        assert_eq!(psci.domain_power_off(core(3)), Ok(()));
        assert_eq!(psci.conduit.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_boot_times_out() {
        let psci = PsciPowerController::new(FakeFirmware::new(0, &[2]), 0, MPIDRS)
            .with_poll_limit(8);

        assert_eq!(psci.secondary_boot(core(1)), Err(PowerError::Timeout));
    }

    #[test]
    fn test_affinity_info_error() {
        let psci = PsciPowerController::new(FakeFirmware::new(0, &[-2]), 0, MPIDRS);

        assert_eq!(
            psci.domain_power_off(core(1)),
            Err(PowerError::InvalidParameters)
        );
    }

    #[test]
    fn test_version() {
        let psci = PsciPowerController::new(FakeFirmware::new(0, &[0]), 0, MPIDRS);
        assert_eq!(psci.version(), (1, 1));
    }

    #[test]
    fn test_host_conduit_is_unsupported() {
        if cfg!(not(target_arch = "aarch64")) {
            let psci = PsciPowerController::new(Smc, 0, MPIDRS);
            assert_eq!(psci.domain_power_on(core(1)), Err(PowerError::NotSupported));
        }
    }
}
