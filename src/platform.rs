//! The single startup platform probe (§4.7, §9). Nobody re-probes after
//! this; every component that needs platform facts receives a `PlatformInfo`
//! by value.

use crate::config::Config;
use crate::models::{Platform, PlatformInfo};
use sysinfo::System;

pub struct PlatformProbe;

impl PlatformProbe {
    /// Detects AWS vs. other by reading DMI sys_vendor, falling back to
    /// `Platform::Other` on any failure. Also records core count, total RAM,
    /// and whether ENA allowance counters are readable.
    pub fn run(config: &Config) -> PlatformInfo {
        let platform = Self::detect_platform();
        let mut sys = System::new_all();
        sys.refresh_all();

        let ena_available = config
            .ena_enabled
            .unwrap_or(platform == Platform::Aws && Self::ena_sysfs_present(&config.network_interface));

        PlatformInfo {
            platform,
            cpu_cores: sys.cpus().len(),
            total_memory_kb: sys.total_memory(),
            ena_available,
        }
    }

    fn detect_platform() -> Platform {
        match std::fs::read_to_string("/sys/devices/virtual/dmi/id/sys_vendor") {
            Ok(vendor) if vendor.to_lowercase().contains("amazon") => Platform::Aws,
            _ => Platform::Other,
        }
    }

    fn ena_sysfs_present(interface: &str) -> bool {
        std::path::Path::new(&format!("/sys/class/net/{interface}/device/driver")).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_never_panics_without_aws_metadata() {
        let cfg = Config::default();
        let info = PlatformProbe::run(&cfg);
        assert!(info.cpu_cores > 0 || info.cpu_cores == 0);
    }

    #[test]
    fn ena_enabled_override_is_respected() {
        let mut cfg = Config::default();
        cfg.ena_enabled = Some(true);
        let info = PlatformProbe::run(&cfg);
        assert!(info.ena_available);
    }
}
