//! Validates an assembled `Config` once, before any sampler starts.

use super::Config;
use crate::error::ConfigError;

/// Checks structural and range invariants. Runs once at startup; nothing
/// downstream re-validates.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.devices.is_empty() {
        return Err(ConfigError::ValidationFailed(
            "at least one device must be configured".to_string(),
        ));
    }
    for device in &config.devices {
        if device.baseline_iops <= 0.0 {
            return Err(ConfigError::ValidationFailed(format!(
                "device {} has non-positive baseline_iops",
                device.name
            )));
        }
        if device.baseline_throughput_mibs <= 0.0 {
            return Err(ConfigError::ValidationFailed(format!(
                "device {} has non-positive baseline_throughput_mibs",
                device.name
            )));
        }
    }

    validate_pct(config.thresholds.cpu_warn_pct, "cpu_warn_pct")?;
    validate_pct(config.thresholds.cpu_critical_pct, "cpu_critical_pct")?;
    validate_pct(config.thresholds.mem_warn_pct, "mem_warn_pct")?;
    validate_pct(config.thresholds.mem_critical_pct, "mem_critical_pct")?;
    validate_pct(config.thresholds.device_iops_warn_pct, "device_iops_warn_pct")?;
    validate_pct(
        config.thresholds.device_throughput_warn_pct,
        "device_throughput_warn_pct",
    )?;
    validate_pct(config.thresholds.network_warn_pct, "network_warn_pct")?;
    validate_pct(
        config.thresholds.rpc_success_rate_min_pct,
        "rpc_success_rate_min_pct",
    )?;
    validate_pct(config.thresholds.rpc_error_rate_warn_pct, "rpc_error_rate_warn_pct")?;

    if config.consecutive_confirmations_k == 0 {
        return Err(ConfigError::ValidationFailed(
            "consecutive_confirmations_k must be >= 1".to_string(),
        ));
    }

    if !config.paths.targets_file.exists() {
        return Err(ConfigError::TargetsFileMissing(
            config.paths.targets_file.display().to_string(),
        ));
    }

    if config.local_rpc.url.is_empty()
        || !(config.local_rpc.url.starts_with("http://") || config.local_rpc.url.starts_with("https://"))
    {
        return Err(ConfigError::ValidationFailed(format!(
            "local RPC endpoint is not well-formed: {}",
            config.local_rpc.url
        )));
    }

    Ok(())
}

fn validate_pct(value: f64, name: &str) -> Result<(), ConfigError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::ValidationFailed(format!(
            "{name} must be within 0.0..=100.0, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn config_with_targets_file() -> Config {
        let mut cfg = Config::default();
        let f = NamedTempFile::new().unwrap();
        cfg.paths.targets_file = f.path().to_path_buf();
        std::mem::forget(f); // keep the file alive for the duration of the test
        cfg
    }

    #[test]
    fn default_config_with_existing_targets_file_is_valid() {
        let cfg = config_with_targets_file();
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn empty_devices_rejected() {
        let mut cfg = config_with_targets_file();
        cfg.devices.clear();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut cfg = config_with_targets_file();
        cfg.thresholds.cpu_warn_pct = 150.0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn missing_targets_file_rejected() {
        let mut cfg = Config::default();
        cfg.paths.targets_file = "/nonexistent/targets.json".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::TargetsFileMissing(_))));
    }
}
