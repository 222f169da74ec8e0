//! Immutable configuration assembled once at startup.
//!
//! Nothing downstream of [`ConfigLoader::load`] mutates a `Config` or
//! re-reads environment/file state; every component receives its `Config`
//! (or a cheap clone of the fields it needs) at construction.

mod loader;
mod validator;

pub use loader::ConfigLoader;
pub use validator::validate;

use crate::models::VolumeType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One configured block device and its provisioned ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub baseline_iops: f64,
    pub baseline_throughput_mibs: f64,
    pub volume_type: VolumeType,
}

/// A single mode's default ramp schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModeDefaults {
    pub initial_qps: u32,
    pub max_qps: u32,
    pub step_qps: u32,
    pub duration_per_level_secs: u32,
    pub warmup_secs: u32,
    pub cooldown_secs: u32,
}

/// Filesystem roots the harness reads and writes under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub run_dir_root: PathBuf,
    pub archives_root: PathBuf,
    pub snapshot_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub targets_file: PathBuf,
}

/// All §4.4 detector thresholds, named rather than hard-coded per §9.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu_warn_pct: f64,
    pub cpu_critical_pct: f64,
    pub mem_warn_pct: f64,
    pub mem_critical_pct: f64,
    pub device_iops_warn_pct: f64,
    pub device_throughput_warn_pct: f64,
    pub device_latency_warn_ms: f64,
    pub network_warn_pct: f64,
    pub rpc_success_rate_min_pct: f64,
    pub rpc_latency_warn_ms: f64,
    pub rpc_error_rate_warn_pct: f64,
    pub rpc_error_rate_critical_delta_pct: f64,
    pub rpc_latency_critical_multiplier: f64,
    pub node_unhealthy_diff_threshold: i64,
    pub node_unhealthy_sustain_secs: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            cpu_warn_pct: 85.0,
            cpu_critical_pct: 95.0,
            mem_warn_pct: 90.0,
            mem_critical_pct: 95.0,
            device_iops_warn_pct: 90.0,
            device_throughput_warn_pct: 90.0,
            device_latency_warn_ms: 50.0,
            network_warn_pct: 80.0,
            rpc_success_rate_min_pct: 95.0,
            rpc_latency_warn_ms: 1000.0,
            rpc_error_rate_warn_pct: 5.0,
            rpc_error_rate_critical_delta_pct: 5.0,
            rpc_latency_critical_multiplier: 2.0,
            node_unhealthy_diff_threshold: 50,
            node_unhealthy_sustain_secs: 300,
        }
    }
}

/// RPC endpoint plus chain-agnostic method names (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEndpointConfig {
    pub url: String,
    pub health_method: String,
    pub height_method: String,
}

/// The fully assembled, validated configuration value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub devices: Vec<DeviceConfig>,
    pub network_interface: String,
    pub network_bandwidth_mbps: f64,
    pub local_rpc: RpcEndpointConfig,
    pub mainnet_rpc: RpcEndpointConfig,
    pub mainnet_cache_ttl_secs: u64,
    pub monitor_process_patterns: Vec<String>,
    pub node_process_patterns: Vec<String>,
    pub ena_enabled: Option<bool>,
    pub log_level: String,
    pub tick_interval_secs: u64,
    pub thresholds: Thresholds,
    pub consecutive_confirmations_k: u32,
    pub analysis_window_secs: u32,
    pub quick: ModeDefaults,
    pub standard: ModeDefaults,
    pub intensive: ModeDefaults,
    pub paths: Paths,
    pub level_gate_success_rate_pct: f64,
    pub level_gate_latency_ms: f64,
    pub load_gen_binary: PathBuf,
    pub load_gen_grace_period_secs: u64,
    pub sampler_retry_count: u32,
    pub history_keep_default: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            devices: vec![
                DeviceConfig {
                    name: "nvme0n1".to_string(),
                    baseline_iops: 3000.0,
                    baseline_throughput_mibs: 125.0,
                    volume_type: VolumeType::Ebs,
                },
                DeviceConfig {
                    name: "nvme1n1".to_string(),
                    baseline_iops: 3000.0,
                    baseline_throughput_mibs: 125.0,
                    volume_type: VolumeType::Ebs,
                },
            ],
            network_interface: "eth0".to_string(),
            network_bandwidth_mbps: 10000.0,
            local_rpc: RpcEndpointConfig {
                url: "http://127.0.0.1:8545".to_string(),
                health_method: "health".to_string(),
                height_method: "getBlockHeight".to_string(),
            },
            mainnet_rpc: RpcEndpointConfig {
                url: "https://api.mainnet-beta.example/rpc".to_string(),
                health_method: "health".to_string(),
                height_method: "getBlockHeight".to_string(),
            },
            mainnet_cache_ttl_secs: 3,
            monitor_process_patterns: vec!["chainbench".to_string()],
            node_process_patterns: vec!["node".to_string()],
            ena_enabled: None,
            log_level: "info".to_string(),
            tick_interval_secs: 5,
            thresholds: Thresholds::default(),
            consecutive_confirmations_k: 3,
            analysis_window_secs: 30,
            quick: ModeDefaults {
                initial_qps: 1000,
                max_qps: 1500,
                step_qps: 500,
                duration_per_level_secs: 60,
                warmup_secs: 0,
                cooldown_secs: 0,
            },
            standard: ModeDefaults {
                initial_qps: 1000,
                max_qps: 3000,
                step_qps: 500,
                duration_per_level_secs: 120,
                warmup_secs: 10,
                cooldown_secs: 10,
            },
            intensive: ModeDefaults {
                initial_qps: 1000,
                max_qps: 8000,
                step_qps: 500,
                duration_per_level_secs: 120,
                warmup_secs: 10,
                cooldown_secs: 10,
            },
            paths: Paths {
                run_dir_root: PathBuf::from("./runs"),
                archives_root: PathBuf::from("./archives"),
                snapshot_dir: PathBuf::from("/dev/shm/chainbench"),
                logs_dir: PathBuf::from("./logs"),
                targets_file: PathBuf::from("./targets.json"),
            },
            level_gate_success_rate_pct: 95.0,
            level_gate_latency_ms: 1000.0,
            load_gen_binary: PathBuf::from("vegeta"),
            load_gen_grace_period_secs: 10,
            sampler_retry_count: 3,
            history_keep_default: 10,
        }
    }
}

impl Config {
    pub fn schedule_for(&self, mode: crate::models::BenchmarkMode) -> crate::models::QpsSchedule {
        let d = match mode {
            crate::models::BenchmarkMode::Quick => self.quick,
            crate::models::BenchmarkMode::Standard => self.standard,
            crate::models::BenchmarkMode::Intensive => self.intensive,
        };
        crate::models::QpsSchedule {
            initial_qps: d.initial_qps,
            max_qps: d.max_qps,
            step_qps: d.step_qps,
            duration_per_level_secs: d.duration_per_level_secs,
            warmup_secs: d.warmup_secs,
            cooldown_secs: d.cooldown_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_nonempty_devices() {
        let cfg = Config::default();
        assert!(!cfg.devices.is_empty());
    }

    #[test]
    fn schedule_for_quick_matches_field() {
        let cfg = Config::default();
        let s = cfg.schedule_for(crate::models::BenchmarkMode::Quick);
        assert_eq!(s.initial_qps, cfg.quick.initial_qps);
        assert_eq!(s.max_qps, cfg.quick.max_qps);
    }
}
