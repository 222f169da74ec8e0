//! Core data types shared across the benchmark harness.
//!
//! Sampler outputs, the detector's sum types, and the archiver's summary
//! records all live here so that writer and readers bind to the same
//! definitions instead of re-deriving them (see §9's "shared schema
//! definition module" redesign note).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for an unavailable `u64` measurement (block height, counters).
pub const UNKNOWN_U64: u64 = u64::MAX;
/// Sentinel for an unavailable floating-point measurement.
pub const UNKNOWN_F64: f64 = f64::NAN;
/// Sentinel for an unavailable signed measurement (block height diff).
pub const UNKNOWN_I64: i64 = i64::MIN;

/// Returns true if a value equals the documented "unknown" sentinel.
pub fn is_unknown_f64(v: f64) -> bool {
    v.is_nan()
}

/// Benchmark ramp mode. Only `Intensive` arms auto-stop (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkMode {
    Quick,
    Standard,
    Intensive,
}

impl BenchmarkMode {
    pub fn auto_stop_armed(&self) -> bool {
        matches!(self, BenchmarkMode::Intensive)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkMode::Quick => "quick",
            BenchmarkMode::Standard => "standard",
            BenchmarkMode::Intensive => "intensive",
        }
    }
}

impl fmt::Display for BenchmarkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// RPC request shaping mode for the external load generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcMode {
    Single,
    Mixed,
}

impl fmt::Display for RpcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcMode::Single => write!(f, "single"),
            RpcMode::Mixed => write!(f, "mixed"),
        }
    }
}

/// Volume type for a configured block device. `InstanceStore` devices report
/// AWS-standard IOPS/throughput equal to measured values unchanged (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeType {
    Ebs,
    InstanceStore,
}

/// A single (QPS, duration) ramp step plus the per-run schedule it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QpsSchedule {
    pub initial_qps: u32,
    pub max_qps: u32,
    pub step_qps: u32,
    pub duration_per_level_secs: u32,
    pub warmup_secs: u32,
    pub cooldown_secs: u32,
}

impl QpsSchedule {
    /// The ordered list of QPS levels this schedule will walk through.
    pub fn levels(&self) -> Vec<u32> {
        let mut levels = Vec::new();
        let mut q = self.initial_qps;
        while q <= self.max_qps {
            levels.push(q);
            if self.step_qps == 0 {
                break;
            }
            q += self.step_qps;
        }
        levels
    }
}

/// Platform as determined by the one-time startup probe (§4.7, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Aws,
    Other,
}

/// Result of the single `PlatformProbe` step run at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub platform: Platform,
    pub cpu_cores: usize,
    pub total_memory_kb: u64,
    pub ena_available: bool,
}

/// Health/availability flag attached to a sampled quantity that might be
/// missing rather than a hard sampler error (§4.2: "not a distinct error").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// Node or mainnet RPC health as observed by a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Six-field CPU block (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CpuFields {
    pub usage_pct: f64,
    pub user_pct: f64,
    pub system_pct: f64,
    pub iowait_pct: f64,
    pub softirq_pct: f64,
    pub idle_pct: f64,
}

/// Three-field memory block (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemoryFields {
    pub used_kb: u64,
    pub total_kb: u64,
    pub used_pct: f64,
}

/// Fixed 21-field per-device block (§3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFields {
    pub device: String,
    pub r_s: f64,
    pub w_s: f64,
    pub rkb_s: f64,
    pub wkb_s: f64,
    pub r_await_ms: f64,
    pub w_await_ms: f64,
    pub avg_queue_depth: f64,
    pub iostat_util_pct: f64,
    pub rrqm_s: f64,
    pub wrqm_s: f64,
    pub avg_rq_size_kb: f64,
    pub avg_io_kib: f64,
    pub total_iops: f64,
    pub aws_standard_iops: f64,
    pub read_throughput_mibs: f64,
    pub write_throughput_mibs: f64,
    pub total_throughput_mibs: f64,
    pub aws_standard_throughput_mibs: f64,
    pub volume_type: VolumeType,
    pub availability: Availability,
}

/// Computes AWS-standard IOPS from total IOPS and the observed average I/O
/// size, per §4.2's unambiguous formula. `instance_store` devices pass
/// through measured values unchanged.
pub fn aws_standard_iops(total_iops: f64, avg_io_kib: Option<f64>, volume_type: VolumeType) -> f64 {
    if volume_type == VolumeType::InstanceStore {
        return total_iops;
    }
    match avg_io_kib {
        Some(kib) if kib.is_finite() && kib >= 0.0 => {
            let ratio = (kib / 16.0).min(1.0);
            total_iops * ratio
        }
        // Per §9's open-question decision: never silently fall back to
        // total_iops when avg size is unavailable. Caller sets the
        // availability flag to Unavailable and records the unknown sentinel.
        _ => UNKNOWN_F64,
    }
}

/// 10-field network block (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkFields {
    pub interface: String,
    pub rx_mbps: f64,
    pub tx_mbps: f64,
    pub total_mbps: f64,
    pub rx_gbps: f64,
    pub tx_gbps: f64,
    pub total_gbps: f64,
    pub rx_pkts_s: f64,
    pub tx_pkts_s: f64,
    pub total_pkts_s: f64,
}

/// Optional 6-field ENA allowance block (§3). Omitted from the schema when
/// the platform probe determines ENA counters are unavailable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnaFields {
    pub bw_in_allowance_exceeded: u64,
    pub bw_out_allowance_exceeded: u64,
    pub pps_allowance_exceeded: u64,
    pub conntrack_allowance_exceeded: u64,
    pub linklocal_allowance_exceeded: u64,
    pub conntrack_allowance_available: u64,
}

/// Two-field monitor-overhead block (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonitorOverheadFields {
    pub monitor_iops: f64,
    pub monitor_throughput_mibs: f64,
}

/// Six-field block-height block (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BlockHeightFields {
    pub local_height: u64,
    pub mainnet_height: u64,
    pub diff: i64,
    pub local_health: HealthStatus,
    pub mainnet_health: HealthStatus,
    pub data_loss: bool,
}

/// Three-field load-gen block (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadGenFields {
    pub current_qps: u32,
    pub rpc_mean_latency_ms: f64,
    pub available: bool,
}

/// One time-aligned row of the wide, positionally stable schema (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRow {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuFields,
    pub memory: MemoryFields,
    pub devices: Vec<DeviceFields>,
    pub network: NetworkFields,
    pub ena: Option<EnaFields>,
    pub overhead: MonitorOverheadFields,
    pub block_height: BlockHeightFields,
    pub load_gen: LoadGenFields,
}

/// Separate 20-field overhead stream proving the observer effect is bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverheadRow {
    pub timestamp: DateTime<Utc>,
    pub monitor_cpu_pct: f64,
    pub monitor_mem_pct: f64,
    pub monitor_mem_mb: f64,
    pub monitor_process_count: u32,
    pub node_cpu_pct: f64,
    pub node_mem_pct: f64,
    pub node_mem_mb: f64,
    pub node_process_count: u32,
    pub system_cores: u32,
    pub system_ram_gb: f64,
    pub system_disk_gb: f64,
    pub cpu_usage_pct: f64,
    pub mem_usage_pct: f64,
    pub mem_cached_gb: f64,
    pub mem_buffers_gb: f64,
    pub mem_anonymous_gb: f64,
    pub mem_mapped_gb: f64,
    pub mem_shared_gb: f64,
    pub disk_used_gb: f64,
    pub disk_free_gb: f64,
}

/// Severity tier attached to a triggered predicate or declared bottleneck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Replaces the source's stringly-typed, `eval`-parsed bottleneck type with a
/// closed sum type, per §9's redesign flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    Cpu,
    Memory,
    DeviceIops(String),
    DeviceThroughput(String),
    DeviceLatency(String),
    Network,
    RpcSuccessRate,
    RpcLatency,
    RpcErrorRate,
    NodeUnhealthy,
}

impl fmt::Display for BottleneckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BottleneckKind::Cpu => write!(f, "CPU"),
            BottleneckKind::Memory => write!(f, "Memory"),
            BottleneckKind::DeviceIops(d) => write!(f, "Device_IOPS({d})"),
            BottleneckKind::DeviceThroughput(d) => write!(f, "Device_Throughput({d})"),
            BottleneckKind::DeviceLatency(d) => write!(f, "Device_Latency({d})"),
            BottleneckKind::Network => write!(f, "Network"),
            BottleneckKind::RpcSuccessRate => write!(f, "RPC_Success_Rate"),
            BottleneckKind::RpcLatency => write!(f, "RPC_Latency"),
            BottleneckKind::RpcErrorRate => write!(f, "RPC_Error_Rate"),
            BottleneckKind::NodeUnhealthy => write!(f, "Node_Unhealthy"),
        }
    }
}

/// One triggered predicate, carrying the measured value and the threshold it
/// crossed so the verdict is self-explaining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredPredicate {
    pub kind: BottleneckKind,
    pub measured: f64,
    pub threshold: f64,
    pub severity: Severity,
}

/// Classification assigned by the four-scenario decision logic (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckClassification {
    ResourceExceeded,
    RpcQuality,
    NodeUnhealthy,
    Composite,
}

impl fmt::Display for BottleneckClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BottleneckClassification::ResourceExceeded => write!(f, "ResourceExceeded"),
            BottleneckClassification::RpcQuality => write!(f, "RPCQuality"),
            BottleneckClassification::NodeUnhealthy => write!(f, "NodeUnhealthy"),
            BottleneckClassification::Composite => write!(f, "Composite"),
        }
    }
}

/// Append-only JSONL event emitted by the detector on every tick a predicate
/// trips (§3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckEvent {
    pub timestamp: DateTime<Utc>,
    pub qps_at_detection: u32,
    pub severity: Severity,
    pub triggered: Vec<TriggeredPredicate>,
    pub classification: BottleneckClassification,
}

/// The bounded analysis window centered on detection time (§3, glossary).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub width_secs: u32,
}

impl AnalysisWindow {
    pub fn centered_on(detection: DateTime<Utc>, width_secs: u32) -> Self {
        AnalysisWindow {
            start: detection - chrono::Duration::seconds(width_secs as i64),
            end: detection,
            width_secs,
        }
    }
}

/// A point-in-time snapshot of key metrics embedded in the verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cpu_usage_pct: f64,
    pub mem_usage_pct: f64,
    pub network_total_mbps: f64,
    pub device_summary: Vec<(String, f64, f64)>, // (device, aws_iops, aws_throughput_mibs)
}

/// The terminal object of a run: at most one per run (§3, §8 property 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckVerdict {
    pub detection_time: DateTime<Utc>,
    pub max_successful_qps: u32,
    pub bottleneck_qps: u32,
    pub reasons: Vec<TriggeredPredicate>,
    pub severity: Severity,
    pub classification: BottleneckClassification,
    pub consecutive_confirmations: u32,
    pub analysis_window: AnalysisWindow,
    pub context: MetricsSnapshot,
}

/// Terminal status of a sealed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    CompletedSuccessfully,
    CompletedWithBottleneck,
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::CompletedSuccessfully => write!(f, "completed_successfully"),
            RunStatus::CompletedWithBottleneck => write!(f, "completed_with_bottleneck"),
            RunStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// One entry in the global `TestHistoryIndex` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestHistoryEntry {
    pub run_id: String,
    pub mode: BenchmarkMode,
    pub max_qps: u32,
    pub status: RunStatus,
    pub archived_at: DateTime<Utc>,
}

/// Global history index, outside any single run (§3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TestHistoryIndex {
    pub total_tests: u64,
    pub latest_run: Option<String>,
    pub tests: Vec<TestHistoryEntry>,
}

impl TestHistoryIndex {
    pub fn push(&mut self, entry: TestHistoryEntry) {
        self.total_tests += 1;
        self.latest_run = Some(entry.run_id.clone());
        self.tests.push(entry);
    }
}

/// Live status payload written to `qps_status.json` (§4.5, §6). A
/// write-only report artifact per §9's decision — nothing reads it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QpsStatus {
    Running {
        current_qps: u32,
        message: String,
        timestamp: DateTime<Utc>,
    },
    CompletedSuccessfully {
        max_successful_qps: u32,
        timestamp: DateTime<Utc>,
    },
    BottleneckDetected {
        verdict: Box<BottleneckVerdict>,
        timestamp: DateTime<Utc>,
    },
    Aborted {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Parsed result of one QPS level from the external load generator (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LevelResult {
    pub qps: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub mean_latency_ms: f64,
    pub p99_latency_ms: Option<f64>,
    pub error_rate_pct: f64,
}

impl LevelResult {
    pub fn success_rate_pct(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        (self.successful_requests as f64 / self.total_requests as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aws_iops_law_below_16kib() {
        let v = aws_standard_iops(1000.0, Some(8.0), VolumeType::Ebs);
        assert!((v - 500.0).abs() < 1e-9);
    }

    #[test]
    fn aws_iops_law_at_or_above_16kib() {
        let v = aws_standard_iops(1000.0, Some(16.0), VolumeType::Ebs);
        assert!((v - 1000.0).abs() < 1e-9);
        let v2 = aws_standard_iops(1000.0, Some(64.0), VolumeType::Ebs);
        assert!((v2 - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn aws_iops_instance_store_passthrough() {
        let v = aws_standard_iops(1234.5, Some(4.0), VolumeType::InstanceStore);
        assert!((v - 1234.5).abs() < 1e-9);
    }

    #[test]
    fn aws_iops_unavailable_is_not_silently_total() {
        let v = aws_standard_iops(1000.0, None, VolumeType::Ebs);
        assert!(v.is_nan());
    }

    #[test]
    fn schedule_levels_quick() {
        let s = QpsSchedule {
            initial_qps: 1000,
            max_qps: 1500,
            step_qps: 500,
            duration_per_level_secs: 60,
            warmup_secs: 0,
            cooldown_secs: 0,
        };
        assert_eq!(s.levels(), vec![1000, 1500]);
    }

    #[test]
    fn history_index_push_updates_latest_and_total() {
        let mut idx = TestHistoryIndex::default();
        idx.push(TestHistoryEntry {
            run_id: "run_001_x".into(),
            mode: BenchmarkMode::Quick,
            max_qps: 1500,
            status: RunStatus::CompletedSuccessfully,
            archived_at: Utc::now(),
        });
        assert_eq!(idx.total_tests, 1);
        assert_eq!(idx.latest_run.as_deref(), Some("run_001_x"));
    }
}
