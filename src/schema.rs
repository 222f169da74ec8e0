//! Shared CSV schema definitions for `MetricsRow` and `OverheadRow`.
//!
//! Per §9's "CSV positional field maps recomputed by every consumer"
//! anti-pattern: the writer and any reader both bind to the functions here
//! instead of re-deriving column positions from a header line by hand.

use crate::config::Config;
use crate::models::{DeviceFields, MetricsRow, OverheadRow};

/// Column header for one device's 21-field block, qualified by device name.
fn device_header(name: &str) -> Vec<String> {
    [
        "r_s", "w_s", "rkb_s", "wkb_s", "r_await_ms", "w_await_ms", "avg_queue_depth",
        "iostat_util_pct", "rrqm_s", "wrqm_s", "avg_rq_size_kb", "avg_io_kib", "total_iops",
        "aws_standard_iops", "read_throughput_mibs", "write_throughput_mibs",
        "total_throughput_mibs", "aws_standard_throughput_mibs", "volume_type", "availability",
    ]
    .iter()
    .map(|field| format!("{name}.{field}"))
    .chain(std::iter::once(format!("{name}.device")))
    .collect()
}

/// Full column header for the `MetricsRow` schema, derived from `Config`
/// (device list, ENA presence) so it is fixed once per run.
pub fn metrics_header(config: &Config, ena_present: bool) -> Vec<String> {
    let mut header = vec!["timestamp".to_string()];
    header.extend(
        ["cpu.usage_pct", "cpu.user_pct", "cpu.system_pct", "cpu.iowait_pct", "cpu.softirq_pct", "cpu.idle_pct"]
            .iter()
            .map(|s| s.to_string()),
    );
    header.extend(["memory.used_kb", "memory.total_kb", "memory.used_pct"].iter().map(|s| s.to_string()));
    for device in &config.devices {
        header.extend(device_header(&device.name));
    }
    header.extend(
        [
            "network.interface", "network.rx_mbps", "network.tx_mbps", "network.total_mbps",
            "network.rx_gbps", "network.tx_gbps", "network.total_gbps", "network.rx_pkts_s",
            "network.tx_pkts_s", "network.total_pkts_s",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    if ena_present {
        header.extend(
            [
                "ena.bw_in_allowance_exceeded", "ena.bw_out_allowance_exceeded",
                "ena.pps_allowance_exceeded", "ena.conntrack_allowance_exceeded",
                "ena.linklocal_allowance_exceeded", "ena.conntrack_allowance_available",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }
    header.extend(["overhead.monitor_iops", "overhead.monitor_throughput_mibs"].iter().map(|s| s.to_string()));
    header.extend(
        [
            "block_height.local", "block_height.mainnet", "block_height.diff",
            "block_height.local_health", "block_height.mainnet_health", "block_height.data_loss",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    header.extend(["load_gen.current_qps", "load_gen.rpc_mean_latency_ms", "load_gen.available"].iter().map(|s| s.to_string()));
    header
}

/// Expected row width for this run's configuration, used to assert
/// invariant (a) (constant schema width) before every append.
pub fn metrics_width(config: &Config, ena_present: bool) -> usize {
    metrics_header(config, ena_present).len()
}

fn device_fields(fields: &DeviceFields) -> Vec<String> {
    vec![
        fmt_f64(fields.r_s),
        fmt_f64(fields.w_s),
        fmt_f64(fields.rkb_s),
        fmt_f64(fields.wkb_s),
        fmt_f64(fields.r_await_ms),
        fmt_f64(fields.w_await_ms),
        fmt_f64(fields.avg_queue_depth),
        fmt_f64(fields.iostat_util_pct),
        fmt_f64(fields.rrqm_s),
        fmt_f64(fields.wrqm_s),
        fmt_f64(fields.avg_rq_size_kb),
        fmt_f64(fields.avg_io_kib),
        fmt_f64(fields.total_iops),
        fmt_f64(fields.aws_standard_iops),
        fmt_f64(fields.read_throughput_mibs),
        fmt_f64(fields.write_throughput_mibs),
        fmt_f64(fields.total_throughput_mibs),
        fmt_f64(fields.aws_standard_throughput_mibs),
        format!("{:?}", fields.volume_type),
        format!("{:?}", fields.availability),
        fields.device.clone(),
    ]
}

fn fmt_f64(v: f64) -> String {
    if v.is_nan() {
        "unknown".to_string()
    } else {
        format!("{v:.4}")
    }
}

/// Serializes one `MetricsRow` into the positional CSV record matching
/// `metrics_header`.
pub fn metrics_row_to_record(row: &MetricsRow) -> Vec<String> {
    let mut record = vec![row.timestamp.to_rfc3339()];
    record.extend([
        fmt_f64(row.cpu.usage_pct),
        fmt_f64(row.cpu.user_pct),
        fmt_f64(row.cpu.system_pct),
        fmt_f64(row.cpu.iowait_pct),
        fmt_f64(row.cpu.softirq_pct),
        fmt_f64(row.cpu.idle_pct),
    ]);
    record.extend([
        row.memory.used_kb.to_string(),
        row.memory.total_kb.to_string(),
        fmt_f64(row.memory.used_pct),
    ]);
    for device in &row.devices {
        record.extend(device_fields(device));
    }
    record.extend([
        row.network.interface.clone(),
        fmt_f64(row.network.rx_mbps),
        fmt_f64(row.network.tx_mbps),
        fmt_f64(row.network.total_mbps),
        fmt_f64(row.network.rx_gbps),
        fmt_f64(row.network.tx_gbps),
        fmt_f64(row.network.total_gbps),
        fmt_f64(row.network.rx_pkts_s),
        fmt_f64(row.network.tx_pkts_s),
        fmt_f64(row.network.total_pkts_s),
    ]);
    if let Some(ena) = &row.ena {
        record.extend([
            ena.bw_in_allowance_exceeded.to_string(),
            ena.bw_out_allowance_exceeded.to_string(),
            ena.pps_allowance_exceeded.to_string(),
            ena.conntrack_allowance_exceeded.to_string(),
            ena.linklocal_allowance_exceeded.to_string(),
            ena.conntrack_allowance_available.to_string(),
        ]);
    }
    record.extend([
        fmt_f64(row.overhead.monitor_iops),
        fmt_f64(row.overhead.monitor_throughput_mibs),
    ]);
    record.extend([
        row.block_height.local_height.to_string(),
        row.block_height.mainnet_height.to_string(),
        row.block_height.diff.to_string(),
        format!("{:?}", row.block_height.local_health),
        format!("{:?}", row.block_height.mainnet_health),
        row.block_height.data_loss.to_string(),
    ]);
    record.extend([
        row.load_gen.current_qps.to_string(),
        fmt_f64(row.load_gen.rpc_mean_latency_ms),
        row.load_gen.available.to_string(),
    ]);
    record
}

/// Fixed header for the 20-field `OverheadRow` schema.
pub fn overhead_header() -> Vec<String> {
    [
        "timestamp", "monitor_cpu_pct", "monitor_mem_pct", "monitor_mem_mb", "monitor_process_count",
        "node_cpu_pct", "node_mem_pct", "node_mem_mb", "node_process_count", "system_cores",
        "system_ram_gb", "system_disk_gb", "cpu_usage_pct", "mem_usage_pct", "mem_cached_gb",
        "mem_buffers_gb", "mem_anonymous_gb", "mem_mapped_gb", "mem_shared_gb", "disk_used_gb",
        "disk_free_gb",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn overhead_row_to_record(row: &OverheadRow) -> Vec<String> {
    vec![
        row.timestamp.to_rfc3339(),
        fmt_f64(row.monitor_cpu_pct),
        fmt_f64(row.monitor_mem_pct),
        fmt_f64(row.monitor_mem_mb),
        row.monitor_process_count.to_string(),
        fmt_f64(row.node_cpu_pct),
        fmt_f64(row.node_mem_pct),
        fmt_f64(row.node_mem_mb),
        row.node_process_count.to_string(),
        row.system_cores.to_string(),
        fmt_f64(row.system_ram_gb),
        fmt_f64(row.system_disk_gb),
        fmt_f64(row.cpu_usage_pct),
        fmt_f64(row.mem_usage_pct),
        fmt_f64(row.mem_cached_gb),
        fmt_f64(row.mem_buffers_gb),
        fmt_f64(row.mem_anonymous_gb),
        fmt_f64(row.mem_mapped_gb),
        fmt_f64(row.mem_shared_gb),
        fmt_f64(row.disk_used_gb),
        fmt_f64(row.disk_free_gb),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::*;
    use chrono::Utc;

    fn sample_row(config: &Config) -> MetricsRow {
        MetricsRow {
            timestamp: Utc::now(),
            cpu: CpuFields { usage_pct: 10.0, user_pct: 5.0, system_pct: 5.0, iowait_pct: 0.0, softirq_pct: 0.0, idle_pct: 90.0 },
            memory: MemoryFields { used_kb: 1000, total_kb: 2000, used_pct: 50.0 },
            devices: config
                .devices
                .iter()
                .map(|d| DeviceFields {
                    device: d.name.clone(),
                    r_s: 1.0, w_s: 1.0, rkb_s: 1.0, wkb_s: 1.0, r_await_ms: 1.0, w_await_ms: 1.0,
                    avg_queue_depth: 1.0, iostat_util_pct: 1.0, rrqm_s: 0.0, wrqm_s: 0.0,
                    avg_rq_size_kb: 4.0, avg_io_kib: 4.0, total_iops: 2.0, aws_standard_iops: 0.5,
                    read_throughput_mibs: 1.0, write_throughput_mibs: 1.0, total_throughput_mibs: 2.0,
                    aws_standard_throughput_mibs: 2.0, volume_type: d.volume_type, availability: Availability::Available,
                })
                .collect(),
            network: NetworkFields {
                interface: "eth0".into(), rx_mbps: 1.0, tx_mbps: 1.0, total_mbps: 2.0,
                rx_gbps: 0.001, tx_gbps: 0.001, total_gbps: 0.002, rx_pkts_s: 10.0, tx_pkts_s: 10.0, total_pkts_s: 20.0,
            },
            ena: None,
            overhead: MonitorOverheadFields { monitor_iops: 0.1, monitor_throughput_mibs: 0.01 },
            block_height: BlockHeightFields {
                local_height: 100, mainnet_height: 102, diff: 2, local_health: HealthStatus::Healthy,
                mainnet_health: HealthStatus::Healthy, data_loss: false,
            },
            load_gen: LoadGenFields { current_qps: 1000, rpc_mean_latency_ms: 5.0, available: true },
        }
    }

    #[test]
    fn header_and_row_widths_match() {
        let config = Config::default();
        let header = metrics_header(&config, false);
        let row = sample_row(&config);
        let record = metrics_row_to_record(&row);
        assert_eq!(header.len(), record.len());
        assert_eq!(header.len(), metrics_width(&config, false));
    }

    #[test]
    fn ena_presence_changes_width_by_six() {
        let config = Config::default();
        let without = metrics_width(&config, false);
        let with = metrics_width(&config, true);
        assert_eq!(with - without, 6);
    }

    #[test]
    fn overhead_header_has_twenty_fields() {
        assert_eq!(overhead_header().len(), 20);
    }
}
