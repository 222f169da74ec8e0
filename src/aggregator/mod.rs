//! Merges per-tick sampler outputs into one row of the wide, stable schema
//! (§4.3). Sole writer of the CSV file, the "latest" symlink, and the live
//! JSON snapshot; every other component only reads these artifacts.

use crate::config::Config;
use crate::error::AggregatorError;
use crate::models::{
    BlockHeightFields, CpuFields, DeviceFields, EnaFields, HealthStatus, LoadGenFields,
    MemoryFields, MetricsRow, MonitorOverheadFields, NetworkFields, UNKNOWN_I64, UNKNOWN_U64,
};
use crate::samplers::{NodeHeightSample, SamplerOutput};
use crate::schema;
use chrono::Utc;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};

/// Accumulates the partial results for one tick until every sampler has
/// reported or the tick's deadline has passed.
#[derive(Default)]
struct PartialRow {
    cpu: Option<CpuFields>,
    memory: Option<MemoryFields>,
    devices: HashMap<String, DeviceFields>,
    network: Option<NetworkFields>,
    ena: Option<EnaFields>,
    overhead: Option<MonitorOverheadFields>,
    local_node: Option<NodeHeightSample>,
    mainnet_node: Option<NodeHeightSample>,
    load_gen: Option<LoadGenFields>,
    /// Count of sampler reports applied this tick, success or failure alike.
    /// Every spawned sampler emits exactly one `SamplerOutput` per tick
    /// (samplers/mod.rs's per-sampler deadline turns a slow sampler into a
    /// `Failed` report rather than silence), so this converges to
    /// `expected_per_tick` for every tick and the row is never stuck waiting
    /// on a field a failed sampler will never supply.
    received: u32,
}

impl PartialRow {
    fn apply(&mut self, output: SamplerOutput) {
        self.received += 1;
        match output {
            SamplerOutput::Cpu(f) => self.cpu = Some(f),
            SamplerOutput::Memory(f) => self.memory = Some(f),
            SamplerOutput::Device(f) => {
                self.devices.insert(f.device.clone(), f);
            }
            SamplerOutput::Network(f) => self.network = Some(f),
            SamplerOutput::Ena(f) => self.ena = Some(f),
            SamplerOutput::Overhead(f) => self.overhead = Some(f),
            SamplerOutput::LocalNode(s) => self.local_node = Some(s),
            SamplerOutput::MainnetNode(s) => self.mainnet_node = Some(s),
            SamplerOutput::LoadGen(f) => self.load_gen = Some(f),
            SamplerOutput::Failed { sampler, error } => {
                log::warn!("sampler {sampler} failed this tick: {error}");
            }
        }
    }

    /// Fills any field a sampler didn't report this tick with its
    /// documented "unknown" value (§4.2: "missing fields are filled ...
    /// and the row still goes to the Aggregator").
    fn into_row(self, timestamp: chrono::DateTime<Utc>, device_order: &[String], node_diff_threshold: i64) -> MetricsRow {
        let local = self.local_node.unwrap_or(NodeHeightSample { height: UNKNOWN_U64, health: HealthStatus::Unhealthy });
        let mainnet = self.mainnet_node.unwrap_or(NodeHeightSample { height: UNKNOWN_U64, health: HealthStatus::Unhealthy });

        let both_failed = local.height == UNKNOWN_U64 && mainnet.height == UNKNOWN_U64;
        let both_unhealthy = local.health == HealthStatus::Unhealthy && mainnet.health == HealthStatus::Unhealthy;
        let heights_known = local.height != UNKNOWN_U64 && mainnet.height != UNKNOWN_U64;
        let diff = if heights_known {
            mainnet.height as i64 - local.height as i64
        } else {
            UNKNOWN_I64
        };
        let data_loss = both_failed || (heights_known && diff.abs() > node_diff_threshold.saturating_mul(100)) || both_unhealthy;

        let devices = device_order
            .iter()
            .map(|name| {
                self.devices.get(name).cloned().unwrap_or_else(|| DeviceFields {
                    device: name.clone(),
                    r_s: 0.0,
                    w_s: 0.0,
                    rkb_s: 0.0,
                    wkb_s: 0.0,
                    r_await_ms: 0.0,
                    w_await_ms: 0.0,
                    avg_queue_depth: 0.0,
                    iostat_util_pct: 0.0,
                    rrqm_s: 0.0,
                    wrqm_s: 0.0,
                    avg_rq_size_kb: 0.0,
                    avg_io_kib: crate::models::UNKNOWN_F64,
                    total_iops: 0.0,
                    aws_standard_iops: crate::models::UNKNOWN_F64,
                    read_throughput_mibs: 0.0,
                    write_throughput_mibs: 0.0,
                    total_throughput_mibs: 0.0,
                    aws_standard_throughput_mibs: 0.0,
                    volume_type: crate::models::VolumeType::Ebs,
                    availability: crate::models::Availability::Unavailable,
                })
            })
            .collect();

        MetricsRow {
            timestamp,
            cpu: self.cpu.unwrap_or(CpuFields { usage_pct: 0.0, user_pct: 0.0, system_pct: 0.0, iowait_pct: 0.0, softirq_pct: 0.0, idle_pct: 0.0 }),
            memory: self.memory.unwrap_or(MemoryFields { used_kb: 0, total_kb: 0, used_pct: 0.0 }),
            devices,
            network: self.network.unwrap_or(NetworkFields {
                interface: String::new(),
                rx_mbps: 0.0,
                tx_mbps: 0.0,
                total_mbps: 0.0,
                rx_gbps: 0.0,
                tx_gbps: 0.0,
                total_gbps: 0.0,
                rx_pkts_s: 0.0,
                tx_pkts_s: 0.0,
                total_pkts_s: 0.0,
            }),
            ena: self.ena,
            overhead: self.overhead.unwrap_or(MonitorOverheadFields { monitor_iops: 0.0, monitor_throughput_mibs: 0.0 }),
            block_height: BlockHeightFields {
                local_height: local.height,
                mainnet_height: mainnet.height,
                diff,
                local_health: local.health,
                mainnet_health: mainnet.health,
                data_loss,
            },
            load_gen: self.load_gen.unwrap_or(LoadGenFields { current_qps: 0, rpc_mean_latency_ms: 0.0, available: false }),
        }
    }
}

/// Owns the run's CSV writer, "latest" symlink, and live JSON snapshot.
pub struct Aggregator {
    config: Config,
    csv_path: PathBuf,
    csv_writer: csv::Writer<std::fs::File>,
    snapshot_path: PathBuf,
    device_order: Vec<String>,
    ena_present: bool,
    header_written: bool,
    latest_row_tx: watch::Sender<Option<MetricsRow>>,
}

impl Aggregator {
    pub fn new(config: Config, run_dir: &Path, run_id: &str, ena_present: bool) -> Result<(Self, watch::Receiver<Option<MetricsRow>>), AggregatorError> {
        std::fs::create_dir_all(run_dir)?;
        let csv_path = run_dir.join(format!("performance_{run_id}.csv"));
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&csv_path)?;
        let csv_writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        let device_order = config.devices.iter().map(|d| d.name.clone()).collect();
        let snapshot_dir = config.paths.snapshot_dir.clone();
        std::fs::create_dir_all(&snapshot_dir)?;
        let snapshot_path = snapshot_dir.join("metrics_latest.json");

        let (latest_row_tx, latest_row_rx) = watch::channel(None);

        Ok((
            Aggregator {
                config,
                csv_path,
                csv_writer,
                snapshot_path,
                device_order,
                ena_present,
                header_written: false,
                latest_row_tx,
            },
            latest_row_rx,
        ))
    }

    fn update_latest_symlink(&self, run_dir: &Path) -> Result<(), AggregatorError> {
        let link = run_dir.join("performance_latest.csv");
        if link.exists() || link.symlink_metadata().is_ok() {
            std::fs::remove_file(&link).map_err(|e| AggregatorError::SymlinkUpdate(e.to_string()))?;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(&self.csv_path, &link).map_err(|e| AggregatorError::SymlinkUpdate(e.to_string()))?;
        Ok(())
    }

    /// Write-temp-then-rename so readers never observe a partial document
    /// (§5, §8 property 5).
    fn write_snapshot(&self, row: &MetricsRow) -> Result<(), AggregatorError> {
        let tmp_path = self.snapshot_path.with_extension("json.tmp");
        let mut tmp = std::fs::File::create(&tmp_path).map_err(|e| AggregatorError::SnapshotWrite(e.to_string()))?;
        let json = serde_json::to_vec_pretty(row).map_err(|e| AggregatorError::SnapshotWrite(e.to_string()))?;
        tmp.write_all(&json).map_err(|e| AggregatorError::SnapshotWrite(e.to_string()))?;
        tmp.flush().map_err(|e| AggregatorError::SnapshotWrite(e.to_string()))?;
        std::fs::rename(&tmp_path, &self.snapshot_path).map_err(|e| AggregatorError::SnapshotWrite(e.to_string()))?;
        Ok(())
    }

    fn append_row(&mut self, run_dir: &Path, row: &MetricsRow) -> Result<(), AggregatorError> {
        if !self.header_written {
            let header = schema::metrics_header(&self.config, self.ena_present);
            self.csv_writer.write_record(&header).map_err(|e| AggregatorError::CsvWrite(e.to_string()))?;
            self.header_written = true;
            self.update_latest_symlink(run_dir)?;
        }
        let record = schema::metrics_row_to_record(row);
        self.csv_writer.write_record(&record).map_err(|e| AggregatorError::CsvWrite(e.to_string()))?;
        self.csv_writer.flush().map_err(|e| AggregatorError::CsvWrite(e.to_string()))?;
        Ok(())
    }

    /// Drains `(tick_seq, SamplerOutput)` pairs, assembling and publishing
    /// one row per tick until the channel closes. Runs as its own task.
    pub async fn run(mut self, run_dir: PathBuf, mut rx: mpsc::Receiver<(u64, SamplerOutput)>) {
        use std::collections::BTreeMap;
        let mut pending: BTreeMap<u64, PartialRow> = BTreeMap::new();
        // Cpu, Memory, Network, Overhead, NodeRpc, MainnetRpc, LoadGenProgress
        // are always spawned; one DeviceSampler per configured device; Ena
        // only when the platform probe found it (mirrors `Run::build_samplers`).
        let expected_per_tick = self.device_order.len() + 7 + if self.ena_present { 1 } else { 0 };
        let mut last_timestamp: Option<chrono::DateTime<Utc>> = None;

        while let Some((seq, output)) = rx.recv().await {
            let entry = pending.entry(seq).or_default();
            entry.apply(output);

            if entry.received as usize >= expected_per_tick {
                if let Some(partial) = pending.remove(&seq) {
                    let timestamp = last_timestamp.map(|t| t.max(Utc::now())).unwrap_or_else(Utc::now);
                    let row = partial.into_row(timestamp, &self.device_order, self.config.thresholds.node_unhealthy_diff_threshold);
                    last_timestamp = Some(row.timestamp);

                    if let Err(e) = self.append_row(&run_dir, &row) {
                        log::error!("aggregator CSV append failed: {e}");
                    }
                    if let Err(e) = self.write_snapshot(&row) {
                        log::error!("aggregator snapshot write failed: {e}");
                    }
                    let _ = self.latest_row_tx.send(Some(row));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_row_fills_unknown_fields_when_samplers_missing() {
        let mut partial = PartialRow::default();
        partial.apply(SamplerOutput::Cpu(CpuFields { usage_pct: 1.0, user_pct: 1.0, system_pct: 0.0, iowait_pct: 0.0, softirq_pct: 0.0, idle_pct: 99.0 }));
        let row = partial.into_row(Utc::now(), &["nvme0n1".to_string()], 50);
        assert_eq!(row.block_height.local_height, UNKNOWN_U64);
        assert!(row.block_height.data_loss);
        assert_eq!(row.devices.len(), 1);
    }

    #[test]
    fn data_loss_false_when_both_heights_known_and_healthy() {
        let mut partial = PartialRow::default();
        partial.apply(SamplerOutput::LocalNode(NodeHeightSample { height: 100, health: HealthStatus::Healthy }));
        partial.apply(SamplerOutput::MainnetNode(NodeHeightSample { height: 102, health: HealthStatus::Healthy }));
        let row = partial.into_row(Utc::now(), &[], 50);
        assert!(!row.block_height.data_loss);
        assert_eq!(row.block_height.diff, 2);
    }

    #[tokio::test]
    async fn snapshot_write_then_rename_produces_parseable_json() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.paths.snapshot_dir = dir.path().join("snapshot");
        config.devices.clear();
        let run_dir = dir.path().join("run");
        let (aggregator, _rx) = Aggregator::new(config, &run_dir, "test_run", false).unwrap();

        let row = PartialRow::default().into_row(Utc::now(), &[], 50);
        aggregator.write_snapshot(&row).unwrap();
        let contents = std::fs::read_to_string(&aggregator.snapshot_path).unwrap();
        let _: MetricsRow = serde_json::from_str(&contents).unwrap();
    }
}
