//! Periodic `monitoring_overhead_<ts>.csv` report (§6 file #3): attributes
//! CPU/memory cost to the monitor process and the node process by name
//! pattern, alongside a whole-system snapshot, using the fixed 20-field
//! `OverheadRow` schema.

use crate::clock::StopSignal;
use crate::config::Config;
use crate::models::OverheadRow;
use crate::platform::PlatformInfo;
use crate::schema;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use sysinfo::{Disks, System};

fn read_meminfo_detail() -> HashMap<String, u64> {
    let mut map = HashMap::new();
    if let Ok(contents) = std::fs::read_to_string("/proc/meminfo") {
        for line in contents.lines() {
            let mut parts = line.splitn(2, ':');
            if let (Some(key), Some(rest)) = (parts.next(), parts.next()) {
                if let Some(value_str) = rest.trim().split_whitespace().next() {
                    if let Ok(value) = value_str.parse::<u64>() {
                        map.insert(key.to_string(), value);
                    }
                }
            }
        }
    }
    map
}

fn matches_any(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| name.contains(p.as_str()))
}

struct ProcessAggregate {
    cpu_pct: f64,
    mem_pct: f64,
    mem_mb: f64,
    count: u32,
}

fn aggregate_processes(system: &System, patterns: &[String], total_mem_kb: u64) -> ProcessAggregate {
    let mut cpu_pct = 0.0;
    let mut mem_kb = 0u64;
    let mut count = 0u32;
    for process in system.processes().values() {
        let name = process.name().to_string_lossy();
        if matches_any(&name, patterns) {
            cpu_pct += process.cpu_usage() as f64;
            mem_kb += process.memory() / 1024;
            count += 1;
        }
    }
    let mem_pct = if total_mem_kb > 0 { 100.0 * mem_kb as f64 / total_mem_kb as f64 } else { 0.0 };
    ProcessAggregate { cpu_pct, mem_pct, mem_mb: mem_kb as f64 / 1024.0, count }
}

/// Owns the monitoring-overhead CSV for one run. Samples on its own
/// interval rather than sharing the main sampler clock: §9 treats shared
/// in-process state across independent reporting loops as unnecessary
/// coupling when a simple independent timer achieves the same cadence.
pub struct OverheadReporter {
    config: Config,
    platform: PlatformInfo,
    csv_path: std::path::PathBuf,
    writer: csv::Writer<std::fs::File>,
    header_written: bool,
}

impl OverheadReporter {
    pub fn new(config: Config, platform: PlatformInfo, run_dir: &Path, run_id: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(run_dir)?;
        let csv_path = run_dir.join(format!("monitoring_overhead_{run_id}.csv"));
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&csv_path)?;
        let writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        Ok(OverheadReporter { config, platform, csv_path, writer, header_written: false })
    }

    fn sample_once(&self, system: &mut System) -> OverheadRow {
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        system.refresh_memory();

        // Matches `PlatformProbe`'s convention of treating `System::total_memory()`
        // as already KB-scaled, so this stays consistent with `PlatformInfo.total_memory_kb`.
        let total_mem_kb = system.total_memory();
        let monitor = aggregate_processes(system, &self.config.monitor_process_patterns, total_mem_kb);
        let node = aggregate_processes(system, &self.config.node_process_patterns, total_mem_kb);

        let meminfo = read_meminfo_detail();
        let kb_to_gb = |kb: u64| kb as f64 / (1024.0 * 1024.0);
        let used_kb = total_mem_kb.saturating_sub(*meminfo.get("MemAvailable").unwrap_or(&total_mem_kb));

        let disks = Disks::new_with_refreshed_list();
        let (total_space, available_space) = disks.iter().fold((0u64, 0u64), |(t, a), disk| {
            (t + disk.total_space(), a + disk.available_space())
        });

        OverheadRow {
            timestamp: Utc::now(),
            monitor_cpu_pct: monitor.cpu_pct,
            monitor_mem_pct: monitor.mem_pct,
            monitor_mem_mb: monitor.mem_mb,
            monitor_process_count: monitor.count,
            node_cpu_pct: node.cpu_pct,
            node_mem_pct: node.mem_pct,
            node_mem_mb: node.mem_mb,
            node_process_count: node.count,
            system_cores: self.platform.cpu_cores as u32,
            system_ram_gb: kb_to_gb(self.platform.total_memory_kb),
            system_disk_gb: kb_to_gb(total_space / 1024),
            cpu_usage_pct: system.global_cpu_usage() as f64,
            mem_usage_pct: if total_mem_kb > 0 { 100.0 * used_kb as f64 / total_mem_kb as f64 } else { 0.0 },
            mem_cached_gb: kb_to_gb(*meminfo.get("Cached").unwrap_or(&0)),
            mem_buffers_gb: kb_to_gb(*meminfo.get("Buffers").unwrap_or(&0)),
            mem_anonymous_gb: kb_to_gb(*meminfo.get("AnonPages").unwrap_or(&0)),
            mem_mapped_gb: kb_to_gb(*meminfo.get("Mapped").unwrap_or(&0)),
            mem_shared_gb: kb_to_gb(*meminfo.get("Shmem").unwrap_or(&0)),
            disk_used_gb: kb_to_gb((total_space.saturating_sub(available_space)) / 1024),
            disk_free_gb: kb_to_gb(available_space / 1024),
        }
    }

    fn append(&mut self, row: &OverheadRow) -> std::io::Result<()> {
        let csv_err = |e: csv::Error| std::io::Error::new(std::io::ErrorKind::Other, e.to_string());
        if !self.header_written {
            self.writer.write_record(schema::overhead_header()).map_err(csv_err)?;
            self.header_written = true;
        }
        self.writer.write_record(schema::overhead_row_to_record(row)).map_err(csv_err)?;
        self.writer.flush()
    }

    /// Runs until `stop` fires, sampling once per `tick_interval_secs`.
    pub async fn run(mut self, stop: StopSignal) {
        let mut system = System::new_all();
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.tick_interval_secs.max(1)));
        let mut stop = stop;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let row = self.sample_once(&mut system);
                    if let Err(e) = self.append(&row) {
                        log::error!("monitoring overhead CSV append failed: {e}");
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;
    use tempfile::tempdir;

    fn test_platform() -> PlatformInfo {
        PlatformInfo { platform: Platform::Other, cpu_cores: 4, total_memory_kb: 8_000_000, ena_available: false }
    }

    #[test]
    fn sample_once_produces_bounded_percentages() {
        let dir = tempdir().unwrap();
        let config = Config::default();
        let reporter = OverheadReporter::new(config, test_platform(), dir.path(), "test").unwrap();
        let mut system = System::new_all();
        let row = reporter.sample_once(&mut system);
        assert!(row.mem_usage_pct >= 0.0);
        assert!(row.system_cores == 4);
    }

    #[tokio::test]
    async fn run_stops_promptly_on_stop_signal() {
        let dir = tempdir().unwrap();
        let config = Config::default();
        let reporter = OverheadReporter::new(config, test_platform(), dir.path(), "test").unwrap();
        let (stop_tx, stop_rx) = crate::clock::new_stop_channel();
        stop_tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), reporter.run(stop_rx)).await.unwrap();
    }
}
