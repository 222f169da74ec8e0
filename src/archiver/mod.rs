//! Run Archiver (§4.6): seals a finished run into a numbered archive
//! directory, writes `test_summary.json`, and maintains the global
//! `TestHistoryIndex`. Every step is idempotent.

pub mod history;

use crate::config::Config;
use crate::error::ArchiverError;
use crate::models::{BenchmarkMode, BottleneckVerdict, QpsSchedule, RunStatus, TestHistoryEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSummary {
    pub run_id: String,
    pub mode: BenchmarkMode,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: f64,
    pub max_successful_qps: u32,
    pub bottleneck_detected: bool,
    pub bottleneck_types: Vec<(String, f64)>,
    pub bottleneck_summary: String,
    pub schedule: QpsSchedule,
    pub status: RunStatus,
    pub size_mb_by_subdir: Vec<(String, f64)>,
}

pub struct Archiver {
    config: Config,
}

impl Archiver {
    pub fn new(config: Config) -> Self {
        Archiver { config }
    }

    fn history_path(&self) -> PathBuf {
        self.config.paths.run_dir_root.join("test_history.json")
    }

    /// Seals `run_dir` into `archives/run_NNN_<ts>/`, writes the summary,
    /// and updates the history index. Returns the archive directory path.
    pub fn archive_run(
        &self,
        run_dir: &Path,
        run_id: &str,
        mode: BenchmarkMode,
        schedule: QpsSchedule,
        start_time: DateTime<Utc>,
        status: RunStatus,
        max_successful_qps: u32,
        verdict: Option<&BottleneckVerdict>,
    ) -> Result<PathBuf, ArchiverError> {
        let index = history::load(&self.history_path())?;
        let next_index = index.total_tests + 1;
        let archive_name = format!("run_{:03}_{}", next_index, Utc::now().format("%Y%m%d%H%M%S"));
        let archive_dir = self.config.paths.archives_root.join(&archive_name);

        std::fs::create_dir_all(archive_dir.join("logs")).map_err(|e| ArchiverError::CreateDir(e.to_string()))?;
        std::fs::create_dir_all(archive_dir.join("stats")).map_err(|e| ArchiverError::CreateDir(e.to_string()))?;
        std::fs::create_dir_all(archive_dir.join("vegeta_results")).map_err(|e| ArchiverError::CreateDir(e.to_string()))?;

        self.move_matching(run_dir, "performance_", &archive_dir.join("logs"))?;
        self.move_matching(run_dir, "monitoring_overhead_", &archive_dir.join("logs"))?;
        self.move_matching(run_dir, "bottleneck_events", &archive_dir.join("logs"))?;
        self.move_dir_contents(&run_dir.join("vegeta_results"), &archive_dir.join("vegeta_results"))?;
        self.move_dir_contents(&self.config.paths.logs_dir, &archive_dir.join("logs"))?;

        for name in ["bottleneck_verdict.json", "qps_status.json"] {
            let src = run_dir.join(name);
            if src.exists() {
                let dest = archive_dir.join("stats").join(name);
                std::fs::copy(&src, &dest).map_err(|e| ArchiverError::MoveArtifact { path: src.display().to_string(), reason: e.to_string() })?;
            }
        }

        let end_time = Utc::now();
        let duration_minutes = (end_time - start_time).num_seconds() as f64 / 60.0;
        let (bottleneck_types, bottleneck_summary) = match verdict {
            Some(v) => {
                let types: Vec<(String, f64)> = v.reasons.iter().map(|p| (p.kind.to_string(), p.measured)).collect();
                let summary = v.reasons.iter().map(|p| p.kind.to_string()).collect::<Vec<_>>().join(",");
                (types, summary)
            }
            None => (vec![], "none".to_string()),
        };

        let size_mb_by_subdir = self.measure_subdir_sizes(&archive_dir);

        let summary = TestSummary {
            run_id: run_id.to_string(),
            mode,
            start_time,
            end_time,
            duration_minutes,
            max_successful_qps,
            bottleneck_detected: verdict.is_some(),
            bottleneck_types,
            bottleneck_summary,
            schedule,
            status,
            size_mb_by_subdir,
        };
        let summary_path = archive_dir.join("test_summary.json");
        let json = serde_json::to_vec_pretty(&summary).map_err(|e| ArchiverError::Disk(e.to_string()))?;
        std::fs::write(&summary_path, json).map_err(|e| ArchiverError::Disk(e.to_string()))?;

        let mut index = history::load(&self.history_path())?;
        index.push(TestHistoryEntry {
            run_id: run_id.to_string(),
            mode,
            max_qps: max_successful_qps,
            status,
            archived_at: end_time,
        });
        history::save(&self.history_path(), &index)?;

        if self.config.paths.snapshot_dir.exists() {
            for entry in std::fs::read_dir(&self.config.paths.snapshot_dir).into_iter().flatten().flatten() {
                let _ = std::fs::remove_file(entry.path());
            }
        }

        Ok(archive_dir)
    }

    fn move_matching(&self, src_dir: &Path, prefix: &str, dest_dir: &Path) -> Result<(), ArchiverError> {
        if !src_dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(src_dir).map_err(|e| ArchiverError::Disk(e.to_string()))?.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(prefix) {
                let dest = dest_dir.join(&name);
                std::fs::rename(entry.path(), &dest).map_err(|e| ArchiverError::MoveArtifact { path: name, reason: e.to_string() })?;
            }
        }
        Ok(())
    }

    fn move_dir_contents(&self, src_dir: &Path, dest_dir: &Path) -> Result<(), ArchiverError> {
        if !src_dir.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(dest_dir).map_err(|e| ArchiverError::CreateDir(e.to_string()))?;
        for entry in std::fs::read_dir(src_dir).map_err(|e| ArchiverError::Disk(e.to_string()))?.flatten() {
            if entry.path().is_file() {
                let name = entry.file_name();
                std::fs::rename(entry.path(), dest_dir.join(&name))
                    .map_err(|e| ArchiverError::MoveArtifact { path: name.to_string_lossy().to_string(), reason: e.to_string() })?;
            }
        }
        Ok(())
    }

    fn measure_subdir_sizes(&self, archive_dir: &Path) -> Vec<(String, f64)> {
        ["logs", "stats", "vegeta_results"]
            .iter()
            .map(|name| {
                let dir = archive_dir.join(name);
                let bytes: u64 = std::fs::read_dir(&dir)
                    .map(|entries| entries.flatten().filter_map(|e| e.metadata().ok()).map(|m| m.len()).sum())
                    .unwrap_or(0);
                (name.to_string(), bytes as f64 / (1024.0 * 1024.0))
            })
            .collect()
    }

    /// Loads two archives' summaries and returns them for side-by-side
    /// display (§8 S5).
    pub fn compare(&self, run_a: &str, run_b: &str) -> Result<(TestSummary, TestSummary), ArchiverError> {
        let load_one = |run_id: &str| -> Result<TestSummary, ArchiverError> {
            let path = self.find_archive_dir(run_id)?.join("test_summary.json");
            let contents = std::fs::read_to_string(&path).map_err(|e| ArchiverError::Disk(e.to_string()))?;
            serde_json::from_str(&contents).map_err(|e| ArchiverError::Disk(e.to_string()))
        };
        Ok((load_one(run_a)?, load_one(run_b)?))
    }

    fn find_archive_dir(&self, run_id_prefix: &str) -> Result<PathBuf, ArchiverError> {
        std::fs::read_dir(&self.config.paths.archives_root)
            .map_err(|e| ArchiverError::Disk(e.to_string()))?
            .flatten()
            .map(|e| e.path())
            .find(|p| p.file_name().map(|n| n.to_string_lossy().starts_with(run_id_prefix)).unwrap_or(false))
            .ok_or_else(|| ArchiverError::Disk(format!("no archive matching {run_id_prefix}")))
    }

    /// Keeps the most recent `keep` archives by directory-name sort,
    /// deletes the rest, then rebuilds the index from disk (§4.6, §8 S6).
    pub fn cleanup(&self, keep: usize) -> Result<usize, ArchiverError> {
        let mut dirs: Vec<_> = std::fs::read_dir(&self.config.paths.archives_root)
            .map_err(|e| ArchiverError::Disk(e.to_string()))?
            .flatten()
            .filter(|e| e.path().is_dir())
            .collect();
        dirs.sort_by_key(|e| e.file_name());

        let to_delete = dirs.len().saturating_sub(keep);
        let mut deleted = 0;
        for dir in dirs.into_iter().take(to_delete) {
            std::fs::remove_dir_all(dir.path()).map_err(|e| ArchiverError::Disk(e.to_string()))?;
            deleted += 1;
        }

        let rebuilt = history::rebuild_from_disk(&self.config.paths.archives_root)?;
        history::save(&self.history_path(), &rebuilt)?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VolumeType;
    use tempfile::tempdir;

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.paths.run_dir_root = root.join("runs");
        config.paths.archives_root = root.join("archives");
        config.paths.snapshot_dir = root.join("snapshot");
        config.paths.logs_dir = root.join("logs");
        config.devices = vec![crate::config::DeviceConfig { name: "nvme0n1".into(), baseline_iops: 1000.0, baseline_throughput_mibs: 100.0, volume_type: VolumeType::Ebs }];
        config
    }

    fn sample_schedule() -> QpsSchedule {
        QpsSchedule { initial_qps: 1000, max_qps: 1500, step_qps: 500, duration_per_level_secs: 60, warmup_secs: 0, cooldown_secs: 0 }
    }

    #[test]
    fn archive_run_creates_expected_subdirs_and_summary() {
        let root = tempdir().unwrap();
        let config = test_config(root.path());
        std::fs::create_dir_all(&config.paths.run_dir_root).unwrap();
        let run_dir = config.paths.run_dir_root.join("run_in_progress");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join("performance_test.csv"), "timestamp\n").unwrap();

        let archiver = Archiver::new(config);
        let archive_dir = archiver
            .archive_run(&run_dir, "run_001_x", BenchmarkMode::Quick, sample_schedule(), Utc::now(), RunStatus::CompletedSuccessfully, 1500, None)
            .unwrap();

        assert!(archive_dir.join("logs").exists());
        assert!(archive_dir.join("stats").exists());
        assert!(archive_dir.join("vegeta_results").exists());
        assert!(archive_dir.join("test_summary.json").exists());
        assert!(!run_dir.join("performance_test.csv").exists(), "source file should have been moved, not copied");
    }

    #[test]
    fn archive_run_formats_bottleneck_summary_as_comma_joined_kinds() {
        use crate::models::{AnalysisWindow, BottleneckClassification, BottleneckKind, MetricsSnapshot, Severity, TriggeredPredicate};

        let root = tempdir().unwrap();
        let config = test_config(root.path());
        std::fs::create_dir_all(&config.paths.run_dir_root).unwrap();
        let run_dir = config.paths.run_dir_root.join("run_in_progress");
        std::fs::create_dir_all(&run_dir).unwrap();

        let now = Utc::now();
        let verdict = BottleneckVerdict {
            detection_time: now,
            max_successful_qps: 4500,
            bottleneck_qps: 5000,
            reasons: vec![
                TriggeredPredicate { kind: BottleneckKind::RpcLatency, measured: 27_000.0, threshold: 5_000.0, severity: Severity::High },
                TriggeredPredicate { kind: BottleneckKind::RpcSuccessRate, measured: 7.0, threshold: 95.0, severity: Severity::High },
            ],
            severity: Severity::High,
            classification: BottleneckClassification::RpcQuality,
            consecutive_confirmations: 3,
            analysis_window: AnalysisWindow::centered_on(now, 60),
            context: MetricsSnapshot { cpu_usage_pct: 40.0, mem_usage_pct: 25.0, network_total_mbps: 20.0, device_summary: vec![] },
        };

        let archiver = Archiver::new(config);
        let archive_dir = archiver
            .archive_run(&run_dir, "run_002_x", BenchmarkMode::Intensive, sample_schedule(), now, RunStatus::CompletedWithBottleneck, 4500, Some(&verdict))
            .unwrap();

        let summary_json = std::fs::read_to_string(archive_dir.join("test_summary.json")).unwrap();
        let summary: TestSummary = serde_json::from_str(&summary_json).unwrap();
        assert_eq!(summary.bottleneck_summary, "RPC_Latency,RPC_Success_Rate");
        assert_eq!(summary.bottleneck_types, vec![("RPC_Latency".to_string(), 27_000.0), ("RPC_Success_Rate".to_string(), 7.0)]);
        assert_eq!(summary.max_successful_qps, 4500);
    }

    #[test]
    fn cleanup_keeps_only_the_most_recent_n() {
        let root = tempdir().unwrap();
        let config = test_config(root.path());
        std::fs::create_dir_all(&config.paths.archives_root).unwrap();

        for i in 1..=8 {
            let dir = config.paths.archives_root.join(format!("run_{i:03}_20260101000000"));
            std::fs::create_dir_all(&dir).unwrap();
            let summary = TestSummary {
                run_id: format!("run_{i:03}"),
                mode: BenchmarkMode::Quick,
                start_time: Utc::now(),
                end_time: Utc::now(),
                duration_minutes: 1.0,
                max_successful_qps: 1000,
                bottleneck_detected: false,
                bottleneck_types: vec![],
                bottleneck_summary: "none".to_string(),
                schedule: sample_schedule(),
                status: RunStatus::CompletedSuccessfully,
                size_mb_by_subdir: vec![],
            };
            std::fs::write(dir.join("test_summary.json"), serde_json::to_vec(&summary).unwrap()).unwrap();
        }

        let archiver = Archiver::new(config.clone());
        let deleted = archiver.cleanup(5).unwrap();
        assert_eq!(deleted, 3);

        let remaining: Vec<_> = std::fs::read_dir(&config.paths.archives_root).unwrap().flatten().collect();
        assert_eq!(remaining.len(), 5);

        let index = history::load(&config.paths.run_dir_root.join("test_history.json")).unwrap();
        assert_eq!(index.total_tests, 5);
    }

    #[test]
    fn compare_reads_both_summaries_by_run_id_prefix() {
        let root = tempdir().unwrap();
        let config = test_config(root.path());
        std::fs::create_dir_all(&config.paths.archives_root).unwrap();

        let write_summary = |run_id: &str, max_qps: u32, summary_text: &str| {
            let dir = config.paths.archives_root.join(format!("{run_id}_20260101000000"));
            std::fs::create_dir_all(&dir).unwrap();
            let summary = TestSummary {
                run_id: run_id.to_string(),
                mode: BenchmarkMode::Quick,
                start_time: Utc::now(),
                end_time: Utc::now(),
                duration_minutes: 1.0,
                max_successful_qps: max_qps,
                bottleneck_detected: max_qps < 5000,
                bottleneck_types: vec![],
                bottleneck_summary: summary_text.to_string(),
                schedule: sample_schedule(),
                status: RunStatus::CompletedSuccessfully,
                size_mb_by_subdir: vec![],
            };
            std::fs::write(dir.join("test_summary.json"), serde_json::to_vec(&summary).unwrap()).unwrap();
        };
        write_summary("run_001", 1500, "none");
        write_summary("run_002", 4500, "RPC_Latency,RPC_Success_Rate");

        let archiver = Archiver::new(config);
        let (a, b) = archiver.compare("run_001", "run_002").unwrap();
        assert_eq!(a.max_successful_qps, 1500);
        assert_eq!(b.max_successful_qps, 4500);
        assert_eq!(b.bottleneck_summary, "RPC_Latency,RPC_Success_Rate");
    }
}
