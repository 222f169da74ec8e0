//! QPS Ramp Controller (§4.5). Owns the run's lifecycle: drives the load
//! generator through a schedule, gates each level on success rate and
//! latency, and consults the Detector for intensive-mode auto-stop.

pub mod loadgen;

use crate::clock::StopSignal;
use crate::config::Config;
use crate::detector::{BottleneckDetector, TickOutcome};
use crate::error::ControllerError;
use crate::models::{BenchmarkMode, LevelResult, QpsSchedule, QpsStatus};
use crate::samplers::CurrentQps;
use chrono::Utc;
use loadgen::LoadGenInvocation;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Terminal outcome of a run's ramp, handed to the Archiver.
pub enum RampOutcome {
    CompletedSuccessfully { max_successful_qps: u32 },
    BottleneckDetected(Box<crate::models::BottleneckVerdict>),
    Aborted { message: String },
}

pub struct RampController {
    config: Config,
    mode: BenchmarkMode,
    schedule: QpsSchedule,
    current_qps: CurrentQps,
    results_dir: PathBuf,
    status_path: PathBuf,
    detector: Arc<Mutex<BottleneckDetector>>,
    latest_row: watch::Receiver<Option<crate::models::MetricsRow>>,
    stop: StopSignal,
}

impl RampController {
    pub fn new(
        config: Config,
        mode: BenchmarkMode,
        current_qps: CurrentQps,
        run_dir: &Path,
        detector: Arc<Mutex<BottleneckDetector>>,
        latest_row: watch::Receiver<Option<crate::models::MetricsRow>>,
        stop: StopSignal,
    ) -> Self {
        let schedule = config.schedule_for(mode);
        let results_dir = run_dir.join("vegeta_results");
        let status_path = run_dir.join("qps_status.json");
        RampController {
            config,
            mode,
            schedule,
            current_qps,
            results_dir,
            status_path,
            detector,
            latest_row,
            stop,
        }
    }

    fn write_status(&self, status: &QpsStatus) -> Result<(), ControllerError> {
        std::fs::create_dir_all(self.status_path.parent().unwrap_or(Path::new(".")))
            .map_err(|e| ControllerError::StatusWrite(e.to_string()))?;
        let tmp = self.status_path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(status).map_err(|e| ControllerError::StatusWrite(e.to_string()))?;
        std::fs::write(&tmp, json).map_err(|e| ControllerError::StatusWrite(e.to_string()))?;
        std::fs::rename(&tmp, &self.status_path).map_err(|e| ControllerError::StatusWrite(e.to_string()))?;
        Ok(())
    }

    /// Runs the full schedule, returning the terminal outcome. Always
    /// writes a terminal status before returning, even on cancellation.
    pub async fn run(mut self) -> RampOutcome {
        std::fs::create_dir_all(&self.results_dir).ok();
        let mut max_successful_qps = 0u32;
        let levels = self.schedule.levels();

        for (index, qps) in levels.iter().copied().enumerate() {
            if *self.stop.borrow() {
                let outcome = RampOutcome::Aborted { message: "stop signal received before level started".to_string() };
                self.write_terminal_status(&outcome);
                return outcome;
            }

            self.current_qps.set(qps);
            let _ = self.write_status(&QpsStatus::Running {
                current_qps: qps,
                message: format!("running level {qps} qps"),
                timestamp: Utc::now(),
            });

            if self.schedule.warmup_secs > 0 {
                tokio::time::sleep(std::time::Duration::from_secs(self.schedule.warmup_secs as u64)).await;
            }

            let result_path = self.results_dir.join(format!("level_{index:04}_{qps}.json"));
            let invocation = LoadGenInvocation::from_config(&self.config, qps, self.schedule.duration_per_level_secs);
            let level_result = match invocation.run(&result_path).await {
                Ok(mut result) => {
                    result.qps = qps;
                    result
                }
                Err(e) => {
                    log::error!("load generator invocation failed at {qps} qps: {e}");
                    let outcome = RampOutcome::Aborted { message: e.to_string() };
                    self.write_terminal_status(&outcome);
                    return outcome;
                }
            };

            let level_ok = level_result.success_rate_pct() >= self.config.level_gate_success_rate_pct
                && level_result.mean_latency_ms <= self.config.level_gate_latency_ms;

            if level_ok {
                max_successful_qps = qps;
            } else if self.mode != BenchmarkMode::Intensive {
                let outcome = RampOutcome::CompletedSuccessfully { max_successful_qps };
                self.write_terminal_status(&outcome);
                return outcome;
            }

            if self.mode.auto_stop_armed() {
                let row = self.latest_row.borrow().clone();
                if let Some(row) = row {
                    let mut detector = self.detector.lock().await;
                    if let TickOutcome::Confirmed(verdict) = detector.evaluate(&row, qps, Some(&level_result), max_successful_qps) {
                        let outcome = RampOutcome::BottleneckDetected(verdict);
                        self.write_terminal_status(&outcome);
                        return outcome;
                    }
                }
            }

            if self.schedule.cooldown_secs > 0 {
                tokio::time::sleep(std::time::Duration::from_secs(self.schedule.cooldown_secs as u64)).await;
            }
        }

        let outcome = RampOutcome::CompletedSuccessfully { max_successful_qps };
        self.write_terminal_status(&outcome);
        outcome
    }

    fn write_terminal_status(&self, outcome: &RampOutcome) {
        let status = match outcome {
            RampOutcome::CompletedSuccessfully { max_successful_qps } => QpsStatus::CompletedSuccessfully {
                max_successful_qps: *max_successful_qps,
                timestamp: Utc::now(),
            },
            RampOutcome::BottleneckDetected(verdict) => QpsStatus::BottleneckDetected {
                verdict: verdict.clone(),
                timestamp: Utc::now(),
            },
            RampOutcome::Aborted { message } => QpsStatus::Aborted {
                message: message.clone(),
                timestamp: Utc::now(),
            },
        };
        if let Err(e) = self.write_status(&status) {
            log::error!("failed to write terminal qps_status.json: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn level_result_gate_respects_thresholds() {
        let good = LevelResult { qps: 1000, total_requests: 100, successful_requests: 99, mean_latency_ms: 10.0, p99_latency_ms: None, error_rate_pct: 1.0 };
        assert!(good.success_rate_pct() >= 95.0);

        let bad = LevelResult { qps: 1000, total_requests: 100, successful_requests: 50, mean_latency_ms: 10.0, p99_latency_ms: None, error_rate_pct: 50.0 };
        assert!(bad.success_rate_pct() < 95.0);
    }

    #[tokio::test]
    async fn stop_signal_before_first_level_aborts_immediately() {
        let dir = tempdir().unwrap();
        let targets = dir.path().join("targets.json");
        std::fs::write(&targets, "{}").unwrap();
        let mut config = Config::default();
        config.paths.targets_file = targets;
        config.quick.initial_qps = 1000;
        config.quick.max_qps = 1000;

        let (stop_tx, stop_rx) = crate::clock::new_stop_channel();
        stop_tx.send(true).unwrap();

        let detector = Arc::new(Mutex::new(BottleneckDetector::new(config.clone(), dir.path())));
        let (_row_tx, row_rx) = watch::channel(None);
        let controller = RampController::new(
            config,
            BenchmarkMode::Quick,
            CurrentQps::new(),
            dir.path(),
            detector,
            row_rx,
            stop_rx,
        );

        match controller.run().await {
            RampOutcome::Aborted { .. } => {}
            _ => panic!("expected Aborted outcome when stop is set before any level runs"),
        }
    }
}
