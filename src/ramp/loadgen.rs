//! Invokes the external load generator for one level and parses its result
//! file (§4.5, §6). The generator itself is an external collaborator;
//! this module only shells out to it and interprets its output.

use crate::config::Config;
use crate::error::ControllerError;
use crate::models::LevelResult;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

pub struct LoadGenInvocation {
    pub binary: PathBuf,
    pub targets_file: PathBuf,
    pub duration_secs: u32,
    pub qps: u32,
    pub grace_period: Duration,
}

impl LoadGenInvocation {
    pub fn from_config(config: &Config, qps: u32, duration_secs: u32) -> Self {
        LoadGenInvocation {
            binary: config.load_gen_binary.clone(),
            targets_file: config.paths.targets_file.clone(),
            duration_secs,
            qps,
            grace_period: Duration::from_secs(config.load_gen_grace_period_secs),
        }
    }

    /// Runs the generator, enforcing the configured grace period before a
    /// forceful kill on cancellation (§5).
    pub async fn run(&self, result_path: &PathBuf) -> Result<LevelResult, ControllerError> {
        let mut child = Command::new(&self.binary)
            .arg("attack")
            .arg("-targets")
            .arg(&self.targets_file)
            .arg("-rate")
            .arg(self.qps.to_string())
            .arg("-duration")
            .arg(format!("{}s", self.duration_secs))
            .arg("-output")
            .arg(result_path)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ControllerError::LoadGenFailed(e.to_string()))?;

        let wait_budget = Duration::from_secs(self.duration_secs as u64) + self.grace_period;
        match timeout(wait_budget, child.wait()).await {
            Ok(Ok(status)) if status.success() => {}
            Ok(Ok(status)) => {
                return Err(ControllerError::LoadGenFailed(format!("exited with {status}")));
            }
            Ok(Err(e)) => return Err(ControllerError::LoadGenFailed(e.to_string())),
            Err(_) => {
                let _ = child.kill().await;
                return Err(ControllerError::LoadGenFailed("exceeded grace period, killed".to_string()));
            }
        }

        parse_result_file(result_path)
    }
}

fn parse_result_file(path: &PathBuf) -> Result<LevelResult, ControllerError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ControllerError::ResultUnparseable(e.to_string()))?;
    let value: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| ControllerError::ResultUnparseable(e.to_string()))?;

    let total_requests = value.get("requests").and_then(|v| v.as_u64()).ok_or_else(|| ControllerError::ResultUnparseable("missing `requests`".to_string()))?;
    let status_codes = value.get("status_codes").and_then(|v| v.as_object()).ok_or_else(|| ControllerError::ResultUnparseable("missing `status_codes`".to_string()))?;
    let successful_requests = status_codes.get("200").and_then(|v| v.as_u64()).unwrap_or(0);
    let mean_ns = value.get("latencies").and_then(|l| l.get("mean")).and_then(|v| v.as_f64()).unwrap_or(0.0);
    let p99_ns = value.get("latencies").and_then(|l| l.get("99th")).and_then(|v| v.as_f64());

    let error_rate_pct = if total_requests > 0 {
        100.0 * (total_requests - successful_requests) as f64 / total_requests as f64
    } else {
        100.0
    };

    Ok(LevelResult {
        qps: 0, // filled by the caller, which knows the level
        total_requests,
        successful_requests,
        mean_latency_ms: mean_ns / 1_000_000.0,
        p99_latency_ms: p99_ns.map(|ns| ns / 1_000_000.0),
        error_rate_pct,
    })
}
