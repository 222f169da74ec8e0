//! Reads the Ramp Controller's current QPS level and the most recent
//! per-level load-generator result file, if present (§4.2).

use super::{Sampler, SamplerOutput};
use crate::clock::Tick;
use crate::models::LoadGenFields;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Shared with the `RampController`; updated once per level, read once per
/// tick. Not a channel because there is no need to queue historical values
/// — only the current level matters to a sampler.
#[derive(Clone, Default)]
pub struct CurrentQps(Arc<AtomicU32>);

impl CurrentQps {
    pub fn new() -> Self {
        CurrentQps(Arc::new(AtomicU32::new(0)))
    }

    pub fn set(&self, qps: u32) {
        self.0.store(qps, Ordering::Relaxed);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct LoadGenProgressSampler {
    current_qps: CurrentQps,
    results_dir: PathBuf,
}

impl LoadGenProgressSampler {
    pub fn new(current_qps: CurrentQps, results_dir: PathBuf) -> Self {
        LoadGenProgressSampler { current_qps, results_dir }
    }

    fn latest_result_mean_latency_ms(&self) -> Option<f64> {
        let mut entries: Vec<_> = std::fs::read_dir(&self.results_dir).ok()?.flatten().collect();
        entries.sort_by_key(|e| e.file_name());
        let newest = entries.last()?;
        let contents = std::fs::read_to_string(newest.path()).ok()?;
        let value: serde_json::Value = serde_json::from_str(&contents).ok()?;
        let mean_ns = value.get("latencies")?.get("mean")?.as_f64()?;
        Some(mean_ns / 1_000_000.0)
    }
}

#[async_trait]
impl Sampler for LoadGenProgressSampler {
    fn name(&self) -> &'static str {
        "loadgen_progress"
    }

    async fn sample(&mut self, _tick: Tick) -> SamplerOutput {
        let current_qps = self.current_qps.get();
        match self.latest_result_mean_latency_ms() {
            Some(mean_ms) => SamplerOutput::LoadGen(LoadGenFields {
                current_qps,
                rpc_mean_latency_ms: mean_ms,
                available: true,
            }),
            None => SamplerOutput::LoadGen(LoadGenFields {
                current_qps,
                rpc_mean_latency_ms: 0.0,
                available: false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn no_result_file_yields_unavailable_flag() {
        let dir = tempdir().unwrap();
        let qps = CurrentQps::new();
        qps.set(1500);
        let mut sampler = LoadGenProgressSampler::new(qps, dir.path().to_path_buf());
        let tick = Tick { seq: 0, at: chrono::Utc::now() };
        match sampler.sample(tick).await {
            SamplerOutput::LoadGen(fields) => {
                assert_eq!(fields.current_qps, 1500);
                assert!(!fields.available);
            }
            _ => panic!("expected LoadGen variant"),
        }
    }

    #[tokio::test]
    async fn result_file_present_reports_mean_latency() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("level_0001.json"), r#"{"latencies":{"mean":5000000}}"#).unwrap();
        let qps = CurrentQps::new();
        qps.set(1000);
        let mut sampler = LoadGenProgressSampler::new(qps, dir.path().to_path_buf());
        let tick = Tick { seq: 0, at: chrono::Utc::now() };
        match sampler.sample(tick).await {
            SamplerOutput::LoadGen(fields) => {
                assert!(fields.available);
                assert!((fields.rpc_mean_latency_ms - 5.0).abs() < 1e-9);
            }
            _ => panic!("expected LoadGen variant"),
        }
    }
}
