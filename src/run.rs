//! Ties the clock, samplers, aggregator, detector, and ramp controller
//! together for one end-to-end run (§4, §8). `main.rs` constructs a `Run`
//! from a validated `Config` and a chosen mode, then awaits its outcome.

use crate::aggregator::Aggregator;
use crate::archiver::Archiver;
use crate::clock::StopSignal;
use crate::config::Config;
use crate::detector::BottleneckDetector;
use crate::models::{BenchmarkMode, PlatformInfo, RunStatus};
use crate::overhead_report::OverheadReporter;
use crate::ramp::{RampController, RampOutcome};
use crate::rpc::JsonRpcClient;
use crate::samplers::{
    cpu::CpuSampler, device::DeviceSampler, ena::EnaSampler, loadgen_progress::LoadGenProgressSampler,
    mainnet_rpc::MainnetRpcSampler, memory::MemorySampler, network::NetworkSampler, node_rpc::NodeRpcSampler,
    overhead::MonitorOverheadSampler, CurrentQps, Sampler, Scheduler,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// The outcome handed back to `main.rs` for exit-code mapping.
pub enum RunOutcome {
    CompletedSuccessfully { max_successful_qps: u32 },
    BottleneckDetected(Box<crate::models::BottleneckVerdict>),
    Aborted { message: String },
}

pub struct Run {
    config: Config,
    mode: BenchmarkMode,
    run_id: String,
    platform: PlatformInfo,
}

impl Run {
    pub fn new(config: Config, mode: BenchmarkMode, platform: PlatformInfo) -> Self {
        let run_id = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        Run { config, mode, run_id, platform }
    }

    fn build_samplers(&self) -> Vec<Box<dyn Sampler>> {
        let mut samplers: Vec<Box<dyn Sampler>> = vec![
            Box::new(CpuSampler::new()),
            Box::new(MemorySampler::new()),
            Box::new(NetworkSampler::new(self.config.network_interface.clone())),
            Box::new(MonitorOverheadSampler::new()),
        ];

        for device in &self.config.devices {
            samplers.push(Box::new(DeviceSampler::new(device.clone())));
        }

        if self.platform.ena_available {
            samplers.push(Box::new(EnaSampler::new(self.config.network_interface.clone())));
        }

        let rpc_timeout = Duration::from_secs(5);
        let local_client = JsonRpcClient::new(
            self.config.local_rpc.url.clone(),
            self.config.local_rpc.health_method.clone(),
            self.config.local_rpc.height_method.clone(),
            rpc_timeout,
        );
        samplers.push(Box::new(NodeRpcSampler::new(local_client, self.config.sampler_retry_count)));

        let mainnet_client = JsonRpcClient::new(
            self.config.mainnet_rpc.url.clone(),
            self.config.mainnet_rpc.health_method.clone(),
            self.config.mainnet_rpc.height_method.clone(),
            rpc_timeout,
        );
        samplers.push(Box::new(MainnetRpcSampler::new(
            mainnet_client,
            self.config.sampler_retry_count,
            Duration::from_secs(self.config.mainnet_cache_ttl_secs),
        )));

        samplers
    }

    /// Drives one full run to completion: spawns sampling, aggregation, the
    /// ramp, and seals the archive. Stops early if `stop` fires.
    pub async fn run(self, stop: StopSignal) -> RunOutcome {
        let run_dir = self.config.paths.run_dir_root.join(format!("run_{}", self.run_id));
        if let Err(e) = std::fs::create_dir_all(&run_dir) {
            return RunOutcome::Aborted { message: format!("failed to create run directory: {e}") };
        }

        let current_qps = CurrentQps::new();
        let results_dir = run_dir.join("vegeta_results");

        let mut loadgen_samplers: Vec<Box<dyn Sampler>> = vec![Box::new(LoadGenProgressSampler::new(current_qps.clone(), results_dir.clone()))];
        let mut samplers = self.build_samplers();
        samplers.append(&mut loadgen_samplers);

        let tick_interval = Duration::from_secs(self.config.tick_interval_secs);
        let (clock_handle, sampler_rx) = Scheduler::spawn_all(samplers, tick_interval, stop.clone());

        let (aggregator, latest_row_rx) = match Aggregator::new(self.config.clone(), &run_dir, &self.run_id, self.platform.ena_available) {
            Ok(pair) => pair,
            Err(e) => {
                clock_handle.abort();
                return RunOutcome::Aborted { message: format!("failed to start aggregator: {e}") };
            }
        };
        let aggregator_handle = tokio::spawn(aggregator.run(run_dir.clone(), sampler_rx));

        let overhead_handle = match OverheadReporter::new(self.config.clone(), self.platform, &run_dir, &self.run_id) {
            Ok(reporter) => Some(tokio::spawn(reporter.run(stop.clone()))),
            Err(e) => {
                log::warn!("failed to start monitoring overhead reporter: {e}");
                None
            }
        };

        let detector = Arc::new(Mutex::new(BottleneckDetector::new(self.config.clone(), &run_dir)));
        let start_time = Utc::now();
        let controller = RampController::new(
            self.config.clone(),
            self.mode,
            current_qps,
            &run_dir,
            detector,
            latest_row_rx,
            stop,
        );

        let ramp_outcome = controller.run().await;
        aggregator_handle.abort();
        clock_handle.abort();
        if let Some(handle) = overhead_handle {
            handle.abort();
        }

        let (status, max_successful_qps, verdict) = match &ramp_outcome {
            RampOutcome::CompletedSuccessfully { max_successful_qps } => (RunStatus::CompletedSuccessfully, *max_successful_qps, None),
            RampOutcome::BottleneckDetected(verdict) => (RunStatus::CompletedWithBottleneck, verdict.max_successful_qps, Some(verdict.as_ref())),
            RampOutcome::Aborted { message } => {
                log::warn!("run aborted: {message}");
                (RunStatus::Aborted, 0, None)
            }
        };

        let archiver = Archiver::new(self.config.clone());
        let schedule = self.config.schedule_for(self.mode);
        if let Err(e) = archiver.archive_run(&run_dir, &self.run_id, self.mode, schedule, start_time, status, max_successful_qps, verdict) {
            log::error!("failed to archive run {}: {e}", self.run_id);
        }

        match ramp_outcome {
            RampOutcome::CompletedSuccessfully { max_successful_qps } => RunOutcome::CompletedSuccessfully { max_successful_qps },
            RampOutcome::BottleneckDetected(verdict) => RunOutcome::BottleneckDetected(verdict),
            RampOutcome::Aborted { message } => RunOutcome::Aborted { message },
        }
    }
}
