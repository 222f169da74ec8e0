//! Real-time bottleneck classifier (§4.4): evaluates each row against
//! resource, RPC-quality, and node-health predicates, and runs the
//! four-scenario decision logic on top of the `DetectorState` machine.

pub mod state;

use crate::config::Config;
use crate::error::DetectorError;
use crate::models::{
    AnalysisWindow, BottleneckClassification, BottleneckEvent, BottleneckKind, BottleneckVerdict,
    HealthStatus, LevelResult, MetricsSnapshot, MetricsRow, Severity, TriggeredPredicate,
};
use chrono::Utc;
use state::DetectorState;
use std::io::Write;
use std::path::{Path, PathBuf};

/// What happened on one tick's evaluation, for the Controller to act on.
pub enum TickOutcome {
    Normal,
    Suspected { classification: BottleneckClassification, count: u32 },
    Confirmed(Box<BottleneckVerdict>),
}

pub struct BottleneckDetector {
    config: Config,
    state: DetectorState,
    node_unhealthy_since: Option<chrono::DateTime<Utc>>,
    events_path: PathBuf,
    verdict_path: PathBuf,
    verdict_written: bool,
}

impl BottleneckDetector {
    pub fn new(config: Config, run_dir: &Path) -> Self {
        BottleneckDetector {
            config,
            state: DetectorState::reset(),
            node_unhealthy_since: None,
            events_path: run_dir.join("bottleneck_events.jsonl"),
            verdict_path: run_dir.join("bottleneck_verdict.json"),
            verdict_written: false,
        }
    }

    /// Evaluates predicates for `row` and the most recent load-gen level
    /// result, advances the state machine, and persists events/verdict as
    /// needed. Never fails the run: write failures are logged and retried
    /// on the next tick's call (§7).
    ///
    /// `current_qps` is the level being evaluated (becomes `bottleneck_qps`
    /// on a Confirmed verdict); `max_successful_qps` is the controller's
    /// running tally of the highest level that passed its gate so far (§8
    /// S3: the two differ — the bottleneck is declared at a higher QPS than
    /// the last one that actually succeeded).
    pub fn evaluate(&mut self, row: &MetricsRow, current_qps: u32, last_level: Option<&LevelResult>, max_successful_qps: u32) -> TickOutcome {
        if self.verdict_written {
            // §8 property 6: idempotent once a verdict exists.
            return TickOutcome::Confirmed(Box::new(self.read_cached_verdict()));
        }

        let mut triggered = Vec::new();
        let t = self.config.thresholds;

        push_if(&mut triggered, row.cpu.usage_pct > t.cpu_warn_pct, BottleneckKind::Cpu, row.cpu.usage_pct, t.cpu_warn_pct, if row.cpu.usage_pct > t.cpu_critical_pct { Severity::High } else { Severity::Medium });
        push_if(&mut triggered, row.memory.used_pct > t.mem_warn_pct, BottleneckKind::Memory, row.memory.used_pct, t.mem_warn_pct, if row.memory.used_pct > t.mem_critical_pct { Severity::High } else { Severity::Medium });

        for device in &row.devices {
            let baseline = self.config.devices.iter().find(|d| d.name == device.device);
            if let Some(baseline) = baseline {
                let iops_pct = 100.0 * device.aws_standard_iops / baseline.baseline_iops.max(1e-9);
                push_if(&mut triggered, iops_pct > t.device_iops_warn_pct, BottleneckKind::DeviceIops(device.device.clone()), iops_pct, t.device_iops_warn_pct, Severity::Medium);

                let throughput_pct = 100.0 * device.aws_standard_throughput_mibs / baseline.baseline_throughput_mibs.max(1e-9);
                push_if(&mut triggered, throughput_pct > t.device_throughput_warn_pct, BottleneckKind::DeviceThroughput(device.device.clone()), throughput_pct, t.device_throughput_warn_pct, Severity::Medium);
            }
            let max_await = device.r_await_ms.max(device.w_await_ms);
            push_if(&mut triggered, max_await > t.device_latency_warn_ms, BottleneckKind::DeviceLatency(device.device.clone()), max_await, t.device_latency_warn_ms, Severity::High);
        }

        let net_pct = 100.0 * row.network.total_mbps / self.config.network_bandwidth_mbps.max(1e-9);
        push_if(&mut triggered, net_pct > t.network_warn_pct, BottleneckKind::Network, net_pct, t.network_warn_pct, Severity::Medium);

        let mut rpc_necessary = false;
        if let Some(level) = last_level {
            let success_rate = level.success_rate_pct();
            if success_rate < t.rpc_success_rate_min_pct {
                triggered.push(TriggeredPredicate { kind: BottleneckKind::RpcSuccessRate, measured: success_rate, threshold: t.rpc_success_rate_min_pct, severity: Severity::High });
                rpc_necessary = true;
            }
            if let Some(p99) = level.p99_latency_ms {
                if p99 > t.rpc_latency_warn_ms {
                    triggered.push(TriggeredPredicate { kind: BottleneckKind::RpcLatency, measured: p99, threshold: t.rpc_latency_warn_ms, severity: Severity::High });
                    rpc_necessary = true;
                }
            }
            if level.error_rate_pct > t.rpc_error_rate_warn_pct {
                triggered.push(TriggeredPredicate { kind: BottleneckKind::RpcErrorRate, measured: level.error_rate_pct, threshold: t.rpc_error_rate_warn_pct, severity: Severity::High });
            }
        }

        let node_condition_now = row.block_height.diff.unsigned_abs() as i64 > t.node_unhealthy_diff_threshold
            || row.block_height.local_health == HealthStatus::Unhealthy;
        if node_condition_now {
            self.node_unhealthy_since.get_or_insert(row.timestamp);
        } else {
            self.node_unhealthy_since = None;
        }
        let node_unhealthy = self
            .node_unhealthy_since
            .map(|since| (row.timestamp - since).num_seconds() as u64 >= t.node_unhealthy_sustain_secs)
            .unwrap_or(false);
        if node_unhealthy {
            triggered.push(TriggeredPredicate { kind: BottleneckKind::NodeUnhealthy, measured: row.block_height.diff as f64, threshold: t.node_unhealthy_diff_threshold as f64, severity: Severity::High });
        }

        let any_resource = triggered.iter().any(|p| matches!(p.kind, BottleneckKind::Cpu | BottleneckKind::Memory | BottleneckKind::DeviceIops(_) | BottleneckKind::DeviceThroughput(_) | BottleneckKind::DeviceLatency(_) | BottleneckKind::Network));

        let outcome = if rpc_necessary && !node_unhealthy {
            // Scenario A-RPC: necessary alone, bypasses node-health gate.
            self.state = self.state.advance(BottleneckClassification::RpcQuality, self.config.consecutive_confirmations_k);
            Some(BottleneckClassification::RpcQuality)
        } else if (any_resource || rpc_necessary) && node_unhealthy {
            // Scenario B: composite. Also covers RPC-quality breaching
            // alongside node unhealthy — two independent real problems,
            // not grounds to discard the RPC signal.
            self.state = self.state.advance(BottleneckClassification::Composite, self.config.consecutive_confirmations_k);
            Some(BottleneckClassification::Composite)
        } else if !any_resource && !rpc_necessary && node_unhealthy {
            // Scenario C: declared immediately, no K wait.
            self.state = DetectorState::confirm_immediately(BottleneckClassification::NodeUnhealthy);
            Some(BottleneckClassification::NodeUnhealthy)
        } else {
            // Scenario A-Resource (resource-only, node healthy) or D (nothing tripped).
            self.state = DetectorState::reset();
            None
        };

        if !triggered.is_empty() {
            let severity = triggered.iter().map(|p| p.severity).max().unwrap_or(Severity::Low);
            let classification = outcome.unwrap_or(BottleneckClassification::ResourceExceeded);
            let event = BottleneckEvent {
                timestamp: row.timestamp,
                qps_at_detection: current_qps,
                severity,
                triggered: triggered.clone(),
                classification,
            };
            if let Err(e) = self.append_event(&event) {
                log::error!("failed to persist bottleneck event: {e}");
            }
        }

        match self.state {
            DetectorState::Confirmed { classification } => {
                let verdict = self.build_verdict(row, current_qps, max_successful_qps, classification, triggered);
                match self.persist_verdict(&verdict) {
                    Ok(()) => {
                        self.verdict_written = true;
                        TickOutcome::Confirmed(Box::new(verdict))
                    }
                    Err(e) => {
                        log::error!("failed to persist bottleneck verdict, will retry: {e}");
                        TickOutcome::Suspected { classification, count: self.state.consecutive_count() }
                    }
                }
            }
            DetectorState::Suspected { classification, count } => TickOutcome::Suspected { classification, count },
            DetectorState::Normal => TickOutcome::Normal,
        }
    }

    fn build_verdict(&self, row: &MetricsRow, current_qps: u32, max_successful_qps: u32, classification: BottleneckClassification, triggered: Vec<TriggeredPredicate>) -> BottleneckVerdict {
        let severity = triggered.iter().map(|p| p.severity).max().unwrap_or(Severity::Medium);
        let window = AnalysisWindow::centered_on(row.timestamp, self.config.analysis_window_secs);
        let device_summary = row.devices.iter().map(|d| (d.device.clone(), d.aws_standard_iops, d.aws_standard_throughput_mibs)).collect();

        BottleneckVerdict {
            detection_time: row.timestamp,
            max_successful_qps,
            bottleneck_qps: current_qps,
            reasons: triggered,
            severity,
            classification,
            consecutive_confirmations: self.config.consecutive_confirmations_k,
            analysis_window: window,
            context: MetricsSnapshot {
                cpu_usage_pct: row.cpu.usage_pct,
                mem_usage_pct: row.memory.used_pct,
                network_total_mbps: row.network.total_mbps,
                device_summary,
            },
        }
    }

    fn append_event(&self, event: &BottleneckEvent) -> Result<(), DetectorError> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .map_err(|e| DetectorError::EventWrite(e.to_string()))?;
        let line = serde_json::to_string(event).map_err(|e| DetectorError::EventWrite(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| DetectorError::EventWrite(e.to_string()))?;
        Ok(())
    }

    fn persist_verdict(&self, verdict: &BottleneckVerdict) -> Result<(), DetectorError> {
        let tmp = self.verdict_path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(verdict).map_err(|e| DetectorError::VerdictWrite(e.to_string()))?;
        std::fs::write(&tmp, json).map_err(|e| DetectorError::VerdictWrite(e.to_string()))?;
        std::fs::rename(&tmp, &self.verdict_path).map_err(|e| DetectorError::VerdictWrite(e.to_string()))?;
        Ok(())
    }

    fn read_cached_verdict(&self) -> BottleneckVerdict {
        let contents = std::fs::read_to_string(&self.verdict_path).expect("verdict_written implies file exists");
        serde_json::from_str(&contents).expect("verdict file is our own well-formed JSON")
    }

    pub fn is_confirmed(&self) -> bool {
        self.verdict_written
    }
}

fn push_if(triggered: &mut Vec<TriggeredPredicate>, condition: bool, kind: BottleneckKind, measured: f64, threshold: f64, severity: Severity) {
    if condition {
        triggered.push(TriggeredPredicate { kind, measured, threshold, severity });
    }
}
