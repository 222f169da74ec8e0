//! Per-tick sampler fan-out (§4.1, §4.2).
//!
//! Every sampler implements the same `Sampler` trait so the per-tick
//! deadline and subscription plumbing lives once in `Scheduler` instead of
//! being duplicated per sampler (§9).

pub mod cpu;
pub mod device;
pub mod ena;
pub mod loadgen_progress;
pub mod mainnet_rpc;
pub mod memory;
pub mod network;
pub mod node_rpc;
pub mod overhead;

pub use loadgen_progress::CurrentQps;

use crate::clock::{ClockTask, StopSignal, Tick};
use crate::error::SamplerError;
use crate::models::{CpuFields, DeviceFields, EnaFields, HealthStatus, LoadGenFields, MemoryFields, MonitorOverheadFields, NetworkFields};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// One sampler's contract: produce fields for a tick, or fail in isolation.
#[async_trait]
pub trait Sampler: Send {
    fn name(&self) -> &'static str;
    async fn sample(&mut self, tick: Tick) -> SamplerOutput;
}

/// Tagged union of everything a sampler can produce in one tick.
#[derive(Debug, Clone)]
pub enum SamplerOutput {
    Cpu(CpuFields),
    Memory(MemoryFields),
    Device(DeviceFields),
    Network(NetworkFields),
    Ena(EnaFields),
    Overhead(MonitorOverheadFields),
    LocalNode(NodeHeightSample),
    MainnetNode(NodeHeightSample),
    LoadGen(LoadGenFields),
    Failed { sampler: String, error: SamplerError },
}

/// One RPC endpoint's height/health reading for a tick. The Aggregator
/// joins a `LocalNode` and a `MainnetNode` sample into the combined
/// `BlockHeightFields` (diff, data-loss) per §3's invariant (g).
#[derive(Debug, Clone, Copy)]
pub struct NodeHeightSample {
    pub height: u64,
    pub health: HealthStatus,
}

/// Spawns the clock and one task per sampler, returns the clock's join
/// handle and the channel the Aggregator reads `(tick_seq, output)` pairs
/// from.
pub struct Scheduler;

impl Scheduler {
    pub fn spawn_all(
        samplers: Vec<Box<dyn Sampler>>,
        tick_interval: Duration,
        stop: StopSignal,
    ) -> (JoinHandle<()>, mpsc::Receiver<(u64, SamplerOutput)>) {
        let sampler_count = samplers.len().max(1);
        let (clock, tx) = ClockTask::new(tick_interval, sampler_count.max(8));
        let (out_tx, out_rx) = mpsc::channel(1024);

        // Every sampler subscribes before the clock starts ticking, per §4.1.
        for mut sampler in samplers {
            let mut rx = tx.subscribe();
            let out_tx = out_tx.clone();
            let deadline = tick_interval;
            tokio::spawn(async move {
                loop {
                    let tick = match rx.recv().await {
                        Ok(tick) => tick,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    };
                    let name = sampler.name();
                    let output = match tokio::time::timeout(deadline, sampler.sample(tick)).await {
                        Ok(output) => output,
                        Err(_) => SamplerOutput::Failed {
                            sampler: name.to_string(),
                            error: SamplerError::DeadlineExceeded(deadline),
                        },
                    };
                    if out_tx.send((tick.seq, output)).await.is_err() {
                        break;
                    }
                }
            });
        }

        let clock_handle = tokio::spawn(clock.run(stop));
        (clock_handle, out_rx)
    }
}

/// Shared retry helper: runs `attempt` up to `retries` times with a short
/// linear backoff, used by the RPC-backed samplers (§7: "recovered locally
/// with per-tick retries").
pub async fn retry<T, E, F, Fut>(retries: u32, mut attempt: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut last_err = None;
    for n in 0..retries.max(1) {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_err = Some(e);
                if n + 1 < retries {
                    tokio::time::sleep(Duration::from_millis(50 * (n as u64 + 1))).await;
                }
            }
        }
    }
    Err(last_err.expect("retry loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let mut calls = 0;
        let result: Result<u32, &str> = retry(3, || {
            calls += 1;
            let calls = calls;
            async move {
                if calls < 3 {
                    Err("not yet")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn retry_exhausts_and_returns_last_error() {
        let result: Result<u32, &str> = retry(2, || async { Err("nope") }).await;
        assert_eq!(result, Err("nope"));
    }
}
