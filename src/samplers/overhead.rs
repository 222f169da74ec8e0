//! Monitor-self-usage sampler (§4.2): the two-field `overhead` block
//! embedded in every `MetricsRow`, charging I/O the harness itself performs
//! back to "the monitor" rather than letting it appear as node load. Values
//! are often sub-unit since monitor I/O is mostly against virtual
//! filesystems; this sampler must not round them to zero prematurely.

use super::{Sampler, SamplerOutput};
use crate::clock::Tick;
use crate::models::MonitorOverheadFields;
use async_trait::async_trait;
use std::fs;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct SelfIoSnapshot {
    syscr: u64,
    syscw: u64,
    rchar: u64,
    wchar: u64,
}

fn read_self_io() -> Option<SelfIoSnapshot> {
    let contents = fs::read_to_string("/proc/self/io").ok()?;
    let mut snapshot = SelfIoSnapshot { syscr: 0, syscw: 0, rchar: 0, wchar: 0 };
    for line in contents.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next()?.trim();
        let value: u64 = parts.next()?.trim().parse().ok()?;
        match key {
            "syscr" => snapshot.syscr = value,
            "syscw" => snapshot.syscw = value,
            "rchar" => snapshot.rchar = value,
            "wchar" => snapshot.wchar = value,
            _ => {}
        }
    }
    Some(snapshot)
}

pub struct MonitorOverheadSampler {
    last: Option<(SelfIoSnapshot, Instant)>,
}

impl MonitorOverheadSampler {
    pub fn new() -> Self {
        MonitorOverheadSampler { last: None }
    }
}

impl Default for MonitorOverheadSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for MonitorOverheadSampler {
    fn name(&self) -> &'static str {
        "overhead"
    }

    async fn sample(&mut self, _tick: Tick) -> SamplerOutput {
        let now = Instant::now();
        let current = read_self_io();

        let fields = match (self.last, current) {
            (Some((prev, prev_time)), Some(cur)) => {
                let elapsed_secs = (now - prev_time).as_secs_f64().max(0.001);
                let d_ops = (cur.syscr.saturating_sub(prev.syscr) + cur.syscw.saturating_sub(prev.syscw)) as f64;
                let d_bytes = (cur.rchar.saturating_sub(prev.rchar) + cur.wchar.saturating_sub(prev.wchar)) as f64;
                MonitorOverheadFields {
                    monitor_iops: d_ops / elapsed_secs,
                    monitor_throughput_mibs: d_bytes / (1024.0 * 1024.0) / elapsed_secs,
                }
            }
            _ => MonitorOverheadFields {
                monitor_iops: 0.0,
                monitor_throughput_mibs: 0.0,
            },
        };

        self.last = current.map(|c| (c, now));
        SamplerOutput::Overhead(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_sample_has_no_history_and_reports_zero() {
        let mut sampler = MonitorOverheadSampler::new();
        let tick = Tick { seq: 0, at: chrono::Utc::now() };
        match sampler.sample(tick).await {
            SamplerOutput::Overhead(fields) => {
                assert_eq!(fields.monitor_iops, 0.0);
                assert_eq!(fields.monitor_throughput_mibs, 0.0);
            }
            _ => panic!("expected Overhead variant"),
        }
    }

    #[tokio::test]
    async fn sub_unit_throughput_is_not_rounded_away() {
        let mut sampler = MonitorOverheadSampler {
            last: Some((
                SelfIoSnapshot { syscr: 0, syscw: 0, rchar: 0, wchar: 0 },
                Instant::now() - std::time::Duration::from_secs(1),
            )),
        };
        // Simulate a tiny read by injecting a snapshot directly rather than
        // depending on actual process I/O during the test.
        sampler.last = Some((
            SelfIoSnapshot { syscr: 1, syscw: 0, rchar: 100, wchar: 0 },
            Instant::now() - std::time::Duration::from_secs(1),
        ));
        let tick = Tick { seq: 0, at: chrono::Utc::now() };
        let fields = match sampler.sample(tick).await {
            SamplerOutput::Overhead(f) => f,
            _ => panic!("expected Overhead variant"),
        };
        assert!(fields.monitor_throughput_mibs >= 0.0);
    }
}
