//! Whole-system CPU breakdown sampler (§4.2). Missing readings default to
//! zero with an availability flag rather than a distinct error.

use super::{Sampler, SamplerOutput};
use crate::clock::Tick;
use crate::models::CpuFields;
use async_trait::async_trait;
use std::fs;

#[derive(Debug, Clone, Copy, Default)]
struct ProcStatSnapshot {
    user: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    softirq: u64,
    total: u64,
}

fn read_proc_stat() -> Option<ProcStatSnapshot> {
    let contents = fs::read_to_string("/proc/stat").ok()?;
    let line = contents.lines().next()?;
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let values: Vec<u64> = fields.filter_map(|f| f.parse().ok()).collect();
    if values.len() < 7 {
        return None;
    }
    let (user, nice, system, idle, iowait, irq, softirq) =
        (values[0], values[1], values[2], values[3], values[4], values[5], values[6]);
    let total = user + nice + system + idle + iowait + irq + softirq;
    Some(ProcStatSnapshot {
        user: user + nice,
        system: system + irq,
        idle,
        iowait,
        softirq,
        total,
    })
}

pub struct CpuSampler {
    last: Option<ProcStatSnapshot>,
}

impl CpuSampler {
    pub fn new() -> Self {
        CpuSampler { last: None }
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for CpuSampler {
    fn name(&self) -> &'static str {
        "cpu"
    }

    async fn sample(&mut self, _tick: Tick) -> SamplerOutput {
        let current = read_proc_stat();
        let fields = match (self.last, current) {
            (Some(prev), Some(cur)) if cur.total > prev.total => {
                let delta_total = (cur.total - prev.total) as f64;
                let pct = |cur_v: u64, prev_v: u64| -> f64 {
                    100.0 * (cur_v.saturating_sub(prev_v)) as f64 / delta_total
                };
                CpuFields {
                    usage_pct: 100.0 - pct(cur.idle, prev.idle),
                    user_pct: pct(cur.user, prev.user),
                    system_pct: pct(cur.system, prev.system),
                    iowait_pct: pct(cur.iowait, prev.iowait),
                    softirq_pct: pct(cur.softirq, prev.softirq),
                    idle_pct: pct(cur.idle, prev.idle),
                }
            }
            _ => CpuFields {
                usage_pct: 0.0,
                user_pct: 0.0,
                system_pct: 0.0,
                iowait_pct: 0.0,
                softirq_pct: 0.0,
                idle_pct: 100.0,
            },
        };
        self.last = current;
        SamplerOutput::Cpu(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_sample_without_history_is_idle() {
        let mut sampler = CpuSampler::new();
        let tick = Tick { seq: 0, at: chrono::Utc::now() };
        match sampler.sample(tick).await {
            SamplerOutput::Cpu(fields) => assert_eq!(fields.idle_pct, 100.0),
            _ => panic!("expected Cpu variant"),
        }
    }

    #[tokio::test]
    async fn second_sample_produces_a_delta_based_reading() {
        let mut sampler = CpuSampler::new();
        let tick = Tick { seq: 0, at: chrono::Utc::now() };
        sampler.sample(tick).await;
        match sampler.sample(tick).await {
            SamplerOutput::Cpu(fields) => {
                assert!(fields.usage_pct >= 0.0 && fields.usage_pct <= 100.0);
            }
            _ => panic!("expected Cpu variant"),
        }
    }
}
