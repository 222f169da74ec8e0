//! System memory sampler: three fields from `/proc/meminfo` (§4.2).

use super::{Sampler, SamplerOutput};
use crate::clock::Tick;
use crate::models::MemoryFields;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;

fn read_meminfo() -> Option<HashMap<String, u64>> {
    let contents = fs::read_to_string("/proc/meminfo").ok()?;
    let mut map = HashMap::new();
    for line in contents.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next()?.to_string();
        let rest = parts.next()?.trim();
        let value_kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
        map.insert(key, value_kb);
    }
    Some(map)
}

#[derive(Default)]
pub struct MemorySampler;

impl MemorySampler {
    pub fn new() -> Self {
        MemorySampler
    }
}

#[async_trait]
impl Sampler for MemorySampler {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn sample(&mut self, _tick: Tick) -> SamplerOutput {
        let fields = match read_meminfo() {
            Some(info) => {
                let total = *info.get("MemTotal").unwrap_or(&0);
                let available = *info.get("MemAvailable").unwrap_or(&total);
                let used = total.saturating_sub(available);
                let used_pct = if total > 0 { 100.0 * used as f64 / total as f64 } else { 0.0 };
                MemoryFields {
                    used_kb: used,
                    total_kb: total,
                    used_pct,
                }
            }
            None => MemoryFields {
                used_kb: 0,
                total_kb: 0,
                used_pct: 0.0,
            },
        };
        SamplerOutput::Memory(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_sample_produces_bounded_percentage() {
        let mut sampler = MemorySampler::new();
        let tick = Tick { seq: 0, at: chrono::Utc::now() };
        match sampler.sample(tick).await {
            SamplerOutput::Memory(fields) => assert!(fields.used_pct >= 0.0 && fields.used_pct <= 100.0),
            _ => panic!("expected Memory variant"),
        }
    }
}
