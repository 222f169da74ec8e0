//! AWS ENA allowance-counter sampler (§4.2). Present only on AWS platforms;
//! the Scheduler simply omits this sampler when `PlatformInfo.ena_available`
//! is false, so the schema drops the block entirely rather than emitting
//! zeros for an absent feature.

use super::{Sampler, SamplerOutput};
use crate::clock::Tick;
use crate::models::EnaFields;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;

const ETHTOOL_STATS_GLOB: &str = "/sys/class/net";

fn read_ena_stats(interface: &str) -> Option<HashMap<String, u64>> {
    let dir = format!("{ETHTOOL_STATS_GLOB}/{interface}/statistics");
    let entries = fs::read_dir(&dir).ok()?;
    let mut map = HashMap::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if let Ok(value) = fs::read_to_string(entry.path()) {
            if let Ok(n) = value.trim().parse::<u64>() {
                map.insert(name, n);
            }
        }
    }
    Some(map)
}

pub struct EnaSampler {
    interface: String,
}

impl EnaSampler {
    pub fn new(interface: impl Into<String>) -> Self {
        EnaSampler { interface: interface.into() }
    }
}

#[async_trait]
impl Sampler for EnaSampler {
    fn name(&self) -> &'static str {
        "ena"
    }

    async fn sample(&mut self, _tick: Tick) -> SamplerOutput {
        let stats = read_ena_stats(&self.interface).unwrap_or_default();
        let get = |key: &str| *stats.get(key).unwrap_or(&0);
        SamplerOutput::Ena(EnaFields {
            bw_in_allowance_exceeded: get("bw_in_allowance_exceeded"),
            bw_out_allowance_exceeded: get("bw_out_allowance_exceeded"),
            pps_allowance_exceeded: get("pps_allowance_exceeded"),
            conntrack_allowance_exceeded: get("conntrack_allowance_exceeded"),
            linklocal_allowance_exceeded: get("linklocal_allowance_exceeded"),
            conntrack_allowance_available: get("conntrack_allowance_available"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_counters_default_to_zero() {
        let mut sampler = EnaSampler::new("nonexistent-iface-xyz");
        let tick = Tick { seq: 0, at: chrono::Utc::now() };
        match sampler.sample(tick).await {
            SamplerOutput::Ena(fields) => assert_eq!(fields.bw_in_allowance_exceeded, 0),
            _ => panic!("expected Ena variant"),
        }
    }
}
