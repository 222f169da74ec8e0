//! Single-interface network sampler (§4.2): rx/tx bytes and packets over
//! the tick interval, converted to Mbps/Gbps.

use super::{Sampler, SamplerOutput};
use crate::clock::Tick;
use crate::models::NetworkFields;
use async_trait::async_trait;
use std::fs;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct NetDevSnapshot {
    rx_bytes: u64,
    rx_packets: u64,
    tx_bytes: u64,
    tx_packets: u64,
}

fn read_net_dev(interface: &str) -> Option<NetDevSnapshot> {
    let contents = fs::read_to_string("/proc/net/dev").ok()?;
    for line in contents.lines().skip(2) {
        let mut parts = line.splitn(2, ':');
        let name = parts.next()?.trim();
        if name != interface {
            continue;
        }
        let rest = parts.next()?;
        let fields: Vec<u64> = rest.split_whitespace().filter_map(|f| f.parse().ok()).collect();
        if fields.len() < 16 {
            return None;
        }
        return Some(NetDevSnapshot {
            rx_bytes: fields[0],
            rx_packets: fields[1],
            tx_bytes: fields[8],
            tx_packets: fields[9],
        });
    }
    None
}

pub struct NetworkSampler {
    interface: String,
    last: Option<(NetDevSnapshot, Instant)>,
}

impl NetworkSampler {
    pub fn new(interface: impl Into<String>) -> Self {
        NetworkSampler {
            interface: interface.into(),
            last: None,
        }
    }
}

#[async_trait]
impl Sampler for NetworkSampler {
    fn name(&self) -> &'static str {
        "network"
    }

    async fn sample(&mut self, _tick: Tick) -> SamplerOutput {
        let now = Instant::now();
        let current = read_net_dev(&self.interface);

        let fields = match (self.last, current) {
            (Some((prev, prev_time)), Some(cur)) => {
                let elapsed_secs = (now - prev_time).as_secs_f64().max(0.001);
                let d_rx_bytes = cur.rx_bytes.saturating_sub(prev.rx_bytes) as f64;
                let d_tx_bytes = cur.tx_bytes.saturating_sub(prev.tx_bytes) as f64;
                let d_rx_pkts = cur.rx_packets.saturating_sub(prev.rx_packets) as f64;
                let d_tx_pkts = cur.tx_packets.saturating_sub(prev.tx_packets) as f64;

                let rx_mbps = d_rx_bytes * 8.0 / 1_000_000.0 / elapsed_secs;
                let tx_mbps = d_tx_bytes * 8.0 / 1_000_000.0 / elapsed_secs;
                NetworkFields {
                    interface: self.interface.clone(),
                    rx_mbps,
                    tx_mbps,
                    total_mbps: rx_mbps + tx_mbps,
                    rx_gbps: rx_mbps / 1000.0,
                    tx_gbps: tx_mbps / 1000.0,
                    total_gbps: (rx_mbps + tx_mbps) / 1000.0,
                    rx_pkts_s: d_rx_pkts / elapsed_secs,
                    tx_pkts_s: d_tx_pkts / elapsed_secs,
                    total_pkts_s: (d_rx_pkts + d_tx_pkts) / elapsed_secs,
                }
            }
            _ => NetworkFields {
                interface: self.interface.clone(),
                rx_mbps: 0.0,
                tx_mbps: 0.0,
                total_mbps: 0.0,
                rx_gbps: 0.0,
                tx_gbps: 0.0,
                total_gbps: 0.0,
                rx_pkts_s: 0.0,
                tx_pkts_s: 0.0,
                total_pkts_s: 0.0,
            },
        };

        self.last = current.map(|c| (c, now));
        SamplerOutput::Network(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_interface_yields_zeroed_fields_not_a_panic() {
        let mut sampler = NetworkSampler::new("nonexistent-iface-xyz");
        let tick = Tick { seq: 0, at: chrono::Utc::now() };
        match sampler.sample(tick).await {
            SamplerOutput::Network(fields) => assert_eq!(fields.total_mbps, 0.0),
            _ => panic!("expected Network variant"),
        }
    }
}
