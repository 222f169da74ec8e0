//! Local node health/height sampler (§4.2): retries up to 3 times with
//! short backoff per tick; on total failure emits `unhealthy` and the
//! sentinel height rather than failing the tick.

use super::{retry, NodeHeightSample, Sampler, SamplerOutput};
use crate::clock::Tick;
use crate::models::{HealthStatus, UNKNOWN_U64};
use crate::rpc::JsonRpcClient;
use async_trait::async_trait;

pub struct NodeRpcSampler {
    client: JsonRpcClient,
    retries: u32,
}

impl NodeRpcSampler {
    pub fn new(client: JsonRpcClient, retries: u32) -> Self {
        NodeRpcSampler { client, retries }
    }
}

#[async_trait]
impl Sampler for NodeRpcSampler {
    fn name(&self) -> &'static str {
        "node_rpc"
    }

    async fn sample(&mut self, _tick: Tick) -> SamplerOutput {
        let health_result = retry(self.retries, || self.client.health()).await;
        let height_result = retry(self.retries, || self.client.block_height()).await;

        let health = match health_result {
            Ok(true) => HealthStatus::Healthy,
            _ => HealthStatus::Unhealthy,
        };
        let height = height_result.unwrap_or(UNKNOWN_U64);

        SamplerOutput::LocalNode(NodeHeightSample { height, health })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn unreachable_node_reports_unhealthy_and_sentinel() {
        let client = JsonRpcClient::new("http://127.0.0.1:1", "health", "getBlockHeight", Duration::from_millis(100));
        let mut sampler = NodeRpcSampler::new(client, 1);
        let tick = Tick { seq: 0, at: chrono::Utc::now() };
        match sampler.sample(tick).await {
            SamplerOutput::LocalNode(sample) => {
                assert_eq!(sample.health, HealthStatus::Unhealthy);
                assert_eq!(sample.height, UNKNOWN_U64);
            }
            _ => panic!("expected LocalNode variant"),
        }
    }
}
