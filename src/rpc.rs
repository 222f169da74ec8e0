//! Thin chain-agnostic JSON-RPC client shared by the node and mainnet
//! samplers (§4.9). Method names are configurable per chain; the client
//! itself only knows about two operations.

use crate::error::RpcError;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: String,
    health_method: String,
    height_method: String,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, health_method: impl Into<String>, height_method: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        JsonRpcClient {
            client,
            url: url.into(),
            health_method: health_method.into(),
            height_method: height_method.into(),
        }
    }

    pub async fn health(&self) -> Result<bool, RpcError> {
        let response = self.call(&self.health_method.clone(), json!([])).await?;
        Ok(response.get("result").map(|r| !r.is_null()).unwrap_or(false))
    }

    pub async fn block_height(&self) -> Result<u64, RpcError> {
        let response = self.call(&self.height_method.clone(), json!([])).await?;
        response
            .get("result")
            .and_then(|r| r.as_u64().or_else(|| r.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| RpcError::MalformedResponse("missing numeric `result`".to_string()))
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout(Duration::from_secs(0))
                } else {
                    RpcError::Request(e.to_string())
                }
            })?;

        response
            .json::<Value>()
            .await
            .map_err(|e| RpcError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_false_on_mockito_down() {
        let client = JsonRpcClient::new(
            "http://127.0.0.1:1", // unroutable: connection refused
            "health",
            "getBlockHeight",
            Duration::from_millis(200),
        );
        let result = client.health().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn health_and_height_parse_mock_response() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":12345}"#)
            .create_async()
            .await;

        let client = JsonRpcClient::new(server.url(), "health", "getBlockHeight", Duration::from_secs(2));
        assert_eq!(client.block_height().await.unwrap(), 12345);
        assert!(client.health().await.unwrap());
    }
}
