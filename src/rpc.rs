//! JSON-RPC transport for the chain endpoint.
//!
//! This module provides the raw request/response plumbing shared by the read
//! and write gateways. It performs no retries itself: the read gateway wraps
//! calls in a bounded retry, while write-side calls are issued exactly once.

use crate::config::ClientConfig;
use crate::error::{RecoveryError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// JSON-RPC request ID type
type RequestId = u64;

/// JSON-RPC client for the chain endpoint
#[derive(Clone)]
pub struct ChainRpcClient {
    /// HTTP client
    client: Client,
    /// Base URL for the RPC endpoint
    base_url: String,
    /// Request ID counter
    request_id: Arc<std::sync::atomic::AtomicU64>,
}

/// JSON-RPC request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: RequestId,
    method: String,
    params: Value,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: RequestId,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[allow(dead_code)]
    data: Option<Value>,
}

impl ChainRpcClient {
    /// Create a new RPC client
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(RecoveryError::Network)?;

        Ok(Self {
            client,
            base_url: config.rpc_url.clone(),
            request_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
        })
    }

    /// Get next request ID
    fn next_request_id(&self) -> RequestId {
        self.request_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    /// Make a single JSON-RPC call
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request_id = self.next_request_id();

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: request_id,
            method: method.to_string(),
            params,
        };

        debug!("Chain RPC request: {} (id: {})", method, request_id);

        let response = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .map_err(RecoveryError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RecoveryError::Rpc(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RecoveryError::InvalidResponse(e.to_string()))?;

        if let Some(err) = rpc_response.error {
            error!("Chain RPC error: {} (code: {})", err.message, err.code);
            return Err(RecoveryError::Rpc(format!(
                "{} (code: {})",
                err.message, err.code
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| RecoveryError::Rpc("Missing result in response".to_string()))
    }

    /// Get the latest block number
    pub async fn get_latest_block(&self) -> Result<u64> {
        let result = self.call("getLatestBlock", serde_json::json!({})).await?;

        result["number"].as_u64().ok_or_else(|| {
            RecoveryError::InvalidResponse("Missing number in block response".to_string())
        })
    }

    /// Health check - verify connectivity to the RPC endpoint
    pub async fn health_check(&self) -> Result<bool> {
        debug!("Performing chain RPC health check");

        match self.get_latest_block().await {
            Ok(_) => Ok(true),
            Err(e) => {
                error!("Chain RPC health check failed: {:?}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_client_creation() {
        let config = ClientConfig::testnet();
        let client = ChainRpcClient::new(&config);
        assert!(client.is_ok());
    }

    #[test]
    fn test_request_id_increment() {
        let config = ClientConfig::testnet();
        let client = ChainRpcClient::new(&config).unwrap();

        assert_eq!(client.next_request_id(), 1);
        assert_eq!(client.next_request_id(), 2);
        assert_eq!(client.next_request_id(), 3);
    }
}
