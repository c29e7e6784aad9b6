//! Ethereum JSON-RPC contract client

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use spotnet_types::wire::{as_u64, parse_uint};

use crate::abi;
use crate::client::ContractClient;
use crate::{ChainError, ChainResult};

const NONCE_OF: &str = "nonceOf(address)";
const OBJECTIVE: &str = "objective()";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Contract client over an HTTP JSON-RPC node
pub struct RpcContractClient {
    endpoint: String,
    factory: Address,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcContractClient {
    /// `factory` is the contract that tracks offer nonces
    pub fn new(endpoint: impl Into<String>, factory: Address) -> Self {
        Self {
            endpoint: endpoint.into(),
            factory,
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    async fn request(&self, method: &str, params: Value) -> ChainResult<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        tracing::debug!(method, id = request.id, "chain rpc request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChainError::Transport(format!(
                "{} returned HTTP {}",
                self.endpoint,
                response.status()
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        unwrap_response(body)
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> ChainResult<Vec<u8>> {
        let params = json!([
            {
                "to": to.to_checksum(None),
                "data": format!("0x{}", hex::encode(data)),
            },
            "latest"
        ]);
        let result = self.request("eth_call", params).await?;
        let text = result
            .as_str()
            .ok_or_else(|| ChainError::Decode(format!("eth_call returned {}", result)))?;
        abi::decode_hex_data(text)
    }
}

fn unwrap_response(body: RpcResponse) -> ChainResult<Value> {
    if let Some(error) = body.error {
        return Err(ChainError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    body.result
        .ok_or_else(|| ChainError::Decode("response has neither result nor error".to_string()))
}

fn parse_quantity(value: &Value) -> ChainResult<u64> {
    let text = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected hex quantity, got {}", value)))?;
    let quantity = parse_uint(text).map_err(ChainError::Decode)?;
    as_u64(&quantity).ok_or_else(|| ChainError::Decode(format!("quantity {} exceeds u64", quantity)))
}

#[async_trait]
impl ContractClient for RpcContractClient {
    async fn block_height(&self) -> ChainResult<u64> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&result)
    }

    async fn nonce_of(&self, account: Address) -> ChainResult<U256> {
        let data = abi::encode_call_with_address(NONCE_OF, account);
        let output = self.eth_call(self.factory, data).await?;
        abi::decode_uint256(&output)
    }

    async fn objective_of(&self, liability: Address) -> ChainResult<Vec<u8>> {
        let output = self.eth_call(liability, abi::encode_call(OBJECTIVE)).await?;
        abi::decode_bytes(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 7,
            method: "eth_blockNumber",
            params: json!([]),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"jsonrpc": "2.0", "id": 7, "method": "eth_blockNumber", "params": []})
        );
    }

    #[test]
    fn test_unwrap_response() {
        let ok: RpcResponse = serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": "0x1f4"})).unwrap();
        assert_eq!(parse_quantity(&unwrap_response(ok).unwrap()).unwrap(), 500);

        let err: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32000, "message": "execution reverted"}
        }))
        .unwrap();
        assert_eq!(
            unwrap_response(err).unwrap_err(),
            ChainError::Rpc {
                code: -32000,
                message: "execution reverted".to_string()
            }
        );

        let empty: RpcResponse = serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1})).unwrap();
        assert!(matches!(unwrap_response(empty), Err(ChainError::Decode(_))));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        assert!(parse_quantity(&json!(12)).is_err());
        assert!(parse_quantity(&json!("0x10000000000000000")).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transport_error() {
        let client = RpcContractClient::new("http://127.0.0.1:1", Address::ZERO);
        assert!(matches!(
            client.block_height().await,
            Err(ChainError::Transport(_))
        ));
    }
}
