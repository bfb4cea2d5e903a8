//! JSON-RPC client for Ethereum endpoints.

use std::time::Duration;

use alloy_core::primitives::U256;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Default timeout for a single RPC request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors returned by [`RpcClient::call`].
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The HTTP request could not be sent or its response could not be read.
    #[error("failed to reach RPC endpoint for {method}: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rejected {
        code: i64,
        message: String,
        data: Option<String>,
    },

    /// The node answered with something that is not the expected payload.
    #[error("invalid {method} response: {message}")]
    Decode { method: String, message: String },
}

impl RpcError {
    /// Whether the node itself refused the request.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RpcError::Rejected { .. })
    }
}

/// A JSON-RPC 2.0 client bound to one HTTP endpoint.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a client for `url` whose requests time out after `request_timeout`.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| RpcError::Transport {
                method: "client setup".to_string(),
                source,
            })?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// The endpoint this client talks to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make a JSON-RPC call and deserialize the result.
    ///
    /// # Arguments
    /// * `method` - The RPC method name
    /// * `params` - The method parameters
    ///
    /// # Returns
    /// The deserialized result. A `null` result deserializes into `T` like any
    /// other value, so callers polling for optional data should ask for `Option<_>`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        tracing::trace!(method, url = %self.url, "Sending RPC request");

        let transport = |source| RpcError::Transport {
            method: method.to_string(),
            source,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        let result: Value = serde_json::from_str(&body).map_err(|e| RpcError::Decode {
            method: method.to_string(),
            message: format!("HTTP {status}, body is not JSON ({e})"),
        })?;

        if let Some(error) = result.get("error") {
            return Err(RpcError::Rejected {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                data: error
                    .get("data")
                    .and_then(Value::as_str)
                    .map(String::from),
            });
        }

        let result_value = result.get("result").cloned().ok_or_else(|| RpcError::Decode {
            method: method.to_string(),
            message: "no result in response".to_string(),
        })?;

        serde_json::from_value(result_value).map_err(|e| RpcError::Decode {
            method: method.to_string(),
            message: e.to_string(),
        })
    }

    /// Call a method returning a hex quantity that fits in a `u64`.
    pub async fn call_u64(&self, method: &str, params: Vec<Value>) -> Result<u64, RpcError> {
        let raw: String = self.call(method, params).await?;
        parse_u64(&raw).map_err(|message| RpcError::Decode {
            method: method.to_string(),
            message,
        })
    }

    /// Call a method returning a hex quantity that fits in a `u128`.
    pub async fn call_u128(&self, method: &str, params: Vec<Value>) -> Result<u128, RpcError> {
        let raw: String = self.call(method, params).await?;
        parse_u128(&raw).map_err(|message| RpcError::Decode {
            method: method.to_string(),
            message,
        })
    }

    /// Call a method returning a 256-bit hex quantity.
    pub async fn call_u256(&self, method: &str, params: Vec<Value>) -> Result<U256, RpcError> {
        let raw: String = self.call(method, params).await?;
        parse_u256(&raw).map_err(|message| RpcError::Decode {
            method: method.to_string(),
            message,
        })
    }
}

fn quantity_digits(s: &str) -> Result<&str, String> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| format!("quantity '{s}' is not 0x-prefixed"))?;
    if digits.is_empty() {
        return Err("empty quantity".to_string());
    }
    Ok(digits)
}

/// Parse a `0x`-prefixed hex quantity into a `u64`.
pub fn parse_u64(s: &str) -> Result<u64, String> {
    u64::from_str_radix(quantity_digits(s)?, 16).map_err(|e| format!("bad quantity '{s}': {e}"))
}

/// Parse a `0x`-prefixed hex quantity into a `u128`.
pub fn parse_u128(s: &str) -> Result<u128, String> {
    u128::from_str_radix(quantity_digits(s)?, 16).map_err(|e| format!("bad quantity '{s}': {e}"))
}

/// Parse a `0x`-prefixed hex quantity into a [`U256`].
pub fn parse_u256(s: &str) -> Result<U256, String> {
    U256::from_str_radix(quantity_digits(s)?, 16).map_err(|e| format!("bad quantity '{s}': {e}"))
}

/// Render a number as a JSON-RPC hex quantity.
pub fn quantity(value: impl std::fmt::LowerHex) -> String {
    format!("0x{value:x}")
}

/// Render bytes as JSON-RPC hex data.
pub fn hex_bytes(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
