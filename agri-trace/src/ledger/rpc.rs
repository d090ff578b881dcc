//! Ledger RPC Client
//!
//! JSON-RPC 2.0 transport to the product-ledger gateway. Every call is
//! addressed to the configured contract and, for writes, signed as the
//! configured account.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::LedgerBackend;
use crate::config::LedgerRpcConfig;
use crate::error::{TraceError, TraceResult};
use crate::types::{AppendReceipt, LedgerRecord, NewProduct, ProductId, Region};

/// Gateway error code for a missing product
pub const RPC_NOT_FOUND: i32 = -32004;
/// Gateway error code for invalid parameters
pub const RPC_INVALID_PARAMS: i32 = -32602;
/// Gateway error code for a reverted ledger call
pub const RPC_EXECUTION_REVERTED: i32 = -32000;

/// JSON-RPC request
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
    #[allow(dead_code)]
    id: u64,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

/// `addProduct` result
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddProductResult {
    #[serde(deserialize_with = "lenient_u64")]
    id: u64,
    tx_hash: String,
}

/// `updatePrice` result
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePriceResult {
    tx_hash: String,
}

/// `getProduct` result
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProduct {
    name: String,
    #[serde(deserialize_with = "lenient_f64")]
    base_price: f64,
    state: String,
    district: String,
    market: String,
    #[serde(alias = "farmer")]
    originator: String,
    #[serde(default, deserialize_with = "lenient_f64_vec")]
    price_trail: Vec<f64>,
    #[serde(default)]
    handlers: Vec<String>,
}

impl RawProduct {
    fn into_record(self, id: ProductId) -> LedgerRecord {
        LedgerRecord {
            id,
            name: self.name,
            base_price: self.base_price,
            region: Region::new(self.state, self.district, self.market),
            originator: self.originator,
            price_trail: self.price_trail,
            handlers: self.handlers,
        }
    }
}

/// Ledger values may arrive as JSON numbers or as decimal strings (big integers)
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

impl NumberOrString {
    fn as_f64(&self) -> Option<f64> {
        match self {
            NumberOrString::Number(n) => n.as_f64(),
            NumberOrString::String(s) => s.trim().parse().ok(),
        }
    }

    fn as_u64(&self) -> Option<u64> {
        match self {
            NumberOrString::Number(n) => n.as_u64(),
            NumberOrString::String(s) => {
                let s = s.trim();
                match s.strip_prefix("0x") {
                    Some(hex_digits) => u64::from_str_radix(hex_digits, 16).ok(),
                    None => s.parse().ok(),
                }
            }
        }
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    NumberOrString::deserialize(deserializer)?
        .as_f64()
        .ok_or_else(|| serde::de::Error::custom("expected a decimal number"))
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    NumberOrString::deserialize(deserializer)?
        .as_u64()
        .ok_or_else(|| serde::de::Error::custom("expected an unsigned integer"))
}

fn lenient_f64_vec<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
    Vec::<NumberOrString>::deserialize(deserializer)?
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| serde::de::Error::custom("expected a decimal number"))
        })
        .collect()
}

/// Translate a gateway error into the trace taxonomy
fn map_rpc_error(method: &str, code: i32, message: String) -> TraceError {
    match code {
        RPC_NOT_FOUND => TraceError::NotFound(message),
        RPC_INVALID_PARAMS | RPC_EXECUTION_REVERTED => {
            TraceError::LedgerRejected(format!("{}: {}", method, message))
        }
        _ => TraceError::LedgerUnavailable(format!("{} failed ({}): {}", method, code, message)),
    }
}

/// JSON-RPC ledger backend
pub struct RpcLedger {
    /// HTTP client
    client: Client,
    /// RPC configuration
    config: LedgerRpcConfig,
    /// Request ID counter
    request_id: AtomicU64,
}

impl RpcLedger {
    /// Create a new ledger RPC client
    pub fn new(config: LedgerRpcConfig) -> TraceResult<Self> {
        if config.contract_address.trim().is_empty() {
            return Err(TraceError::Configuration(
                "ledger contract address is not set".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TraceError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            config,
            request_id: AtomicU64::new(0),
        })
    }

    /// RPC configuration
    pub fn config(&self) -> &LedgerRpcConfig {
        &self.config
    }

    /// Make an RPC call
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> TraceResult<T> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!("Ledger RPC call: {} id={}", method, id);

        let mut builder = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .json(&request);

        if let Some(username) = &self.config.username {
            let auth = format!(
                "{}:{}",
                username,
                self.config.password.as_deref().unwrap_or_default()
            );
            builder = builder.header(
                "Authorization",
                format!(
                    "Basic {}",
                    base64::engine::general_purpose::STANDARD.encode(auth)
                ),
            );
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TraceError::LedgerUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Ledger RPC {} returned HTTP {}", method, status);
            return Err(TraceError::LedgerUnavailable(format!(
                "HTTP {} - {}",
                status, body
            )));
        }

        let rpc_response: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| TraceError::LedgerUnavailable(format!("malformed response: {}", e)))?;

        if let Some(error) = rpc_response.error {
            return Err(map_rpc_error(method, error.code, error.message));
        }

        rpc_response
            .result
            .ok_or_else(|| TraceError::LedgerUnavailable("Empty response".to_string()))
    }
}

#[async_trait]
impl LedgerBackend for RpcLedger {
    async fn add_product(&self, caller: &str, product: &NewProduct) -> TraceResult<AppendReceipt> {
        let result: AddProductResult = self
            .call(
                "addProduct",
                serde_json::json!({
                    "contract": self.config.contract_address,
                    "from": caller,
                    "name": product.name,
                    "basePrice": product.base_price,
                    "state": product.region.state,
                    "district": product.region.district,
                    "market": product.region.market,
                }),
            )
            .await?;

        Ok(AppendReceipt {
            id: result.id,
            receipt_ref: result.tx_hash,
        })
    }

    async fn update_price(&self, caller: &str, id: ProductId, new_price: f64) -> TraceResult<String> {
        let result: UpdatePriceResult = self
            .call(
                "updatePrice",
                serde_json::json!({
                    "contract": self.config.contract_address,
                    "from": caller,
                    "id": id,
                    "newPrice": new_price,
                }),
            )
            .await?;
        Ok(result.tx_hash)
    }

    async fn get_product(&self, id: ProductId) -> TraceResult<LedgerRecord> {
        let raw: RawProduct = self
            .call(
                "getProduct",
                serde_json::json!({
                    "contract": self.config.contract_address,
                    "id": id,
                }),
            )
            .await?;
        Ok(raw.into_record(id))
    }

    async fn product_count(&self) -> TraceResult<u64> {
        #[derive(Deserialize)]
        struct Count(#[serde(deserialize_with = "lenient_u64")] u64);

        let count: Count = self
            .call(
                "productCount",
                serde_json::json!({ "contract": self.config.contract_address }),
            )
            .await?;
        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_product_decoding() {
        let raw = r#"{
            "name": "Wheat",
            "basePrice": "1500",
            "state": "Karnataka",
            "district": "Bangalore",
            "market": "Ramanagara",
            "farmer": "0xf39f",
            "priceTrail": [1600, "1650.5"],
            "handlers": ["0xv1", "0xv2"]
        }"#;
        let product: RawProduct = serde_json::from_str(raw).unwrap();
        let record = product.into_record(1);
        assert_eq!(record.base_price, 1500.0);
        assert_eq!(record.originator, "0xf39f");
        assert_eq!(record.price_trail, vec![1600.0, 1650.5]);
        assert!(record.is_aligned());
    }

    #[test]
    fn test_add_result_accepts_hex_id() {
        let parsed: AddProductResult =
            serde_json::from_str(r#"{"id": "0x1a", "txHash": "0xabc"}"#).unwrap();
        assert_eq!(parsed.id, 26);
        let parsed: AddProductResult =
            serde_json::from_str(r#"{"id": 3, "txHash": "0xabc"}"#).unwrap();
        assert_eq!(parsed.id, 3);
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            map_rpc_error("getProduct", RPC_NOT_FOUND, "no product".into()),
            TraceError::NotFound(_)
        ));
        assert!(matches!(
            map_rpc_error("addProduct", RPC_EXECUTION_REVERTED, "reverted".into()),
            TraceError::LedgerRejected(_)
        ));
        assert!(matches!(
            map_rpc_error("addProduct", -32601, "method not found".into()),
            TraceError::LedgerUnavailable(_)
        ));
    }

    #[test]
    fn test_requires_contract_address() {
        let result = RpcLedger::new(LedgerRpcConfig::default());
        assert!(matches!(result, Err(TraceError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_unavailable() {
        let mut config = LedgerRpcConfig::development("0xcontract", "0xfarmer");
        config.url = "http://127.0.0.1:1".to_string();
        config.timeout_secs = 2;
        let ledger = RpcLedger::new(config).unwrap();

        let result = ledger.product_count().await;
        assert!(matches!(result, Err(TraceError::LedgerUnavailable(_))));
    }
}
