//! EVM JSON-RPC block data provider with optional rate limiting, retries and block cache.

use crate::chain::block::{decode_block, BlockHeader, HeaderDecodeMode};
use crate::chain::cache::BlockCache;
use crate::chain::normalize::{format_quantity, parse_quantity};
use crate::chain::provider::{BlockDataProvider, ProviderError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const RATE_LIMIT_MS: u64 = 0;
const MAX_RETRIES: u32 = 0;
const RETRY_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 60_000;

/// Exponential backoff for `attempt` (0-based), capped at one minute.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(MAX_BACKOFF_MS)
}

#[derive(Clone, Debug)]
pub struct RpcConfig {
    pub url: String,
    pub chain_id: u64,
    pub timeout_secs: u64,
    /// Minimum spacing between requests; 0 disables.
    pub rate_limit_ms: u64,
    /// Transport-level retries. Zero keeps every failed request terminal.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Decode mode the connection starts in.
    pub decode_mode: HeaderDecodeMode,
    pub offline: bool,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            url: url.into(),
            chain_id,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            rate_limit_ms: RATE_LIMIT_MS,
            max_retries: MAX_RETRIES,
            retry_backoff_ms: RETRY_BACKOFF_MS,
            decode_mode: HeaderDecodeMode::Standard,
            offline: false,
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC connection to one chain.
pub struct RpcProvider {
    config: RpcConfig,
    client: Option<reqwest::Client>,
    cache: Option<Arc<BlockCache>>,
    extended_headers: AtomicBool,
    last_request: tokio::sync::Mutex<Option<Instant>>,
    next_id: AtomicU64,
    request_count: AtomicU64,
}

impl RpcProvider {
    pub fn new(config: RpcConfig, cache: Option<Arc<BlockCache>>) -> Result<Self, ProviderError> {
        url::Url::parse(&config.url)
            .map_err(|e| ProviderError::Config(format!("invalid rpc url {}: {}", config.url, e)))?;
        let client = if config.offline {
            None
        } else {
            Some(
                reqwest::Client::builder()
                    .use_rustls_tls()
                    .timeout(Duration::from_secs(config.timeout_secs))
                    .build()?,
            )
        };
        let extended = config.decode_mode == HeaderDecodeMode::ExtendedFields;
        Ok(Self {
            config,
            client,
            cache,
            extended_headers: AtomicBool::new(extended),
            last_request: tokio::sync::Mutex::new(None),
            next_id: AtomicU64::new(1),
            request_count: AtomicU64::new(0),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn rate_limit(&self) {
        if self.config.rate_limit_ms == 0 {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let need = Duration::from_millis(self.config.rate_limit_ms);
            let elapsed = prev.elapsed();
            if elapsed < need {
                tokio::time::sleep(need - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn backoff(&self, attempt: u32) {
        if attempt < self.config.max_retries {
            let ms = backoff_ms(self.config.retry_backoff_ms, attempt);
            warn!(attempt, ms, "retry after error");
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let client = self.client.as_ref().ok_or(ProviderError::OfflineMiss)?;
        self.rate_limit().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut last_err = None;
        for attempt in 0..=self.config.max_retries {
            match client.post(&self.config.url).json(&body).send().await {
                Ok(r) => {
                    let status = r.status();
                    if !status.is_success() {
                        let text = r.text().await.unwrap_or_default();
                        last_err = Some(ProviderError::Rpc {
                            code: i64::from(status.as_u16()),
                            message: text,
                        });
                        self.backoff(attempt).await;
                        continue;
                    }
                    let resp: RpcResponse = r.json().await?;
                    self.request_count.fetch_add(1, Ordering::Relaxed);
                    if let Some(err) = resp.error {
                        return Err(ProviderError::Rpc {
                            code: err.code,
                            message: err.message,
                        });
                    }
                    return Ok(resp.result.unwrap_or(serde_json::Value::Null));
                }
                Err(e) => {
                    last_err = Some(ProviderError::Request(e));
                    self.backoff(attempt).await;
                }
            }
        }
        Err(last_err.unwrap_or(ProviderError::Rpc {
            code: 0,
            message: format!("{}: no attempt made", method),
        }))
    }

    async fn get_block(&self, number: u64, full: bool) -> Result<BlockHeader, ProviderError> {
        let chain_id = self.config.chain_id;
        if let Some(cache) = &self.cache {
            if let Some(body) = cache.get(chain_id, number, full)? {
                debug!(chain_id, number, full, "cache hit");
                let value: serde_json::Value = serde_json::from_str(&body)
                    .map_err(|e| ProviderError::Decode(format!("cached block: {}", e)))?;
                return decode_block(&value, self.decode_mode(), full);
            }
            if self.config.offline {
                return Err(ProviderError::OfflineMiss);
            }
        }

        let result = self
            .call(
                "eth_getBlockByNumber",
                serde_json::json!([format_quantity(number), full]),
            )
            .await?;
        if result.is_null() {
            return Err(ProviderError::BlockNotFound(number));
        }
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(chain_id, number, full, &result.to_string()) {
                warn!(chain_id, number, error = %e, "failed to cache block");
            }
        }
        decode_block(&result, self.decode_mode(), full)
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BlockDataProvider for RpcProvider {
    async fn fetch_header(&self, number: u64) -> Result<BlockHeader, ProviderError> {
        self.get_block(number, false).await
    }

    async fn fetch_header_with_transactions(
        &self,
        number: u64,
    ) -> Result<BlockHeader, ProviderError> {
        self.get_block(number, true).await
    }

    async fn current_block_number(&self) -> Result<u64, ProviderError> {
        let result = self.call("eth_blockNumber", serde_json::json!([])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| ProviderError::Decode(format!("eth_blockNumber: {}", result)))?;
        parse_quantity(hex).map_err(|e| ProviderError::Decode(e.to_string()))
    }

    fn apply_compatibility_shim(&self) -> Result<(), ProviderError> {
        if !self.extended_headers.swap(true, Ordering::SeqCst) {
            info!(
                chain_id = self.config.chain_id,
                "header decoding switched to extended fields"
            );
        }
        Ok(())
    }

    fn decode_mode(&self) -> HeaderDecodeMode {
        if self.extended_headers.load(Ordering::SeqCst) {
            HeaderDecodeMode::ExtendedFields
        } else {
            HeaderDecodeMode::Standard
        }
    }
}
