//! JSON-RPC entity store client backed by `reqwest`.
//!
//! One HTTP request per call, no retry loop: the queue re-delivers failed
//! writes with its own backoff.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lendwatch_core::{EntityCreate, EntityQuery, EntityStore, Receipt, StoreConfig, StoreError, StoredEntity};

use crate::rpc::{
    decode_entities, decode_receipt, CreateParams, JsonRpcRequest, JsonRpcResponse, QueryParams,
    METHOD_CREATE, METHOD_QUERY,
};

pub struct HttpEntityStore {
    url: String,
    chain: String,
    http: reqwest::Client,
    request_timeout: Duration,
    next_id: AtomicU64,
}

impl HttpEntityStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let request_timeout = Duration::from_millis(config.request_timeout_ms);
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| StoreError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: config.url.clone(),
            chain: config.chain.clone(),
            http,
            request_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, vec![params]);

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let msg = format!("HTTP {}: {body}", status.as_u16());
            tracing::warn!(method, status = status.as_u16(), url = %self.url, "store request failed");
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                StoreError::Unavailable(msg)
            } else {
                StoreError::Rejected(msg)
            });
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| StoreError::Other(format!("invalid JSON-RPC response: {e}")))?
            .into_result()
    }

    fn transport_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl EntityStore for HttpEntityStore {
    async fn create(&self, request: EntityCreate) -> Result<Receipt, StoreError> {
        let params = serde_json::to_value(CreateParams::new(&self.chain, &request))?;
        let result = self.call(METHOD_CREATE, params).await?;
        decode_receipt(result)
    }

    async fn query(&self, query: EntityQuery) -> Result<Vec<StoredEntity>, StoreError> {
        let params = serde_json::to_value(QueryParams {
            chain: &self.chain,
            query: &query,
        })?;
        let result = self.call(METHOD_QUERY, params).await?;
        decode_entities(result)
    }
}
