//! JSON-RPC 2.0 wire types for the entity store gateway.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lendwatch_core::{Attribute, EntityCreate, EntityQuery, Receipt, StoreError, StoredEntity};

pub const METHOD_CREATE: &str = "entities_create";
pub const METHOD_QUERY: &str = "entities_query";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Server-side failures (`-32603` internal error and the `-32000..=-32099`
    /// implementation range) may pass on retry. Everything else is a
    /// rejection of the request itself.
    pub fn into_store_error(self) -> StoreError {
        let msg = format!("JSON-RPC error {}: {}", self.code, self.message);
        if self.code == -32603 || (-32099..=-32000).contains(&self.code) {
            StoreError::Unavailable(msg)
        } else {
            StoreError::Rejected(msg)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<Value, StoreError> {
        match self.error {
            Some(err) => Err(err.into_store_error()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ─── Entity encoding ─────────────────────────────────────────────────────────

/// Create parameters: payload travels hex-encoded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParams<'a> {
    pub chain: &'a str,
    pub payload: String,
    pub content_type: &'a str,
    pub attributes: &'a [Attribute],
    /// Seconds.
    pub expires_in: u64,
}

impl<'a> CreateParams<'a> {
    pub fn new(chain: &'a str, req: &'a EntityCreate) -> Self {
        Self {
            chain,
            payload: format!("0x{}", hex::encode(&req.payload)),
            content_type: &req.content_type,
            attributes: &req.attributes,
            expires_in: req.expires_in.as_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams<'a> {
    pub chain: &'a str,
    #[serde(flatten)]
    pub query: &'a EntityQuery,
}

/// An entity as the gateway returns it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEntity {
    pub key: String,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub created_at_block: Option<u64>,
}

impl WireEntity {
    pub fn into_entity(self) -> Result<StoredEntity, StoreError> {
        let payload = match self.payload {
            Some(p) => {
                let digits = p.strip_prefix("0x").unwrap_or(&p);
                hex::decode(digits).map_err(|e| {
                    StoreError::Other(format!("entity {}: payload is not hex: {e}", self.key))
                })?
            }
            None => Vec::new(),
        };
        Ok(StoredEntity {
            key: self.key,
            payload,
            attributes: self.attributes,
            content_type: self.content_type,
            expires_in: self.expires_in.map(std::time::Duration::from_secs),
            owner: self.owner,
            created_at_block: self.created_at_block,
        })
    }
}

pub fn decode_receipt(value: Value) -> Result<Receipt, StoreError> {
    Ok(serde_json::from_value(value)?)
}

pub fn decode_entities(value: Value) -> Result<Vec<StoredEntity>, StoreError> {
    let wire: Vec<WireEntity> = serde_json::from_value(value)?;
    wire.into_iter().map(WireEntity::into_entity).collect()
}
