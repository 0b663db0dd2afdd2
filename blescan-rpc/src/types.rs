use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// An outbound JSON-RPC request, serialized to UTF-8 JSON bytes and written
/// to the command characteristic in MTU-bounded chunks.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
    pub id: u32,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value, id: u32) -> Self {
        JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
            id,
        }
    }

    /// Serializes this request to UTF-8 JSON bytes.
    ///
    /// # Errors
    /// Returns an error only if `params` somehow contains a value
    /// `serde_json` cannot represent (never true for values built from
    /// `serde_json::json!` or `to_value`).
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// The error object embedded in a JSON-RPC response that reports a sensor
/// or protocol-level failure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

/// A parsed JSON-RPC response. BT510 firmware sometimes returns properties
/// at the response root instead of nesting them under `result`; any field
/// that isn't one of the four reserved names (`jsonrpc`, `id`, `result`,
/// `error`) lands in `root_properties` via serde's `flatten`, which gives us
/// the "flattened vs canonical" distinction from §4.7 for free.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: u32,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
    #[serde(flatten)]
    pub root_properties: Map<String, Value>,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn is_flattened(&self) -> bool {
        !self.root_properties.is_empty()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
