//! The `RpcTransport` trait: request/response access to a chain node.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Async request/response transport to a JSON-RPC node.
///
/// Implementations must be `Send + Sync` so one transport can be shared by
/// every in-flight fetch of a pipeline, and the trait stays object-safe so
/// it can be stored as `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Return the transport's identifier (URL or name).
    fn url(&self) -> &str;
}

/// Call `method` and deserialize the result.
///
/// A `null` result (the node does not know the object yet) comes back as
/// `Ok(None)` rather than as a deserialization failure.
pub async fn call_optional<T: DeserializeOwned>(
    transport: &dyn RpcTransport,
    id: u64,
    method: &str,
    params: Vec<Value>,
) -> Result<Option<T>, TransportError> {
    let req = JsonRpcRequest::new(id, method, params);
    let resp = transport.send(req).await?;
    let result = resp.into_result().map_err(TransportError::Rpc)?;
    if result.is_null() {
        return Ok(None);
    }
    serde_json::from_value(result)
        .map(Some)
        .map_err(TransportError::Deserialization)
}
