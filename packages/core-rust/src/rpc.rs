//! JSON-RPC 2.0 shaped message schemas for the line-delimited control channel.
//!
//! Three message kinds travel over the wire, one JSON object per line:
//! - **Request** (`{jsonrpc, method, params, id}`) from the host,
//! - **Response** (`{jsonrpc, result | error, id}`) back to the host,
//! - **Notification** (`{jsonrpc, method, params}`), which never carries `id`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version string stamped on every outbound message.
pub const JSONRPC_VERSION: &str = "2.0";

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Error codes used in Error Responses.
pub mod error_codes {
    /// The inbound line was not valid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Valid JSON, but not a request object.
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Unexpected fault while dispatching a request.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// An operation or workflow failed with an uncaught fault.
    pub const EXECUTION_FAILED: i32 = -32000;
}

/// Request method names understood by the agent.
pub mod method_names {
    pub const PING: &str = "ping";
    pub const EXECUTE: &str = "execute";
    pub const LIST_OPERATIONS: &str = "listOperations";
    pub const GET_OPERATION_TEMPLATES: &str = "getOperationTemplates";
    pub const EXECUTE_OPERATIONS: &str = "executeOperations";
}

/// Notification method names emitted by the agent.
pub mod notification_names {
    pub const AGENT_READY: &str = "agent.ready";
    pub const AGENT_ERROR: &str = "agent.error";
    pub const TASK_STARTED: &str = "task.started";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";
    pub const WORKFLOW_STARTED: &str = "workflow.started";
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    pub const WORKFLOW_FAILED: &str = "workflow.failed";
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Inbound request from the host.
///
/// `jsonrpc` is not validated; a missing `id` is tolerated and answered with
/// `id: null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<Value>,
}

impl RpcRequest {
    /// Decodes one inbound line.
    ///
    /// # Errors
    ///
    /// Returns `RequestDecodeError::Parse` if the line is not JSON at all and
    /// `RequestDecodeError::Invalid` if it is JSON but not a request object.
    pub fn from_line(line: &str) -> Result<Self, RequestDecodeError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| RequestDecodeError::Parse(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| RequestDecodeError::Invalid(e.to_string()))
    }

    /// The request id, or JSON `null` when absent.
    #[must_use]
    pub fn response_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }
}

/// Why an inbound line could not be turned into an `RpcRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestDecodeError {
    Parse(String),
    Invalid(String),
}

impl RequestDecodeError {
    /// Converts the decode failure into the Error object sent back to the host.
    #[must_use]
    pub fn into_rpc_error(self) -> RpcError {
        match self {
            Self::Parse(msg) => RpcError::new(error_codes::PARSE_ERROR, format!("Parse error: {msg}")),
            Self::Invalid(msg) => {
                RpcError::new(error_codes::INVALID_REQUEST, format!("Invalid Request: {msg}"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Error object carried by an Error Response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
}

impl RpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    #[must_use]
    pub fn internal(detail: impl fmt::Display) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, format!("Internal error: {detail}"))
    }

    #[must_use]
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::new(error_codes::EXECUTION_FAILED, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

/// Exactly one of `result` / `error`, flattened into the Response object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(RpcError),
}

/// Outbound Response to a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(flatten)]
    pub payload: ResponsePayload,
    pub id: Value,
}

impl RpcResponse {
    #[must_use]
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            payload: ResponsePayload::Result(result),
            id,
        }
    }

    #[must_use]
    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: default_version(),
            payload: ResponsePayload::Error(error),
            id,
        }
    }

    /// Builds a Response from a dispatch outcome.
    #[must_use]
    pub fn from_outcome(id: Value, outcome: Result<Value, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self::result(id, result),
            Err(error) => Self::error(id, error),
        }
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Fire-and-forget message to the host. Has no `id` field by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

impl RpcNotification {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            method: method.into(),
            params,
        }
    }
}

/// Any message the agent writes to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    Response(RpcResponse),
    Notification(RpcNotification),
}

impl From<RpcResponse> for OutgoingMessage {
    fn from(response: RpcResponse) -> Self {
        Self::Response(response)
    }
}

impl From<RpcNotification> for OutgoingMessage {
    fn from(notification: RpcNotification) -> Self {
        Self::Notification(notification)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
