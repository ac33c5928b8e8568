//! JSON-RPC 2.0 envelope classification and construction.
//!
//! Every line read from the agent is classified into one of three shapes:
//!
//! | Shape          | Keys present                          |
//! |----------------|---------------------------------------|
//! | `Request`      | `method` and a non-null `id`          |
//! | `Notification` | `method`, `id` absent or `null`       |
//! | `Response`     | `result` or `error`, no `method`      |
//!
//! Classification looks at key presence on the raw object rather than
//! deserialising into `Option` fields, because `"result": null` is a valid
//! success response and must not be mistaken for a missing key.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::{AppError, Result};

/// Protocol version tag written on every outbound envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The method does not exist or is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

/// JSON-RPC error object, carried verbatim in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Short human-readable description.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Build an error with no `data` member.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// `-32601` for a method this client does not serve.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: "Method not found".to_owned(),
            data: Some(json!({ "method": method })),
        }
    }

    /// `-32602` with a description of what was wrong.
    #[must_use]
    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: "Invalid params".to_owned(),
            data: Some(Value::String(detail.into())),
        }
    }

    /// `-32603` wrapping a local failure.
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: "Internal error".to_owned(),
            data: Some(Value::String(detail.into())),
        }
    }
}

/// A classified inbound JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Agent-to-client call that expects a response with the same `id`.
    Request {
        /// Correlation id chosen by the agent (number or string), echoed back.
        id: Value,
        /// Method name.
        method: String,
        /// Parameters; `Value::Null` when absent.
        params: Value,
    },
    /// Reply to one of our requests.
    Response {
        /// Correlation id; `Value::Null` when the agent could not determine it.
        id: Value,
        /// `Ok(result)` or `Err(error object)`.
        outcome: std::result::Result<Value, RpcError>,
    },
    /// One-way message, no reply expected.
    Notification {
        /// Method name.
        method: String,
        /// Parameters; `Value::Null` when absent.
        params: Value,
    },
}

impl Envelope {
    /// Short label used in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Response { .. } => "response",
            Self::Notification { .. } => "notification",
        }
    }
}

/// Classify one line of agent output.
///
/// Returns `Ok(None)` for blank lines. A response whose `error` member is
/// malformed is still a response, so the waiting call fails instead of
/// hanging.
///
/// # Errors
///
/// - [`AppError::Parse`]`("malformed json: …")` if the line is not valid JSON.
/// - [`AppError::Parse`]`("not a json-rpc envelope: …")` if the value is not
///   an object, or is an object with neither `method` nor `result`/`error`.
pub fn classify(line: &str) -> Result<Option<Envelope>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| AppError::Parse(format!("malformed json: {e}")))?;

    let Value::Object(mut obj) = value else {
        return Err(AppError::Parse(
            "not a json-rpc envelope: top-level value is not an object".into(),
        ));
    };

    let id = obj.remove("id").unwrap_or(Value::Null);

    if let Some(method) = obj.remove("method") {
        let Value::String(method) = method else {
            return Err(AppError::Parse(
                "not a json-rpc envelope: `method` is not a string".into(),
            ));
        };
        let params = obj.remove("params").unwrap_or(Value::Null);
        return Ok(Some(if id.is_null() {
            Envelope::Notification { method, params }
        } else {
            Envelope::Request { id, method, params }
        }));
    }

    if let Some(error) = obj.remove("error") {
        return Ok(Some(Envelope::Response {
            id,
            outcome: Err(error_object(error)),
        }));
    }

    if let Some(result) = obj.remove("result") {
        return Ok(Some(Envelope::Response {
            id,
            outcome: Ok(result),
        }));
    }

    Err(AppError::Parse(
        "not a json-rpc envelope: neither `method` nor `result`/`error` present".into(),
    ))
}

/// Decode an `error` member. One without an integer `code` and a string
/// `message` still fails its call, as an internal error carrying the raw
/// member in `data`.
fn error_object(raw: Value) -> RpcError {
    match serde_json::from_value::<RpcError>(raw.clone()) {
        Ok(error) => error,
        Err(err) => {
            warn!(error = %err, "malformed error object in response");
            RpcError {
                code: INTERNAL_ERROR,
                message: format!("malformed error object: {err}"),
                data: Some(raw),
            }
        }
    }
}

/// Build a request envelope.
#[must_use]
pub fn request(id: u64, method: &str, params: Value) -> Value {
    let mut obj = base();
    obj.insert("id".into(), Value::from(id));
    obj.insert("method".into(), Value::String(method.to_owned()));
    obj.insert("params".into(), params);
    Value::Object(obj)
}

/// Build a notification envelope.
#[must_use]
pub fn notification(method: &str, params: Value) -> Value {
    let mut obj = base();
    obj.insert("method".into(), Value::String(method.to_owned()));
    obj.insert("params".into(), params);
    Value::Object(obj)
}

/// Build a response envelope for an inbound request.
#[must_use]
pub fn response(id: Value, outcome: std::result::Result<Value, RpcError>) -> Value {
    let mut obj = base();
    obj.insert("id".into(), id);
    match outcome {
        Ok(result) => {
            obj.insert("result".into(), result);
        }
        Err(error) => {
            // RpcError only holds JSON-native fields, serialisation cannot fail.
            let error = serde_json::to_value(&error).unwrap_or_else(|_| {
                json!({ "code": INTERNAL_ERROR, "message": "Internal error" })
            });
            obj.insert("error".into(), error);
        }
    }
    Value::Object(obj)
}

fn base() -> Map<String, Value> {
    let mut obj = Map::new();
    obj.insert("jsonrpc".into(), Value::String(JSONRPC_VERSION.to_owned()));
    obj
}
