//! Permission decision history model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::mode::PermissionMode;

/// One answered permission request.
///
/// Records are append-only and kept for inspection; they are never consulted
/// when deciding later requests.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PermissionRecord {
    /// When the decision was made.
    pub decided_at: DateTime<Utc>,
    /// Session the request arrived on.
    pub session_id: String,
    /// The request parameters as received.
    pub request: Value,
    /// Whether the request was approved.
    pub approved: bool,
    /// Mode in force when the decision was made.
    pub mode: PermissionMode,
}
