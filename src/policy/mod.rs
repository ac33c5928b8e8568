//! Permission policy for agent-initiated permission requests.
//!
//! Provides the [`evaluator::PermissionPolicy`], which applies the configured
//! [`PermissionMode`](crate::mode::PermissionMode) and keeps the decision
//! history.

pub mod evaluator;

pub use evaluator::{PermissionPolicy, SharedPolicy};
