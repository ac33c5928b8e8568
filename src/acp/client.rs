//! JSON-RPC client over an ACP connection.
//!
//! [`RpcClient::call`] registers a pending slot, writes the request and
//! suspends on the slot until the dispatcher delivers the response, the
//! timeout elapses, or the connection is lost. The typed session calls used
//! after the handshake live here as well.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::acp::envelope;
use crate::acp::pending::PendingCalls;
use crate::acp::writer::OutboundWriter;
use crate::models::protocol::{
    methods, CancelNotification, ContentBlock, PromptRequest, PromptResponse,
};
use crate::{AppError, Result};

/// Default timeout for ordinary requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloneable request/notification sender for one connection.
#[derive(Debug, Clone)]
pub struct RpcClient {
    writer: OutboundWriter,
    pending: PendingCalls,
    default_timeout: Duration,
}

impl RpcClient {
    /// Build a client sharing `pending` with the connection's dispatcher.
    #[must_use]
    pub fn new(writer: OutboundWriter, pending: PendingCalls, default_timeout: Duration) -> Self {
        Self {
            writer,
            pending,
            default_timeout,
        }
    }

    /// Timeout applied by [`request`](Self::request).
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Send a request and wait for its response.
    ///
    /// `timeout = None` waits until the response arrives or the connection
    /// is lost.
    ///
    /// # Errors
    ///
    /// - [`AppError::ConnectionLost`] if the connection is closed before or
    ///   while waiting.
    /// - [`AppError::Io`] if the request could not be written.
    /// - [`AppError::Timeout`] if no response arrived in time; a late
    ///   response is later discarded as stale.
    /// - [`AppError::Remote`] carrying the agent's error object verbatim.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let (id, rx) = self.pending.register(method, timeout).await?;

        debug!(id, method, "rpc: sending request");
        if let Err(err) = self.writer.send(&envelope::request(id, method, params)).await {
            self.pending.forget(id).await;
            return Err(err);
        }

        let outcome = match timeout {
            Some(limit) => {
                if let Ok(received) = tokio::time::timeout(limit, rx).await {
                    received
                } else {
                    self.pending.forget(id).await;
                    warn!(id, method, ?limit, "rpc: request timed out");
                    return Err(AppError::Timeout(format!(
                        "{method} (id {id}) got no response within {limit:?}"
                    )));
                }
            }
            None => rx.await,
        };

        // A dropped sender means the table was torn down without a reply.
        outcome.unwrap_or_else(|_| {
            Err(AppError::ConnectionLost(format!(
                "{method} (id {id}) abandoned"
            )))
        })
    }

    /// [`call`](Self::call) with the default timeout.
    ///
    /// # Errors
    ///
    /// As for [`call`](Self::call).
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.call(method, params, Some(self.default_timeout)).await
    }

    /// Send a notification; nothing is awaited but the write itself.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the write fails.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        debug!(method, "rpc: sending notification");
        self.writer
            .send(&envelope::notification(method, params))
            .await
    }

    /// `session/prompt` with a single text block.
    ///
    /// # Errors
    ///
    /// As for [`call`](Self::call), plus [`AppError::Protocol`] if the result
    /// is not a prompt response.
    pub async fn prompt(
        &self,
        session_id: &str,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<PromptResponse> {
        let params = to_params(&PromptRequest {
            session_id: session_id.to_owned(),
            prompt: vec![ContentBlock::Text {
                text: text.to_owned(),
            }],
        })?;
        let result = self.call(methods::SESSION_PROMPT, params, timeout).await?;
        from_result(methods::SESSION_PROMPT, result)
    }

    /// `session/cancel` notification for the running prompt.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the write fails.
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        let params = to_params(&CancelNotification {
            session_id: session_id.to_owned(),
        })?;
        self.notify(methods::SESSION_CANCEL, params).await
    }

    /// Agent-specific extension request. The method name is sent as given.
    ///
    /// # Errors
    ///
    /// As for [`call`](Self::call).
    pub async fn ext_method(&self, method: &str, params: Value) -> Result<Value> {
        self.request(method, params).await
    }

    /// Agent-specific extension notification.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the write fails.
    pub async fn ext_notification(&self, method: &str, params: Value) -> Result<()> {
        self.notify(method, params).await
    }
}

pub(crate) fn to_params<T: Serialize>(params: &T) -> Result<Value> {
    serde_json::to_value(params)
        .map_err(|e| AppError::Protocol(format!("failed to serialise params: {e}")))
}

pub(crate) fn from_result<T: serde::de::DeserializeOwned>(method: &str, result: Value) -> Result<T> {
    serde_json::from_value(result)
        .map_err(|e| AppError::Protocol(format!("unexpected {method} result: {e}")))
}
