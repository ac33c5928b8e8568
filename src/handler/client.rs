//! Production [`InboundHandler`]: session updates, permissions, file access.

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::acp::envelope::RpcError;
use crate::handler::{fs, HandlerFuture, InboundHandler};
use crate::models::protocol::{
    methods, ClientCapabilities, PermissionOption, ReadTextFileRequest, RequestPermissionRequest,
    SessionNotification, WriteTextFileRequest,
};
use crate::models::session::SharedSession;
use crate::policy::SharedPolicy;
use crate::AppError;

/// Answers agent-initiated traffic for one connection.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    session: SharedSession,
    policy: SharedPolicy,
    capabilities: ClientCapabilities,
    root: PathBuf,
}

impl ClientHandler {
    /// Build a handler writing into `session` and deciding with `policy`.
    ///
    /// `root` confines file requests; it is only consulted when
    /// `capabilities` enables them.
    #[must_use]
    pub fn new(
        session: SharedSession,
        policy: SharedPolicy,
        capabilities: ClientCapabilities,
        root: PathBuf,
    ) -> Self {
        Self {
            session,
            policy,
            capabilities,
            root,
        }
    }

    async fn on_session_update(&self, params: Value) {
        let notification: SessionNotification = match serde_json::from_value(params) {
            Ok(n) => n,
            Err(err) => {
                warn!(error = %err, "session/update with unexpected shape, ignoring");
                return;
            }
        };

        let mut session = self.session.lock().await;
        if !session.is_active(&notification.session_id) {
            debug!(
                session_id = %notification.session_id,
                "update for inactive session, ignoring"
            );
            return;
        }

        match notification.update.message_text() {
            Some(text) => session.append_chunk(text),
            None => debug!(
                kind = %notification.update.session_update,
                "session update not consumed"
            ),
        }
    }

    async fn on_request_permission(&self, params: Value) -> Result<Value, RpcError> {
        let request: RequestPermissionRequest = serde_json::from_value(params.clone())
            .map_err(|err| RpcError::invalid_params(err.to_string()))?;

        let approved = self
            .policy
            .lock()
            .await
            .decide(&request.session_id, &params);

        Ok(permission_outcome(approved, &request.options))
    }

    async fn on_read_text_file(&self, params: Value) -> Result<Value, RpcError> {
        let request: ReadTextFileRequest = serde_json::from_value(params)
            .map_err(|err| RpcError::invalid_params(err.to_string()))?;

        let content = fs::read_text_file(&self.root, &request.path, request.line, request.limit)
            .await
            .map_err(fs_error)?;
        Ok(json!({ "content": content }))
    }

    async fn on_write_text_file(&self, params: Value) -> Result<Value, RpcError> {
        let request: WriteTextFileRequest = serde_json::from_value(params)
            .map_err(|err| RpcError::invalid_params(err.to_string()))?;

        fs::write_text_file(&self.root, &request.path, &request.content)
            .await
            .map_err(fs_error)?;
        info!(path = %request.path.display(), "agent wrote file");
        Ok(Value::Null)
    }
}

impl InboundHandler for ClientHandler {
    fn handle_request(
        &self,
        method: &str,
        params: Value,
    ) -> HandlerFuture<'_, Result<Value, RpcError>> {
        let method = method.to_owned();
        Box::pin(async move {
            match method.as_str() {
                methods::REQUEST_PERMISSION => self.on_request_permission(params).await,
                methods::FS_READ_TEXT_FILE if self.capabilities.fs.read_text_file => {
                    self.on_read_text_file(params).await
                }
                methods::FS_WRITE_TEXT_FILE if self.capabilities.fs.write_text_file => {
                    self.on_write_text_file(params).await
                }
                other => {
                    if other.starts_with(methods::TERMINAL_PREFIX) {
                        debug!(method = other, "terminal requests are not supported");
                    } else {
                        debug!(method = other, "unsupported agent request");
                    }
                    Err(RpcError::method_not_found(other))
                }
            }
        })
    }

    fn handle_notification(&self, method: &str, params: Value) -> HandlerFuture<'_, ()> {
        let method = method.to_owned();
        Box::pin(async move {
            if method == methods::SESSION_UPDATE {
                self.on_session_update(params).await;
            } else {
                debug!(method = %method, "ignoring notification");
            }
        })
    }
}

/// ACP `RequestPermissionOutcome` for a decision.
///
/// An approval selects the first `allow_*` option (or the first option of
/// any kind); a denial selects the first `reject_*` option. Without a
/// suitable option the request is reported as cancelled.
#[must_use]
pub fn permission_outcome(approved: bool, options: &[PermissionOption]) -> Value {
    let chosen = if approved {
        options
            .iter()
            .find(|o| o.kind.starts_with("allow"))
            .or_else(|| options.first())
    } else {
        options.iter().find(|o| o.kind.starts_with("reject"))
    };

    match chosen {
        Some(option) => json!({
            "outcome": { "outcome": "selected", "optionId": option.option_id }
        }),
        None => json!({ "outcome": { "outcome": "cancelled" } }),
    }
}

fn fs_error(err: AppError) -> RpcError {
    match err {
        AppError::PathViolation(detail) => RpcError::invalid_params(detail),
        other => RpcError::internal(other.to_string()),
    }
}
