//! Permission policy evaluator.
//!
//! Answers every permission request from the configured mode alone:
//!
//! | Mode     | Decision                                            |
//! |----------|-----------------------------------------------------|
//! | `auto`   | approve                                             |
//! | `deny`   | deny                                                |
//! | `manual` | approve, with a warning (interactive prompts are not implemented) |
//!
//! Each decision is appended to the history, whatever the mode.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, info_span, warn};

use crate::mode::PermissionMode;
use crate::models::permission::PermissionRecord;

/// Shared handle used by the inbound handler and the supervisor.
pub type SharedPolicy = Arc<Mutex<PermissionPolicy>>;

/// Current permission mode plus the append-only decision history.
#[derive(Debug, Clone, Default)]
pub struct PermissionPolicy {
    mode: PermissionMode,
    history: Vec<PermissionRecord>,
}

impl PermissionPolicy {
    /// Create a policy with an empty history.
    #[must_use]
    pub fn new(mode: PermissionMode) -> Self {
        Self {
            mode,
            history: Vec::new(),
        }
    }

    /// Wrap a new policy for sharing.
    #[must_use]
    pub fn shared(mode: PermissionMode) -> SharedPolicy {
        Arc::new(Mutex::new(Self::new(mode)))
    }

    /// Mode applied to the next request.
    #[must_use]
    pub fn mode(&self) -> PermissionMode {
        self.mode
    }

    /// Change the mode; the history is kept.
    pub fn set_mode(&mut self, mode: PermissionMode) {
        info!(from = %self.mode, to = %mode, "permission mode changed");
        self.mode = mode;
    }

    /// Decide a request and record the decision.
    pub fn decide(&mut self, session_id: &str, request: &Value) -> bool {
        let _span = info_span!("permission_decide", session_id, mode = %self.mode).entered();

        let approved = match self.mode {
            PermissionMode::Auto => true,
            PermissionMode::Deny => false,
            PermissionMode::Manual => {
                warn!("manual permission prompts are not implemented, approving request");
                true
            }
        };

        self.history.push(PermissionRecord {
            decided_at: Utc::now(),
            session_id: session_id.to_owned(),
            request: request.clone(),
            approved,
            mode: self.mode,
        });

        info!(approved, "permission request decided");
        approved
    }

    /// Decisions in the order they were made.
    #[must_use]
    pub fn history(&self) -> &[PermissionRecord] {
        &self.history
    }
}
