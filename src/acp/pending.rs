//! Pending-call table shared by the RPC client and the dispatcher.
//!
//! The client registers a slot before writing a request; the dispatcher
//! fulfils and removes it when the matching response arrives. Each slot is a
//! [`oneshot`] sender, so a call is completed at most once and the caller
//! wakes directly instead of polling.
//!
//! Ids are allocated under the same lock that guards the table, starting at
//! `1` and strictly increasing for the lifetime of the table. Once the table
//! is closed (connection lost or shut down) every outstanding slot is failed
//! with [`AppError::ConnectionLost`] and new registrations are refused.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::{AppError, Result};

/// Value delivered to a waiting caller.
pub type CallOutcome = Result<Value>;

/// A request awaiting its response.
#[derive(Debug)]
struct PendingCall {
    method: String,
    sent_at: Instant,
    deadline: Option<Instant>,
    reply: oneshot::Sender<CallOutcome>,
}

#[derive(Debug, Default)]
struct PendingTable {
    last_id: u64,
    calls: HashMap<u64, PendingCall>,
    closed: Option<String>,
}

/// Shared, cloneable handle to the pending-call table.
#[derive(Debug, Clone, Default)]
pub struct PendingCalls {
    inner: Arc<Mutex<PendingTable>>,
}

impl PendingCalls {
    /// Create an empty, open table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and register a completion slot for it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConnectionLost`] if the table has been closed.
    pub async fn register(
        &self,
        method: &str,
        timeout: Option<Duration>,
    ) -> Result<(u64, oneshot::Receiver<CallOutcome>)> {
        let mut table = self.inner.lock().await;
        if let Some(reason) = &table.closed {
            return Err(AppError::ConnectionLost(reason.clone()));
        }

        table.last_id += 1;
        let id = table.last_id;
        let now = Instant::now();
        let (reply, rx) = oneshot::channel();
        table.calls.insert(
            id,
            PendingCall {
                method: method.to_owned(),
                sent_at: now,
                deadline: timeout.map(|t| now + t),
                reply,
            },
        );
        Ok((id, rx))
    }

    /// Fulfil and remove the call registered under `id`.
    ///
    /// Returns `false` when no such call is outstanding (stale or duplicate
    /// response); the caller decides how to log it.
    pub async fn complete(&self, id: u64, outcome: CallOutcome) -> bool {
        let Some(call) = self.inner.lock().await.calls.remove(&id) else {
            return false;
        };

        let elapsed = call.sent_at.elapsed();
        if call.deadline.is_some_and(|d| Instant::now() > d) {
            debug!(id, method = %call.method, ?elapsed, "response arrived after deadline");
        } else {
            debug!(id, method = %call.method, ?elapsed, "response matched pending call");
        }

        // The receiver is gone when the caller timed out between our lock and
        // the send; the outcome is simply dropped.
        let _ = call.reply.send(outcome);
        true
    }

    /// Remove a call without fulfilling it (timeout or failed write).
    pub async fn forget(&self, id: u64) {
        self.inner.lock().await.calls.remove(&id);
    }

    /// Fail every outstanding call with [`AppError::ConnectionLost`] and refuse
    /// further registrations.
    ///
    /// Idempotent; the first reason is kept. Returns the number of calls failed.
    pub async fn close(&self, reason: &str) -> usize {
        let drained: Vec<(u64, PendingCall)> = {
            let mut table = self.inner.lock().await;
            if table.closed.is_none() {
                table.closed = Some(reason.to_owned());
            }
            table.calls.drain().collect()
        };

        let count = drained.len();
        for (id, call) in drained {
            debug!(id, method = %call.method, reason, "failing pending call");
            let _ = call
                .reply
                .send(Err(AppError::ConnectionLost(reason.to_owned())));
        }
        count
    }

    /// Number of calls currently awaiting a response.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.calls.len()
    }

    /// Whether no calls are outstanding.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
