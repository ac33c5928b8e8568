//! ACP dispatcher task.
//!
//! Reads newline-delimited JSON from the agent's stdout, classifies each line
//! with [`envelope::classify`], and routes it:
//!
//! | Envelope       | Route                                                  |
//! |----------------|--------------------------------------------------------|
//! | `Response`     | fulfils the matching [`PendingCalls`] slot             |
//! | `Notification` | [`InboundHandler::handle_notification`], awaited inline |
//! | `Request`      | [`InboundHandler::handle_request`], reply written back |
//! | *(malformed)*  | logged at `WARN` and skipped                           |
//!
//! Lines are handled strictly in arrival order. A notification that precedes
//! a response on the wire has therefore been fully handled before the caller
//! waiting on that response is woken.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::acp::codec::AcpCodec;
use crate::acp::envelope::{self, Envelope};
use crate::acp::pending::PendingCalls;
use crate::acp::writer::OutboundWriter;
use crate::handler::InboundHandler;
use crate::{AppError, Result};

/// Why the dispatcher loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// The owner cancelled the loop.
    Cancelled,
    /// The agent closed its stdout.
    EndOfStream,
    /// Reading from stdout failed.
    StreamError(String),
}

/// Routes classified envelopes to the pending table or the inbound handler.
#[derive(Clone)]
pub struct Dispatcher {
    pending: PendingCalls,
    handler: Arc<dyn InboundHandler>,
    writer: OutboundWriter,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Build a dispatcher over the shared pending table and outbound writer.
    #[must_use]
    pub fn new(
        pending: PendingCalls,
        handler: Arc<dyn InboundHandler>,
        writer: OutboundWriter,
    ) -> Self {
        Self {
            pending,
            handler,
            writer,
        }
    }

    /// Classify and route a single line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Parse`] for a malformed line; nothing has been
    /// routed in that case. Failures while routing (stale responses, a
    /// response write that fails) are logged here and do not surface.
    pub async fn dispatch_line(&self, line: &str) -> Result<()> {
        let Some(env) = envelope::classify(line)? else {
            return Ok(());
        };

        match env {
            Envelope::Response { id, outcome } => self.route_response(id, outcome).await,
            Envelope::Notification { method, params } => {
                debug!(method = %method, "acp reader: notification");
                self.handler.handle_notification(&method, params).await;
            }
            Envelope::Request { id, method, params } => {
                debug!(method = %method, %id, "acp reader: inbound request");
                let outcome = self.handler.handle_request(&method, params).await;
                if let Err(err) = &outcome {
                    debug!(method = %method, code = err.code, "acp reader: answering request with error");
                }
                let reply = envelope::response(id, outcome);
                if let Err(e) = self.writer.send(&reply).await {
                    warn!(method = %method, error = %e, "acp reader: failed to write response");
                }
            }
        }
        Ok(())
    }

    async fn route_response(
        &self,
        id: Value,
        outcome: std::result::Result<Value, envelope::RpcError>,
    ) {
        let Some(numeric) = id.as_u64() else {
            warn!(%id, "acp reader: response id is not a request id we issue, dropping");
            return;
        };

        if !self
            .pending
            .complete(numeric, outcome.map_err(AppError::Remote))
            .await
        {
            warn!(id = numeric, "acp reader: no pending call for response, dropping as stale");
        }
    }
}

/// Dispatcher loop: read lines from `stdout` until EOF, error, or `cancel`.
///
/// Malformed lines and over-long lines are logged and skipped; they never
/// terminate the loop. On EOF or a read error every outstanding call is
/// failed with [`AppError::ConnectionLost`] before returning. On
/// cancellation the pending table is left to the owner.
pub async fn run_reader<R>(stdout: R, dispatcher: Dispatcher, cancel: CancellationToken) -> ReaderExit
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, AcpCodec::new());

    let exit = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("acp reader: cancellation received, stopping");
                break ReaderExit::Cancelled;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("acp reader: EOF detected");
                        break ReaderExit::EndOfStream;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "acp reader: IO error, stopping");
                        break ReaderExit::StreamError(e.to_string());
                    }

                    Some(Ok(line)) => {
                        if let Err(e) = dispatcher.dispatch_line(&line).await {
                            warn!(error = %e, raw_line = %line, "acp reader: parse error, skipping line");
                        }
                    }
                }
            }
        }
    };

    match &exit {
        ReaderExit::Cancelled => {}
        ReaderExit::EndOfStream => {
            dispatcher.pending.close("agent closed its output stream").await;
        }
        ReaderExit::StreamError(reason) => {
            dispatcher
                .pending
                .close(&format!("agent output stream failed: {reason}"))
                .await;
        }
    }

    exit
}
