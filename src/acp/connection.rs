//! One live JSON-RPC connection over a pair of byte streams.
//!
//! [`AcpConnection::attach`] wires the outbound writer, the pending-call
//! table, and the dispatcher task together. The connection does not own the
//! process; the supervisor does. It only knows when the stream ended, which
//! it publishes through [`AcpConnection::lost_token`].

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument, Span};

use crate::acp::client::RpcClient;
use crate::acp::pending::PendingCalls;
use crate::acp::reader::{run_reader, Dispatcher, ReaderExit};
use crate::acp::writer::OutboundWriter;
use crate::handler::InboundHandler;

/// Client, dispatcher task and loss signal for one agent.
#[derive(Debug)]
pub struct AcpConnection {
    client: RpcClient,
    pending: PendingCalls,
    cancel: CancellationToken,
    lost: CancellationToken,
    reader: Option<JoinHandle<ReaderExit>>,
}

impl AcpConnection {
    /// Start the dispatcher over `stdout` and return the connection.
    ///
    /// The dispatcher task runs inside `span`. When it stops because the
    /// stream ended or failed, the lost token fires.
    pub fn attach<R, W>(
        stdout: R,
        stdin: W,
        handler: Arc<dyn InboundHandler>,
        request_timeout: Duration,
        span: Span,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer = OutboundWriter::new(stdin);
        let pending = PendingCalls::new();
        let client = RpcClient::new(writer.clone(), pending.clone(), request_timeout);
        let dispatcher = Dispatcher::new(pending.clone(), handler, writer);

        let cancel = CancellationToken::new();
        let lost = CancellationToken::new();

        let reader = tokio::spawn({
            let cancel = cancel.clone();
            let lost = lost.clone();
            async move {
                let exit = run_reader(stdout, dispatcher, cancel).await;
                if exit != ReaderExit::Cancelled {
                    info!(?exit, "acp connection lost");
                    lost.cancel();
                }
                exit
            }
            .instrument(span)
        });

        Self {
            client,
            pending,
            cancel,
            lost,
            reader: Some(reader),
        }
    }

    /// Handle for issuing calls on this connection.
    #[must_use]
    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    /// Token cancelled when the agent's output stream ends or fails.
    #[must_use]
    pub fn lost_token(&self) -> CancellationToken {
        self.lost.clone()
    }

    /// Whether the stream has ended.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.lost.is_cancelled()
    }

    /// Stop the dispatcher and fail outstanding calls.
    ///
    /// Idempotent. Returns how the dispatcher loop ended, if it was still
    /// attached.
    pub async fn close(&mut self) -> Option<ReaderExit> {
        self.cancel.cancel();
        let exit = match self.reader.take() {
            Some(handle) => handle.await.ok(),
            None => None,
        };
        self.pending.close("connection closed").await;
        exit
    }
}

impl Drop for AcpConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
