//! ACP outbound writer.
//!
//! Serialises JSON messages to single-line strings, frames them with
//! [`AcpCodec`], and writes them to the agent's stdin. The writer sits behind
//! a mutex so requests from concurrent callers and responses written by the
//! dispatcher never interleave within a line.
//!
//! Unlike a detached writer task, [`OutboundWriter::send`] reports a broken
//! pipe to the caller that attempted the write, so the in-flight call fails
//! with [`AppError::Io`] instead of waiting for a response that can never
//! come.

use std::sync::Arc;

use bytes::BytesMut;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::codec::Encoder;
use tracing::{trace, warn};

use crate::acp::codec::AcpCodec;
use crate::{AppError, Result};

type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

struct WriterInner {
    sink: BoxedWrite,
    codec: AcpCodec,
    buf: BytesMut,
}

/// Cloneable handle to the agent's stdin.
#[derive(Clone)]
pub struct OutboundWriter {
    inner: Arc<Mutex<WriterInner>>,
}

impl std::fmt::Debug for OutboundWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundWriter").finish_non_exhaustive()
    }
}

impl OutboundWriter {
    /// Wrap any async byte sink (a `ChildStdin`, or one half of a
    /// `tokio::io::duplex` pipe in tests).
    pub fn new<W>(sink: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(WriterInner {
                sink: Box::new(sink),
                codec: AcpCodec::new(),
                buf: BytesMut::new(),
            })),
        }
    }

    /// Write `msg` as one `\n`-terminated line and flush.
    ///
    /// # Errors
    ///
    /// - [`AppError::Protocol`] if `msg` cannot be serialised.
    /// - [`AppError::Io`]`("write failed: …")` if the pipe is closed or broken.
    pub async fn send(&self, msg: &Value) -> Result<()> {
        let line = serde_json::to_string(msg)
            .map_err(|e| AppError::Protocol(format!("failed to serialise outbound message: {e}")))?;

        let mut guard = self.inner.lock().await;
        let WriterInner { sink, codec, buf } = &mut *guard;

        buf.clear();
        codec.encode(line, buf)?;

        if let Err(e) = write_frame(sink, &buf[..]).await {
            warn!(error = %e, "acp writer: write to agent stdin failed");
            return Err(AppError::Io(format!("write failed: {e}")));
        }

        trace!(bytes = buf.len(), "acp writer: line written");
        Ok(())
    }
}

async fn write_frame(sink: &mut BoxedWrite, frame: &[u8]) -> std::io::Result<()> {
    sink.write_all(frame).await?;
    sink.flush().await
}
