//! NDJSON codec for ACP agent streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a fixed maximum line length
//! so an agent that never terminates a line cannot make the bridge buffer
//! without bound.
//!
//! # Usage
//!
//! [`AcpCodec`] is the decoder behind the dispatcher's
//! [`tokio_util::codec::FramedRead`] and the encoder used by
//! [`OutboundWriter`](crate::acp::writer::OutboundWriter). Both directions use
//! UTF-8 lines delimited by `\n`; there is no framing beyond that.
//!
//! A JSON text containing a raw newline cannot be carried. Compact
//! `serde_json` output escapes newlines inside strings, so the bridge never
//! produces one; an agent that does will have its message split into two
//! unparseable lines, each of which is logged and skipped.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::{AppError, Result};

/// Maximum line length accepted by the ACP codec: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// NDJSON codec for bidirectional ACP agent streams.
///
/// Inbound lines longer than [`MAX_LINE_BYTES`] are logged, counted, and
/// discarded up to the next newline; decoding then continues with the
/// following line in the same call, so buffered input is never stranded
/// behind a rejected line. I/O errors map to [`AppError::Io`].
///
/// ```rust,ignore
/// use tokio_util::codec::FramedRead;
/// use acp_bridge::acp::codec::AcpCodec;
///
/// let lines = FramedRead::new(child_stdout, AcpCodec::new());
/// ```
#[derive(Debug)]
pub struct AcpCodec {
    lines: LinesCodec,
    oversized: u64,
}

impl AcpCodec {
    /// Create a new `AcpCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
            oversized: 0,
        }
    }

    /// Number of over-long lines discarded so far.
    #[must_use]
    pub fn oversized_lines(&self) -> u64 {
        self.oversized
    }

    fn note_oversized(&mut self) {
        self.oversized += 1;
        warn!(
            max_bytes = MAX_LINE_BYTES,
            total = self.oversized,
            "acp codec: line too long, discarding"
        );
    }
}

impl Default for AcpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AcpCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.lines.decode(src) {
                Err(LinesCodecError::MaxLineLengthExceeded) => self.note_oversized(),
                other => return other.map_err(map_codec_error),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.lines.decode_eof(src) {
                Err(LinesCodecError::MaxLineLengthExceeded) => self.note_oversized(),
                other => return other.map_err(map_codec_error),
            }
        }
    }
}

impl Encoder<String> for AcpCodec {
    type Error = AppError;

    /// Encode `item` as a `\n`-terminated line into `dst`.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        // The max-length limit is a decode-side concern only.
        self.lines.encode(item, dst).map_err(map_codec_error)
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Parse(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
