//! Unit tests for the NDJSON codec.
//!
//! Covers:
//! - a complete line decodes without its newline
//! - batched lines decode one per call
//! - partial delivery is buffered until the newline arrives
//! - an over-long line is discarded and the codec resynchronises
//! - encoding appends exactly one newline

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use acp_bridge::acp::codec::{AcpCodec, MAX_LINE_BYTES};

// ── Framing ─────────────────────────────────────────────────────────────────

/// A complete JSON object on a newline-terminated line is returned as the
/// line content, without the `\n`.
#[test]
fn single_line_decodes() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");

    let line = codec.decode(&mut buf).expect("decode");

    assert_eq!(
        line.as_deref(),
        Some("{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}")
    );
}

#[test]
fn batched_lines_decode_one_at_a_time() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from(concat!(
        "{\"method\":\"session/update\",\"params\":{}}\n",
        "{\"id\":2,\"result\":null}\n",
    ));

    assert!(codec.decode(&mut buf).expect("first").is_some());
    assert!(codec.decode(&mut buf).expect("second").is_some());
    assert!(codec.decode(&mut buf).expect("drained").is_none());
}

/// Bytes without a newline are held back; the line is yielded once the
/// newline arrives.
#[test]
fn partial_delivery_is_buffered_until_newline() {
    let mut codec = AcpCodec::new();

    let mut buf = BytesMut::from("{\"id\":1,");
    assert!(codec.decode(&mut buf).expect("partial").is_none());

    buf.extend_from_slice(b"\"result\":true}\n");
    let line = codec.decode(&mut buf).expect("complete");
    assert_eq!(line.as_deref(), Some("{\"id\":1,\"result\":true}"));
}

// ── Line cap ────────────────────────────────────────────────────────────────

/// A line longer than the cap is discarded up to its newline and the next
/// line is returned by the same call.
#[test]
fn over_long_line_is_discarded_and_next_line_decodes() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::with_capacity(MAX_LINE_BYTES + 64);
    buf.extend_from_slice(&vec![b'x'; MAX_LINE_BYTES + 10]);
    buf.extend_from_slice(b"\n{\"id\":1,\"result\":1}\n");

    let next = codec.decode(&mut buf).expect("over-long line is not an error");

    assert_eq!(next.as_deref(), Some("{\"id\":1,\"result\":1}"));
    assert_eq!(codec.oversized_lines(), 1);
}

/// An over-long line split across reads is still discarded as one line.
#[test]
fn over_long_line_across_reads_is_discarded() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&vec![b'y'; MAX_LINE_BYTES + 1]);
    assert!(codec.decode(&mut buf).expect("first chunk").is_none());

    buf.extend_from_slice(&vec![b'y'; 4096]);
    assert!(codec.decode(&mut buf).expect("second chunk").is_none());

    buf.extend_from_slice(b"tail\nnext\n");
    assert_eq!(codec.decode(&mut buf).expect("resync").as_deref(), Some("next"));
    assert_eq!(codec.oversized_lines(), 1);
}

// ── Encoding ────────────────────────────────────────────────────────────────

#[test]
fn encode_appends_single_newline() {
    let mut codec = AcpCodec::new();
    let mut dst = BytesMut::new();

    codec
        .encode("{\"id\":1}".to_owned(), &mut dst)
        .expect("encode");

    assert_eq!(&dst[..], b"{\"id\":1}\n");
}

/// End of input with a trailing unterminated line yields that line.
#[test]
fn decode_eof_returns_trailing_line() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from("{\"id\":9,\"result\":0}");

    let line = codec.decode_eof(&mut buf).expect("decode at eof");

    assert_eq!(line.as_deref(), Some("{\"id\":9,\"result\":0}"));
}
