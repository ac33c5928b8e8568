//! Unit tests for request/response correlation over an in-memory pipe.
//!
//! Covers:
//! - ids start at 1 and strictly increase
//! - responses delivered out of order reach the right callers
//! - timeout removes the call and a late reply is ignored
//! - agent error objects surface verbatim
//! - end of stream fails outstanding and later calls with `ConnectionLost`
//! - a broken pipe fails the call with `Io`
//! - typed prompt and cancel messages

use std::time::Duration;

use serde_json::{json, Value};

use acp_bridge::acp::client::RpcClient;
use acp_bridge::acp::pending::PendingCalls;
use acp_bridge::acp::writer::OutboundWriter;
use acp_bridge::AppError;

use super::test_helpers::Harness;

const TIMEOUT: Duration = Duration::from_secs(5);

fn reply(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

// ── Correlation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn ids_start_at_one_and_increase() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);

    for expected in 1..=3_u64 {
        let client = h.connection.client().clone();
        let call = tokio::spawn(async move { client.request("ext/ping", json!({})).await });

        let req = h.recv().await;
        assert_eq!(req["id"], json!(expected));
        assert_eq!(req["jsonrpc"], "2.0");
        assert_eq!(req["method"], "ext/ping");

        h.send(&reply(&req["id"], json!(expected))).await;
        let value = call.await.expect("join").expect("call succeeds");
        assert_eq!(value, json!(expected));
    }
}

/// Three calls answered in the order 3, 1, 2 each receive their own result.
#[tokio::test]
async fn out_of_order_responses_are_matched_by_id() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);

    let mut calls = Vec::new();
    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        let client = h.connection.client().clone();
        calls.push(tokio::spawn(async move {
            client.request(name, json!({ "name": name })).await
        }));
        let req = h.recv().await;
        ids.push((req["id"].clone(), req["params"]["name"].clone()));
    }

    for index in [2, 0, 1] {
        let (id, name) = &ids[index];
        h.send(&reply(id, json!({ "echo": name }))).await;
    }

    let results: Vec<Value> = futures_util::future::join_all(calls)
        .await
        .into_iter()
        .map(|r| r.expect("join").expect("call succeeds"))
        .collect();
    assert_eq!(
        results,
        vec![
            json!({ "echo": "a" }),
            json!({ "echo": "b" }),
            json!({ "echo": "c" }),
        ]
    );
}

#[tokio::test]
async fn null_result_is_success() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);
    let client = h.connection.client().clone();
    let call = tokio::spawn(async move { client.request("fs/noop", json!({})).await });

    let req = h.recv().await;
    h.send(&reply(&req["id"], Value::Null)).await;

    assert_eq!(call.await.expect("join").expect("ok"), Value::Null);
}

// ── Failures ────────────────────────────────────────────────────────────────

/// A call with no reply fails with `Timeout`; its late reply is dropped and
/// does not disturb the next call.
#[tokio::test]
async fn timeout_then_late_reply_is_stale() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);
    let client = h.connection.client().clone();
    let slow = tokio::spawn(async move {
        client
            .call("slow", json!({}), Some(Duration::from_millis(50)))
            .await
    });

    let first = h.recv().await;
    let err = slow.await.expect("join").expect_err("must time out");
    assert!(matches!(err, AppError::Timeout(_)), "unexpected: {err}");

    h.send(&reply(&first["id"], json!("late"))).await;

    let client = h.connection.client().clone();
    let next = tokio::spawn(async move { client.request("fast", json!({})).await });
    let second = h.recv().await;
    assert_eq!(second["id"], json!(2));
    h.send(&reply(&second["id"], json!("fresh"))).await;

    assert_eq!(next.await.expect("join").expect("ok"), json!("fresh"));
}

#[tokio::test]
async fn remote_error_is_returned_verbatim() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);
    let client = h.connection.client().clone();
    let call = tokio::spawn(async move { client.request("session/new", json!({})).await });

    let req = h.recv().await;
    h.send(&json!({
        "jsonrpc": "2.0",
        "id": req["id"],
        "error": { "code": -32000, "message": "auth required", "data": { "hint": "login" } }
    }))
    .await;

    match call.await.expect("join") {
        Err(AppError::Remote(err)) => {
            assert_eq!(err.code, -32000);
            assert_eq!(err.message, "auth required");
            assert_eq!(err.data, Some(json!({ "hint": "login" })));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

/// End of stream fails the outstanding call, fires the lost token, and
/// makes later calls fail immediately.
#[tokio::test]
async fn end_of_stream_fails_pending_calls() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);
    let client = h.connection.client().clone();
    let call = tokio::spawn(async move { client.call("session/prompt", json!({}), None).await });

    let _ = h.recv().await;
    h.close_agent_output().await;

    let err = call.await.expect("join").expect_err("must fail");
    assert!(matches!(err, AppError::ConnectionLost(_)), "unexpected: {err}");

    tokio::time::timeout(TIMEOUT, h.connection.lost_token().cancelled())
        .await
        .expect("lost token fires");
    assert!(h.connection.is_lost());

    let err = h
        .connection
        .client()
        .request("again", json!({}))
        .await
        .expect_err("closed connection refuses calls");
    assert!(matches!(err, AppError::ConnectionLost(_)));
}

#[tokio::test]
async fn closing_connection_fails_pending_without_loss_signal() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);
    let client = h.connection.client().clone();
    let call = tokio::spawn(async move { client.call("session/prompt", json!({}), None).await });

    let _ = h.recv().await;
    h.connection.close().await;

    let err = call.await.expect("join").expect_err("must fail");
    assert!(matches!(err, AppError::ConnectionLost(_)));
    assert!(!h.connection.is_lost());
}

#[tokio::test]
async fn broken_pipe_fails_call_with_io_error() {
    let (ours, theirs) = tokio::io::duplex(1024);
    drop(theirs);
    let pending = PendingCalls::new();
    let client = RpcClient::new(OutboundWriter::new(ours), pending.clone(), TIMEOUT);

    let err = client
        .request("initialize", json!({}))
        .await
        .expect_err("write must fail");

    assert!(matches!(err, AppError::Io(_)), "unexpected: {err}");
    assert!(pending.is_empty().await, "failed write must not leave a pending call");
}

// ── Typed calls ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn prompt_sends_text_block_and_reads_stop_reason() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);
    let client = h.connection.client().clone();
    let call = tokio::spawn(async move { client.prompt("sess-1", "hello", None).await });

    let req = h.recv().await;
    assert_eq!(req["method"], "session/prompt");
    assert_eq!(
        req["params"],
        json!({ "sessionId": "sess-1", "prompt": [{ "type": "text", "text": "hello" }] })
    );
    h.send(&reply(&req["id"], json!({ "stopReason": "end_turn" }))).await;

    let response = call.await.expect("join").expect("ok");
    assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));
}

#[tokio::test]
async fn cancel_is_a_notification() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);

    h.connection.client().cancel("sess-1").await.expect("cancel");

    let msg = h.recv().await;
    assert!(msg.get("id").is_none());
    assert_eq!(msg["method"], "session/cancel");
    assert_eq!(msg["params"], json!({ "sessionId": "sess-1" }));
}

#[tokio::test]
async fn extension_notification_is_sent_verbatim() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);

    h.connection
        .client()
        .ext_notification("_vendor/progress", json!({ "pct": 50 }))
        .await
        .expect("notify");

    let msg = h.recv().await;
    assert!(msg.get("id").is_none());
    assert_eq!(msg["method"], "_vendor/progress");
    assert_eq!(msg["params"], json!({ "pct": 50 }));
}
