//! Unit tests for the dispatcher loop: malformed-line resilience, stale
//! response isolation, stream ordering, and inbound request replies.

use std::time::Duration;

use serde_json::json;

use acp_bridge::acp::codec::MAX_LINE_BYTES;
use acp_bridge::acp::envelope::{INTERNAL_ERROR, METHOD_NOT_FOUND};
use acp_bridge::AppError;

use super::test_helpers::Harness;

const TIMEOUT: Duration = Duration::from_secs(5);

// ── Resilience ──────────────────────────────────────────────────────────────

/// Garbage between a request and its response is skipped; the call still
/// completes with the right value.
#[tokio::test]
async fn malformed_lines_do_not_disturb_pending_call() {
    let (mut h, recorder) = Harness::with_recorder(TIMEOUT);
    let client = h.connection.client().clone();
    let call = tokio::spawn(async move { client.request("initialize", json!({})).await });

    let req = h.recv().await;
    for junk in [
        "this is not json",
        "{\"truncated\":",
        "[1,2,3]",
        "",
        "{\"jsonrpc\":\"2.0\"}",
    ] {
        h.send_raw(junk).await;
    }
    h.send(&json!({ "jsonrpc": "2.0", "id": req["id"], "result": { "protocolVersion": 1 } }))
        .await;

    let value = call.await.expect("join").expect("call succeeds");
    assert_eq!(value["protocolVersion"], 1);
    assert!(recorder.notifications.lock().expect("lock").is_empty());
    assert!(!h.connection.is_lost());
}

/// A response with a malformed error object still completes the call,
/// even without a timeout.
#[tokio::test]
async fn malformed_error_object_fails_pending_call() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);
    let client = h.connection.client().clone();
    let call = tokio::spawn(async move { client.call("session/prompt", json!({}), None).await });

    let req = h.recv().await;
    h.send(&json!({
        "jsonrpc": "2.0",
        "id": req["id"],
        "error": { "code": "-32000", "message": "boom" }
    }))
    .await;

    let outcome = tokio::time::timeout(TIMEOUT, call)
        .await
        .expect("call completes")
        .expect("join");
    match outcome {
        Err(AppError::Remote(err)) => {
            assert_eq!(err.code, INTERNAL_ERROR);
            assert_eq!(err.data, Some(json!({ "code": "-32000", "message": "boom" })));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    assert!(!h.connection.is_lost());
}

#[tokio::test]
async fn over_long_line_is_skipped() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);
    let client = h.connection.client().clone();
    let call = tokio::spawn(async move { client.request("initialize", json!({})).await });

    let req = h.recv().await;
    h.send_raw(&"x".repeat(MAX_LINE_BYTES + 1)).await;
    h.send(&json!({ "jsonrpc": "2.0", "id": req["id"], "result": "ok" }))
        .await;

    assert_eq!(call.await.expect("join").expect("ok"), json!("ok"));
    assert!(!h.connection.is_lost());
}

/// Responses for unknown or non-numeric ids are dropped; the real response
/// still reaches its caller.
#[tokio::test]
async fn stale_responses_are_isolated() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);
    let client = h.connection.client().clone();
    let call = tokio::spawn(async move { client.request("session/new", json!({})).await });

    let req = h.recv().await;
    h.send(&json!({ "jsonrpc": "2.0", "id": 99, "result": "stale" })).await;
    h.send(&json!({ "jsonrpc": "2.0", "id": "abc", "result": "stale" })).await;
    h.send(&json!({ "jsonrpc": "2.0", "id": null, "error": { "code": -32700, "message": "Parse error" } }))
        .await;
    h.send(&json!({ "jsonrpc": "2.0", "id": req["id"], "result": { "sessionId": "s1" } }))
        .await;

    let value = call.await.expect("join").expect("ok");
    assert_eq!(value, json!({ "sessionId": "s1" }));
}

// ── Routing ─────────────────────────────────────────────────────────────────

/// A notification written before a response has been handled by the time
/// the caller of that response wakes.
#[tokio::test]
async fn notification_before_response_is_handled_first() {
    let (mut h, recorder) = Harness::with_recorder(TIMEOUT);
    let client = h.connection.client().clone();
    let call = tokio::spawn(async move { client.request("session/prompt", json!({})).await });

    let req = h.recv().await;
    for n in 0..3 {
        h.send(&json!({ "jsonrpc": "2.0", "method": "session/update", "params": { "n": n } }))
            .await;
    }
    h.send(&json!({ "jsonrpc": "2.0", "id": req["id"], "result": {} }))
        .await;
    call.await.expect("join").expect("ok");

    let seen = recorder.notifications.lock().expect("lock").clone();
    let order: Vec<i64> = seen
        .iter()
        .map(|(method, params)| {
            assert_eq!(method, "session/update");
            params["n"].as_i64().expect("n")
        })
        .collect();
    assert_eq!(order, vec![0, 1, 2]);
}

/// Inbound requests are answered with the same id, numeric or string.
#[tokio::test]
async fn inbound_request_is_answered_with_same_id() {
    let (mut h, _) = Harness::with_recorder(TIMEOUT);

    h.send(&json!({ "jsonrpc": "2.0", "id": 7, "method": "terminal/create", "params": {} }))
        .await;
    let reply = h.recv().await;
    assert_eq!(reply["id"], 7);
    assert_eq!(reply["error"]["code"], METHOD_NOT_FOUND);

    h.send(&json!({ "jsonrpc": "2.0", "id": "req-2", "method": "x/unknown" }))
        .await;
    let reply = h.recv().await;
    assert_eq!(reply["id"], "req-2");
    assert_eq!(reply["error"]["data"]["method"], "x/unknown");
}
