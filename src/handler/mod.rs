//! Client-side handling of agent-initiated messages.
//!
//! The [`InboundHandler`] trait is the seam between the transport (the
//! dispatcher in [`crate::acp::reader`]) and the client's behaviour. The
//! dispatcher calls it inline for every inbound request and notification, in
//! stream order, so implementations must return promptly.
//!
//! [`client::ClientHandler`] is the production implementation: it streams
//! message chunks into the session state, applies the permission policy, and
//! optionally serves file reads and writes.

pub mod client;
pub mod fs;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::acp::envelope::RpcError;

/// Boxed future returned by [`InboundHandler`] methods.
pub type HandlerFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handles requests and notifications sent by the agent to the client.
pub trait InboundHandler: Send + Sync {
    /// Answer an agent-to-client request.
    ///
    /// The returned value becomes the `result` of the response; an
    /// [`RpcError`] becomes its `error` object. Either way the dispatcher
    /// writes the response with the request's `id`.
    fn handle_request(
        &self,
        method: &str,
        params: Value,
    ) -> HandlerFuture<'_, std::result::Result<Value, RpcError>>;

    /// Consume a one-way notification from the agent.
    fn handle_notification(&self, method: &str, params: Value) -> HandlerFuture<'_, ()>;
}
