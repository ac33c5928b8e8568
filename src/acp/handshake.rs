//! ACP initialization handshake.
//!
//! Once the dispatcher is attached to a freshly spawned agent, the bridge
//! performs two calls before the connection counts as running:
//!
//! 1. **`initialize`** advertises the protocol version, client capabilities
//!    and `clientInfo`. A different version in the reply is logged and
//!    tolerated.
//! 2. **`session/new`** opens a session in the working directory and
//!    registers any configured MCP servers. The returned id is what every
//!    later `session/prompt` targets.
//!
//! Both go through [`RpcClient::request`], so they share the request timeout
//! and fail with `ConnectionLost` if the agent exits mid-handshake.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::acp::client::{from_result, to_params, RpcClient};
use crate::models::protocol::{
    methods, ClientCapabilities, Implementation, InitializeRequest, InitializeResponse, McpServer,
    NewSessionRequest, NewSessionResponse, PROTOCOL_VERSION,
};
use crate::{AppError, Result};

/// Name sent as `clientInfo.name`.
pub const CLIENT_NAME: &str = "acp-bridge";

/// Negotiate protocol version and capabilities.
///
/// # Errors
///
/// - Any error from [`RpcClient::request`].
/// - `AppError::Protocol` if the result is not an initialize response.
pub async fn initialize(
    client: &RpcClient,
    capabilities: ClientCapabilities,
) -> Result<InitializeResponse> {
    let params = to_params(&InitializeRequest {
        protocol_version: PROTOCOL_VERSION,
        client_capabilities: capabilities,
        client_info: Implementation {
            name: CLIENT_NAME.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        },
    })?;

    let result = client.request(methods::INITIALIZE, params).await?;
    let response: InitializeResponse = from_result(methods::INITIALIZE, result)?;

    if response.protocol_version != PROTOCOL_VERSION {
        warn!(
            ours = PROTOCOL_VERSION,
            theirs = response.protocol_version,
            "handshake: agent chose a different protocol version"
        );
    }

    match &response.agent_info {
        Some(agent) => info!(agent = %agent.name, version = %agent.version, "handshake: initialized"),
        None => info!("handshake: initialized"),
    }
    Ok(response)
}

/// Open a session rooted at `cwd`.
///
/// # Errors
///
/// - Any error from [`RpcClient::request`].
/// - `AppError::Protocol` if the result carries no usable session id.
pub async fn new_session(
    client: &RpcClient,
    cwd: &Path,
    mcp_servers: &[McpServer],
) -> Result<NewSessionResponse> {
    let params = to_params(&NewSessionRequest {
        cwd: cwd.to_path_buf(),
        mcp_servers: mcp_servers.to_vec(),
    })?;

    let result = client.request(methods::SESSION_NEW, params).await?;
    let response: NewSessionResponse = from_result(methods::SESSION_NEW, result)?;

    if response.session_id.is_empty() {
        return Err(AppError::Protocol("session/new returned an empty sessionId".into()));
    }

    debug!(
        session_id = %response.session_id,
        mcp_servers = mcp_servers.len(),
        cwd = %cwd.display(),
        "handshake: session created"
    );
    Ok(response)
}
