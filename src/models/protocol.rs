//! Agent Client Protocol wire types used by the bridge.
//!
//! Only the subset of the ACP schema the client sends or consumes is
//! modelled. Inbound payloads are deserialised leniently: unknown fields are
//! ignored and optional members default, so newer agents remain compatible.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ACP protocol version this client speaks.
pub const PROTOCOL_VERSION: u16 = 1;

/// Method names used on the wire.
pub mod methods {
    /// Client → agent: version and capability negotiation.
    pub const INITIALIZE: &str = "initialize";
    /// Client → agent: create a session.
    pub const SESSION_NEW: &str = "session/new";
    /// Client → agent: send a user prompt.
    pub const SESSION_PROMPT: &str = "session/prompt";
    /// Client → agent notification: cancel the running prompt.
    pub const SESSION_CANCEL: &str = "session/cancel";
    /// Agent → client notification: streamed session update.
    pub const SESSION_UPDATE: &str = "session/update";
    /// Agent → client: ask for approval before a sensitive action.
    pub const REQUEST_PERMISSION: &str = "session/request_permission";
    /// Agent → client: read a text file.
    pub const FS_READ_TEXT_FILE: &str = "fs/read_text_file";
    /// Agent → client: write a text file.
    pub const FS_WRITE_TEXT_FILE: &str = "fs/write_text_file";
    /// Prefix shared by all terminal methods.
    pub const TERMINAL_PREFIX: &str = "terminal/";
}

/// Identification sent in `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Implementation {
    /// Program name.
    pub name: String,
    /// Program version.
    pub version: String,
}

/// File system capabilities advertised to the agent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemCapability {
    /// The client serves `fs/read_text_file`.
    #[serde(default)]
    pub read_text_file: bool,
    /// The client serves `fs/write_text_file`.
    #[serde(default)]
    pub write_text_file: bool,
}

/// Capabilities advertised in `initialize`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    /// File system access.
    #[serde(default)]
    pub fs: FileSystemCapability,
    /// The client serves `terminal/*`. Always `false` for this bridge.
    #[serde(default)]
    pub terminal: bool,
}

/// `initialize` parameters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    /// Latest protocol version supported by the client.
    pub protocol_version: u16,
    /// What the client can do for the agent.
    pub client_capabilities: ClientCapabilities,
    /// Client identification.
    pub client_info: Implementation,
}

/// `initialize` result.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    /// Protocol version chosen by the agent.
    #[serde(default)]
    pub protocol_version: u16,
    /// Agent capabilities, kept opaque.
    #[serde(default)]
    pub agent_capabilities: Value,
    /// Agent identification, when provided.
    #[serde(default)]
    pub agent_info: Option<Implementation>,
}

/// One environment variable for an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvVariable {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

/// Auxiliary stdio MCP server registered with a new session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpServer {
    /// Human-readable name, unique within a launch configuration.
    pub name: String,
    /// Executable path.
    pub command: String,
    /// Command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment passed to the server.
    #[serde(default, with = "env_as_list")]
    pub env: BTreeMap<String, String>,
}

/// `session/new` parameters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionRequest {
    /// Working directory for the session.
    pub cwd: PathBuf,
    /// MCP servers the agent should connect to.
    pub mcp_servers: Vec<McpServer>,
}

/// `session/new` result.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResponse {
    /// Opaque id chosen by the agent.
    pub session_id: String,
}

/// Prompt content block. Only text is produced by this client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
}

/// `session/prompt` parameters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    /// Target session.
    pub session_id: String,
    /// Prompt content.
    pub prompt: Vec<ContentBlock>,
}

/// `session/prompt` result.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    /// Why the turn ended (`end_turn`, `cancelled`, `max_tokens`, …).
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// `session/cancel` parameters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CancelNotification {
    /// Session whose prompt should stop.
    pub session_id: String,
}

/// `session/update` parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionNotification {
    /// Session the update belongs to.
    pub session_id: String,
    /// The update payload.
    pub update: SessionUpdate,
}

/// Session update payload; only the discriminator and content are read.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    /// Update kind, e.g. `agent_message_chunk`.
    pub session_update: String,
    /// Kind-specific content.
    #[serde(default)]
    pub content: Option<Value>,
}

/// Update kind carrying streamed agent output.
pub const AGENT_MESSAGE_CHUNK: &str = "agent_message_chunk";

impl SessionUpdate {
    /// Text of an `agent_message_chunk`, if this update is one and carries
    /// non-empty text content.
    #[must_use]
    pub fn message_text(&self) -> Option<&str> {
        if self.session_update != AGENT_MESSAGE_CHUNK {
            return None;
        }
        self.content
            .as_ref()?
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
    }
}

/// One choice offered in a permission request.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    /// Id to echo back when selected.
    pub option_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// `allow_once`, `allow_always`, `reject_once`, `reject_always`.
    #[serde(default)]
    pub kind: String,
}

/// `session/request_permission` parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionRequest {
    /// Session the request belongs to.
    #[serde(default)]
    pub session_id: String,
    /// The tool call awaiting approval, kept opaque.
    #[serde(default)]
    pub tool_call: Value,
    /// Choices offered by the agent.
    #[serde(default)]
    pub options: Vec<PermissionOption>,
}

/// `fs/read_text_file` parameters.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadTextFileRequest {
    /// Requesting session.
    #[serde(default)]
    pub session_id: String,
    /// Absolute path.
    pub path: PathBuf,
    /// 1-based first line to return.
    #[serde(default)]
    pub line: Option<u32>,
    /// Maximum number of lines.
    #[serde(default)]
    pub limit: Option<u32>,
}

/// `fs/write_text_file` parameters.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WriteTextFileRequest {
    /// Requesting session.
    #[serde(default)]
    pub session_id: String,
    /// Absolute path.
    pub path: PathBuf,
    /// Full new file content.
    pub content: String,
}

/// ACP encodes MCP server env as `[{name, value}]`; config files use a table.
mod env_as_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::EnvVariable;

    pub fn serialize<S>(env: &BTreeMap<String, String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        env.iter()
            .map(|(name, value)| EnvVariable {
                name: name.clone(),
                value: value.clone(),
            })
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum EnvRepr {
        Table(BTreeMap<String, String>),
        List(Vec<EnvVariable>),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match EnvRepr::deserialize(deserializer)? {
            EnvRepr::Table(table) => table,
            EnvRepr::List(list) => list.into_iter().map(|v| (v.name, v.value)).collect(),
        })
    }
}
