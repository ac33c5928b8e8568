//! Bridge configuration parsing and validation.
//!
//! Every section is optional; an empty file yields the defaults below.
//! Command-line flags are applied on top by the binary, which then calls
//! [`BridgeConfig::validate`] again.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::acp::spawner::AgentLaunch;
use crate::mode::PermissionMode;
use crate::models::protocol::{ClientCapabilities, FileSystemCapability, McpServer};
use crate::orchestrator::supervisor::SupervisorSettings;
use crate::{AppError, Result};

/// Agent launched when nothing else is configured.
pub const DEFAULT_AGENT_COMMAND: &str = "codex-acp";

/// How to launch the agent.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Executable name or path.
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; defaults to the bridge's own.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Extra environment for the agent, on top of the inherited one.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }
}

fn default_command() -> String {
    DEFAULT_AGENT_COMMAND.into()
}

/// Timeout values in seconds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Handshake and extension requests.
    #[serde(default = "default_request_seconds")]
    pub request_seconds: u64,
    /// Prompt turns; 0 means no timeout.
    #[serde(default)]
    pub prompt_seconds: u64,
    /// Grace period before a stopping agent is killed.
    #[serde(default = "default_stop_grace_seconds")]
    pub stop_grace_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_seconds: default_request_seconds(),
            prompt_seconds: 0,
            stop_grace_seconds: default_stop_grace_seconds(),
        }
    }
}

fn default_request_seconds() -> u64 {
    30
}

fn default_stop_grace_seconds() -> u64 {
    5
}

/// Client capabilities offered to the agent.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CapabilitiesConfig {
    /// Serve `fs/read_text_file` inside the session directory.
    #[serde(default)]
    pub fs_read: bool,
    /// Serve `fs/write_text_file` inside the session directory.
    #[serde(default)]
    pub fs_write: bool,
}

/// Configuration parsed from `acp-bridge.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BridgeConfig {
    /// How permission requests are answered.
    #[serde(default)]
    pub permission_mode: PermissionMode,
    /// Agent launch settings.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Advertised client capabilities.
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    /// MCP servers registered with every new session.
    #[serde(default)]
    pub mcp_servers: Vec<McpServer>,
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants and canonicalise the working directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violation.
    pub fn validate(&mut self) -> Result<()> {
        if self.agent.command.trim().is_empty() {
            return Err(AppError::Config("agent.command must not be empty".into()));
        }

        if self.timeouts.request_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.request_seconds must be greater than zero".into(),
            ));
        }

        let mut names = HashSet::new();
        for server in &self.mcp_servers {
            if server.name.trim().is_empty() {
                return Err(AppError::Config("mcp_servers entries need a name".into()));
            }
            if server.command.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "mcp server {} has an empty command",
                    server.name
                )));
            }
            if !names.insert(server.name.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate mcp server name: {}",
                    server.name
                )));
            }
        }

        if let Some(cwd) = &self.agent.cwd {
            let canonical = cwd
                .canonicalize()
                .map_err(|err| AppError::Config(format!("agent.cwd invalid: {err}")))?;
            self.agent.cwd = Some(canonical);
        }

        Ok(())
    }

    /// Capabilities advertised in `initialize`.
    #[must_use]
    pub fn client_capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            fs: FileSystemCapability {
                read_text_file: self.capabilities.fs_read,
                write_text_file: self.capabilities.fs_write,
            },
            terminal: false,
        }
    }

    /// Supervisor tunables.
    #[must_use]
    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            request_timeout: Duration::from_secs(self.timeouts.request_seconds),
            prompt_timeout: match self.timeouts.prompt_seconds {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            stop_grace: Duration::from_secs(self.timeouts.stop_grace_seconds),
            capabilities: self.client_capabilities(),
            permission_mode: self.permission_mode,
        }
    }

    /// Launch description; `fallback_cwd` is used when `agent.cwd` is unset.
    #[must_use]
    pub fn launch(&self, fallback_cwd: &Path) -> AgentLaunch {
        AgentLaunch {
            command: self.agent.command.clone(),
            args: self.agent.args.clone(),
            env: self.agent.env.clone(),
            cwd: self
                .agent
                .cwd
                .clone()
                .unwrap_or_else(|| fallback_cwd.to_path_buf()),
            mcp_servers: self.mcp_servers.clone(),
        }
    }
}
