//! Permission mode: how agent permission requests are answered.
//!
//! `PermissionMode` is used as the `--permission-mode` CLI flag value and as
//! the `permission_mode` key in the TOML configuration.

use std::fmt::{Display, Formatter};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Policy applied to every `session/request_permission` from the agent.
///
/// Defaults to [`PermissionMode::Auto`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Approve every request.
    #[default]
    Auto,
    /// Ask the operator for each request.
    ///
    /// Interactive prompting is not implemented; requests are approved and a
    /// warning is logged.
    Manual,
    /// Deny every request.
    Deny,
}

impl Display for PermissionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Deny => "deny",
        })
    }
}
