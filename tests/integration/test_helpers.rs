//! Shared helpers for supervisor integration tests.
//!
//! Each test gets its own temporary working directory with a private copy
//! of the stub agent script, so permission bits and environment overrides
//! never leak between tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use acp_bridge::acp::spawner::AgentLaunch;
use acp_bridge::mode::PermissionMode;
use acp_bridge::orchestrator::supervisor::{AgentSupervisor, ConnectionState, SupervisorSettings};

/// Stub agent source shipped with the tests.
const STUB_AGENT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/stub_agent.sh");

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(10);

/// Grace period used by test supervisors.
pub const GRACE: Duration = Duration::from_secs(1);

/// Temporary workspace holding a copy of the stub agent.
pub struct Workspace {
    _dir: tempfile::TempDir,
    pub root: PathBuf,
    pub script: PathBuf,
}

impl Workspace {
    /// Workspace with an executable stub agent.
    pub fn new() -> Self {
        Self::with_mode(0o755)
    }

    /// Workspace whose stub agent carries the given permission bits.
    pub fn with_mode(mode: u32) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().canonicalize().expect("canonical tempdir");
        let script = root.join("stub_agent.sh");
        std::fs::copy(STUB_AGENT, &script).expect("copy stub agent");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(mode))
            .expect("chmod stub agent");
        Self {
            _dir: dir,
            root,
            script,
        }
    }

    /// Launch of the stub agent inside this workspace.
    pub fn launch(&self) -> AgentLaunch {
        AgentLaunch::new(self.script.to_string_lossy(), &self.root)
    }

    /// Launch of the stub agent in another directory.
    pub fn launch_in(&self, cwd: &Path) -> AgentLaunch {
        AgentLaunch::new(self.script.to_string_lossy(), cwd)
    }
}

/// Supervisor with short timeouts.
pub fn supervisor(mode: PermissionMode) -> AgentSupervisor {
    AgentSupervisor::new(SupervisorSettings {
        request_timeout: Duration::from_secs(5),
        prompt_timeout: Some(Duration::from_secs(5)),
        stop_grace: GRACE,
        permission_mode: mode,
        ..SupervisorSettings::default()
    })
}

/// Wait until the supervisor reports `state`.
pub async fn wait_for_state(supervisor: &AgentSupervisor, state: ConnectionState) {
    let mut rx = supervisor.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(|current| *current == state))
        .await
        .expect("state reached in time")
        .expect("state channel open");
}
