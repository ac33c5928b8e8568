//! ACP agent process spawner.
//!
//! Spawns the agent with all three standard streams piped and
//! `kill_on_drop(true)`, so a dropped handle never leaks a process. The child
//! inherits the bridge's environment plus the launch overrides and starts in
//! the launch working directory.
//!
//! A command naming an existing script without execute permission is run
//! through the interpreter in its `#!` line, or `sh` when there is none.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use crate::models::protocol::McpServer;
use crate::{AppError, Result};

/// Interpreter used for a non-executable script with no `#!` line.
pub const FALLBACK_INTERPRETER: &str = "sh";

/// Everything needed to launch, and later relaunch, an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentLaunch {
    /// Executable name or path.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Variables added to (or overriding) the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Working directory of the process and of the ACP session.
    pub cwd: PathBuf,
    /// MCP servers registered during `session/new`.
    pub mcp_servers: Vec<McpServer>,
}

impl AgentLaunch {
    /// Launch `command` with no arguments in `cwd`.
    #[must_use]
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: cwd.into(),
            mcp_servers: Vec::new(),
        }
    }

    /// Replace the argument list.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add one environment override.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// A running agent process with its stdio handles taken.
#[derive(Debug)]
pub struct SpawnedAgent {
    /// Process handle; dropping it kills the process.
    pub child: Child,
    /// Agent's stdin, where requests are written.
    pub stdin: ChildStdin,
    /// Agent's stdout, read by the dispatcher.
    pub stdout: ChildStdout,
    /// Agent's stderr, drained to the log.
    pub stderr: ChildStderr,
}

/// Program and leading arguments that actually get executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProgram {
    /// Executable handed to the OS.
    pub program: String,
    /// Arguments placed before the launch arguments.
    pub prefix_args: Vec<String>,
}

/// Spawn the agent described by `launch`.
///
/// # Errors
///
/// - `AppError::Spawn("working directory … does not exist")`.
/// - `AppError::Spawn("failed to spawn agent …")` on an OS spawn failure
///   (missing executable, permission denied).
/// - `AppError::Spawn("failed to capture agent …")` if a pipe is missing.
pub fn spawn_agent(launch: &AgentLaunch) -> Result<SpawnedAgent> {
    if !launch.cwd.is_dir() {
        return Err(AppError::Spawn(format!(
            "working directory {} does not exist",
            launch.cwd.display()
        )));
    }

    let resolved = resolve_program(&launch.command, &launch.cwd);
    if !resolved.prefix_args.is_empty() {
        info!(
            command = %launch.command,
            interpreter = %resolved.program,
            "agent command is not executable, running through interpreter"
        );
    }

    let mut cmd = Command::new(&resolved.program);
    cmd.args(&resolved.prefix_args)
        .args(&launch.args)
        .envs(&launch.env)
        .current_dir(&launch.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Spawn(format!("failed to spawn agent `{}`: {err}", launch.command))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stderr".into()))?;

    debug!(
        pid = child.id(),
        command = %launch.command,
        args = ?launch.args,
        cwd = %launch.cwd.display(),
        "agent process spawned"
    );

    Ok(SpawnedAgent {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Decide how to execute `command` for a process started in `cwd`.
///
/// Bare names are left to the OS `PATH` lookup. A command containing a path
/// separator is resolved against `cwd`, the directory the agent runs in, and
/// executed by that absolute path. Existing files without execute permission
/// run through their interpreter.
#[must_use]
pub fn resolve_program(command: &str, cwd: &Path) -> ResolvedProgram {
    let path = Path::new(command);
    if !path.is_absolute() && path.components().count() < 2 {
        return ResolvedProgram {
            program: command.to_owned(),
            prefix_args: Vec::new(),
        };
    }

    let path = cwd.join(path);
    let resolved = path.to_string_lossy().into_owned();
    if !path.is_file() || is_executable(&path) {
        return ResolvedProgram {
            program: resolved,
            prefix_args: Vec::new(),
        };
    }

    let mut prefix_args = read_shebang(&path)
        .filter(|parts| !parts.is_empty())
        .unwrap_or_else(|| vec![FALLBACK_INTERPRETER.to_owned()]);
    let program = prefix_args.remove(0);
    prefix_args.push(resolved);

    ResolvedProgram {
        program,
        prefix_args,
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

/// Interpreter and its optional argument from a `#!` line.
fn read_shebang(path: &Path) -> Option<Vec<String>> {
    let mut head = [0_u8; 256];
    let n = std::fs::File::open(path).ok()?.read(&mut head).ok()?;
    let head = head.get(..n)?;
    let rest = head.strip_prefix(b"#!")?;
    let line_end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
    let line = std::str::from_utf8(rest.get(..line_end)?).ok()?;
    Some(line.split_whitespace().map(str::to_owned).collect())
}
