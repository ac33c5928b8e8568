//! Agent supervisor: owns the child process and its connection.
//!
//! Lifecycle: `Stopped → Starting → Running → Stopping → Stopped`, published
//! on a [`watch`] channel. [`AgentSupervisor::start`] counts as done only
//! after `initialize` and `session/new` succeed; a failed handshake reaps the
//! child and returns to `Stopped`. An agent that exits on its own is detected
//! through the connection's lost token; a watcher task then reaps it and
//! moves the state to `Stopped`. Nothing is restarted automatically.
//!
//! Lifecycle operations are serialised by one lock. Prompts take their own
//! lock so only one turn runs at a time, and they never hold the lifecycle
//! lock while waiting, so `stop` can always interrupt a running prompt.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::process::Child;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument, Span};

use crate::acp::client::{RpcClient, DEFAULT_REQUEST_TIMEOUT};
use crate::acp::connection::AcpConnection;
use crate::acp::handshake;
use crate::acp::spawner::{spawn_agent, AgentLaunch};
use crate::handler::client::ClientHandler;
use crate::mode::PermissionMode;
use crate::models::permission::PermissionRecord;
use crate::models::protocol::{ClientCapabilities, Implementation};
use crate::models::session::{SessionState, SharedSession};
use crate::orchestrator::child_monitor::{describe_exit, drain_stderr, terminate_gracefully};
use crate::policy::{PermissionPolicy, SharedPolicy};
use crate::{AppError, Result};

/// Default time a stopping agent gets before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle state of the supervised agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No process.
    Stopped,
    /// Process spawned, handshake in progress.
    Starting,
    /// Handshake done, session active.
    Running,
    /// Termination in progress.
    Stopping,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        })
    }
}

/// Tunables fixed for the supervisor's lifetime.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Timeout for `initialize`, `session/new` and extension calls.
    pub request_timeout: Duration,
    /// Timeout for `session/prompt`; `None` waits indefinitely.
    pub prompt_timeout: Option<Duration>,
    /// Grace period between the termination request and the forced kill.
    pub stop_grace: Duration,
    /// Capabilities advertised in `initialize`.
    pub capabilities: ClientCapabilities,
    /// Initial permission mode.
    pub permission_mode: PermissionMode,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            prompt_timeout: None,
            stop_grace: DEFAULT_STOP_GRACE,
            capabilities: ClientCapabilities::default(),
            permission_mode: PermissionMode::default(),
        }
    }
}

/// Result of one prompt turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOutcome {
    /// Concatenated `agent_message_chunk` text streamed during the turn.
    pub text: String,
    /// Stop reason reported by the agent.
    pub stop_reason: Option<String>,
}

/// Snapshot of the running connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    /// Session id assigned by the agent.
    pub session_id: String,
    /// OS process id, while known.
    pub pid: Option<u32>,
    /// Command that was launched.
    pub command: String,
    /// Session working directory.
    pub cwd: PathBuf,
    /// Agent identification from `initialize`.
    pub agent: Option<Implementation>,
    /// When the handshake completed.
    pub started_at: DateTime<Utc>,
}

struct Running {
    generation: u64,
    child: Child,
    connection: AcpConnection,
    info: SessionInfo,
    watcher: JoinHandle<()>,
    stderr: JoinHandle<()>,
}

#[derive(Default)]
struct Lifecycle {
    launch: Option<AgentLaunch>,
    running: Option<Running>,
    generation: u64,
}

/// Owns one agent process at a time and exposes the client operations.
pub struct AgentSupervisor {
    lifecycle: Arc<Mutex<Lifecycle>>,
    state: Arc<watch::Sender<ConnectionState>>,
    session: SharedSession,
    policy: SharedPolicy,
    prompt_lock: Mutex<()>,
    settings: SupervisorSettings,
}

impl std::fmt::Debug for AgentSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSupervisor")
            .field("state", &*self.state.borrow())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AgentSupervisor {
    /// Create a stopped supervisor.
    #[must_use]
    pub fn new(settings: SupervisorSettings) -> Self {
        let (state, _) = watch::channel(ConnectionState::Stopped);
        Self {
            lifecycle: Arc::new(Mutex::new(Lifecycle::default())),
            state: Arc::new(state),
            session: SessionState::shared(),
            policy: PermissionPolicy::shared(settings.permission_mode),
            prompt_lock: Mutex::new(()),
            settings,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Spawn the agent and negotiate a session.
    ///
    /// A no-op when already running.
    ///
    /// # Errors
    ///
    /// - `AppError::Spawn` if the process cannot be started.
    /// - Any handshake error (`Timeout`, `Remote`, `ConnectionLost`,
    ///   `Protocol`, `Io`); the child has been reaped and the state is
    ///   `Stopped` again.
    pub async fn start(&self, launch: AgentLaunch) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.running.is_some() {
            info!("agent already running, start ignored");
            return Ok(());
        }
        self.start_locked(&mut lifecycle, launch).await
    }

    /// Stop the agent: close the connection, request termination, and kill
    /// it once the grace period has elapsed.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the process cannot be waited on or killed.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.stop_locked(&mut lifecycle).await
    }

    /// Stop, then start again with the last launch. A new session is
    /// negotiated.
    ///
    /// # Errors
    ///
    /// - `AppError::NotRunning` if the agent was never started.
    /// - Any error from [`stop`](Self::stop) or [`start`](Self::start).
    pub async fn restart(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let launch = lifecycle
            .launch
            .clone()
            .ok_or_else(|| AppError::NotRunning("no previous launch to restart".into()))?;
        self.stop_locked(&mut lifecycle).await?;
        self.start_locked(&mut lifecycle, launch).await
    }

    /// Stop, then start with a different launch (for example a new working
    /// directory).
    ///
    /// # Errors
    ///
    /// Any error from [`stop`](Self::stop) or [`start`](Self::start).
    pub async fn restart_with(&self, launch: AgentLaunch) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.stop_locked(&mut lifecycle).await?;
        self.start_locked(&mut lifecycle, launch).await
    }

    /// Send a text prompt and wait for the turn to finish.
    ///
    /// The output buffer is cleared first; the returned text is everything
    /// streamed before the terminal response.
    ///
    /// # Errors
    ///
    /// - `AppError::NotRunning` without an active session.
    /// - Any error from the `session/prompt` call.
    pub async fn prompt(&self, text: &str) -> Result<PromptOutcome> {
        let _turn = self.prompt_lock.lock().await;
        let (client, session_id) = self.active().await?;

        self.session.lock().await.begin_prompt();
        let response = client
            .prompt(&session_id, text, self.settings.prompt_timeout)
            .await?;
        let text = self.session.lock().await.take_output();

        info!(
            session_id = %session_id,
            stop_reason = ?response.stop_reason,
            bytes = text.len(),
            "prompt completed"
        );
        Ok(PromptOutcome {
            text,
            stop_reason: response.stop_reason,
        })
    }

    /// Ask the agent to cancel the running prompt. Does not wait.
    ///
    /// # Errors
    ///
    /// - `AppError::NotRunning` without an active session.
    /// - `AppError::Io` if the notification cannot be written.
    pub async fn cancel(&self) -> Result<()> {
        let (client, session_id) = self.active().await?;
        info!(session_id = %session_id, "cancelling prompt");
        client.cancel(&session_id).await
    }

    /// Call an agent-specific method.
    ///
    /// # Errors
    ///
    /// - `AppError::NotRunning` without an active session.
    /// - Any error from the call.
    pub async fn ext_method(&self, method: &str, params: Value) -> Result<Value> {
        let (client, _) = self.active().await?;
        client.ext_method(method, params).await
    }

    /// Send an agent-specific notification. Does not wait for the agent.
    ///
    /// # Errors
    ///
    /// - `AppError::NotRunning` without an active session.
    /// - `AppError::Io` if the notification cannot be written.
    pub async fn ext_notification(&self, method: &str, params: Value) -> Result<()> {
        let (client, _) = self.active().await?;
        client.ext_notification(method, params).await
    }

    /// Snapshot of the running connection, if any.
    pub async fn session_info(&self) -> Option<SessionInfo> {
        self.lifecycle
            .lock()
            .await
            .running
            .as_ref()
            .map(|r| r.info.clone())
    }

    /// Launch used by the last successful start.
    pub async fn last_launch(&self) -> Option<AgentLaunch> {
        self.lifecycle.lock().await.launch.clone()
    }

    /// Change how future permission requests are answered.
    pub async fn set_permission_mode(&self, mode: PermissionMode) {
        self.policy.lock().await.set_mode(mode);
    }

    /// Mode applied to the next permission request.
    pub async fn permission_mode(&self) -> PermissionMode {
        self.policy.lock().await.mode()
    }

    /// Every permission decision made so far, oldest first.
    pub async fn permission_history(&self) -> Vec<PermissionRecord> {
        self.policy.lock().await.history().to_vec()
    }

    async fn active(&self) -> Result<(RpcClient, String)> {
        let lifecycle = self.lifecycle.lock().await;
        let running = lifecycle
            .running
            .as_ref()
            .ok_or_else(|| AppError::NotRunning("agent is not running".into()))?;
        if running.connection.is_lost() {
            return Err(AppError::NotRunning("agent connection was lost".into()));
        }
        Ok((
            running.connection.client().clone(),
            running.info.session_id.clone(),
        ))
    }

    async fn start_locked(&self, lifecycle: &mut Lifecycle, launch: AgentLaunch) -> Result<()> {
        self.state.send_replace(ConnectionState::Starting);

        let spawned = match spawn_agent(&launch) {
            Ok(spawned) => spawned,
            Err(err) => {
                warn!(error = %err, "agent spawn failed");
                self.state.send_replace(ConnectionState::Stopped);
                return Err(err);
            }
        };

        lifecycle.generation += 1;
        let generation = lifecycle.generation;
        let mut child = spawned.child;
        let pid = child.id();
        let span = info_span!("acp_connection", generation, pid = ?pid, command = %launch.command);

        let stderr = drain_stderr(spawned.stderr, span.clone());
        let handler = ClientHandler::new(
            Arc::clone(&self.session),
            Arc::clone(&self.policy),
            self.settings.capabilities,
            launch.cwd.clone(),
        );
        let mut connection = AcpConnection::attach(
            spawned.stdout,
            spawned.stdin,
            Arc::new(handler),
            self.settings.request_timeout,
            span.clone(),
        );

        let handshake = async {
            let init = handshake::initialize(connection.client(), self.settings.capabilities).await?;
            let session =
                handshake::new_session(connection.client(), &launch.cwd, &launch.mcp_servers)
                    .await?;
            Ok::<_, AppError>((init, session))
        }
        .instrument(span.clone())
        .await;

        let (init, session) = match handshake {
            Ok(done) => done,
            Err(err) => {
                warn!(parent: &span, error = %err, "handshake failed, reaping agent");
                connection.close().await;
                if let Err(reap_err) = terminate_gracefully(&mut child, self.settings.stop_grace)
                    .instrument(span.clone())
                    .await
                {
                    warn!(parent: &span, error = %reap_err, "failed to reap agent");
                }
                stderr.abort();
                self.state.send_replace(ConnectionState::Stopped);
                return Err(err);
            }
        };

        self.session
            .lock()
            .await
            .activate(session.session_id.clone());

        let watcher = self.spawn_exit_watcher(generation, connection.lost_token(), span.clone());

        info!(
            parent: &span,
            session_id = %session.session_id,
            cwd = %launch.cwd.display(),
            "agent running"
        );

        lifecycle.running = Some(Running {
            generation,
            child,
            connection,
            info: SessionInfo {
                session_id: session.session_id,
                pid,
                command: launch.command.clone(),
                cwd: launch.cwd.clone(),
                agent: init.agent_info,
                started_at: Utc::now(),
            },
            watcher,
            stderr,
        });
        lifecycle.launch = Some(launch);
        self.state.send_replace(ConnectionState::Running);
        Ok(())
    }

    async fn stop_locked(&self, lifecycle: &mut Lifecycle) -> Result<()> {
        let Some(running) = lifecycle.running.take() else {
            self.state.send_replace(ConnectionState::Stopped);
            return Ok(());
        };

        self.state.send_replace(ConnectionState::Stopping);
        running.watcher.abort();
        let result = shutdown(running, self.settings.stop_grace).await;

        self.session.lock().await.deactivate();
        self.state.send_replace(ConnectionState::Stopped);
        result
    }

    fn spawn_exit_watcher(
        &self,
        generation: u64,
        lost: tokio_util::sync::CancellationToken,
        span: Span,
    ) -> JoinHandle<()> {
        let lifecycle = Arc::clone(&self.lifecycle);
        let state = Arc::clone(&self.state);
        let session = Arc::clone(&self.session);
        let grace = self.settings.stop_grace;

        tokio::spawn(
            async move {
                lost.cancelled().await;

                let mut guard = lifecycle.lock().await;
                if guard.running.as_ref().map(|r| r.generation) != Some(generation) {
                    return;
                }
                let Some(running) = guard.running.take() else {
                    return;
                };

                warn!("agent exited unexpectedly");
                state.send_replace(ConnectionState::Stopping);
                if let Err(err) = shutdown(running, grace).await {
                    warn!(error = %err, "failed to reap agent");
                }
                session.lock().await.deactivate();
                state.send_replace(ConnectionState::Stopped);
            }
            .instrument(span),
        )
    }
}

/// Close the connection, then terminate and reap the process.
async fn shutdown(mut running: Running, grace: Duration) -> Result<()> {
    running.connection.close().await;
    let status = terminate_gracefully(&mut running.child, grace).await;
    running.stderr.abort();

    let status = status?;
    info!(
        session_id = %running.info.session_id,
        status = %describe_exit(status),
        "agent stopped"
    );
    Ok(())
}
