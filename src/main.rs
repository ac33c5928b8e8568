#![forbid(unsafe_code)]

//! `acp-bridge`: line-oriented front-end for an ACP agent.
//!
//! Each stdin line is sent as a prompt and the agent's streamed reply is
//! printed to stdout. Lines starting with `/` control the connection. Logs go
//! to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use acp_bridge::mode::PermissionMode;
use acp_bridge::orchestrator::AgentSupervisor;
use acp_bridge::{AppError, BridgeConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "acp-bridge", about = "Drive an ACP agent over stdio", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Agent executable.
    #[arg(long, env = "ACP_AGENT_COMMAND")]
    agent: Option<String>,

    /// Agent arguments, whitespace separated.
    #[arg(long, env = "ACP_AGENT_ARGS", allow_hyphen_values = true)]
    agent_args: Option<String>,

    /// Session working directory.
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// How permission requests are answered.
    #[arg(long, value_enum)]
    permission_mode: Option<PermissionMode>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

const CONFIG_HINT: &str = "Make sure the ACP agent is configured correctly.";

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = load_config(&args)?;
    let fallback_cwd = std::env::current_dir()
        .map_err(|err| AppError::Config(format!("cannot determine working directory: {err}")))?;
    let launch = config.launch(&fallback_cwd);
    info!(command = %launch.command, cwd = %launch.cwd.display(), "configuration loaded");

    let supervisor = Arc::new(AgentSupervisor::new(config.supervisor_settings()));
    if let Err(err) = supervisor.start(launch).await {
        error!(%err, "agent failed to start");
        print_error(&err).await;
        return Err(err);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            () = shutdown_signal() => {
                info!("shutdown signal received");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "stdin read failed");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !run_command(&supervisor, command).await {
                break;
            }
        } else {
            run_prompt(&supervisor, line).await;
        }
    }

    supervisor.stop().await?;
    info!("acp-bridge shut down");
    Ok(())
}

fn load_config(args: &Cli) -> Result<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load_from_path(path)?,
        None => BridgeConfig::default(),
    };

    if let Some(agent) = &args.agent {
        config.agent.command.clone_from(agent);
    }
    if let Some(agent_args) = &args.agent_args {
        config.agent.args = agent_args.split_whitespace().map(str::to_owned).collect();
    }
    if let Some(cwd) = &args.cwd {
        config.agent.cwd = Some(cwd.clone());
    }
    if let Some(mode) = args.permission_mode {
        config.permission_mode = mode;
    }

    config.validate()?;
    Ok(config)
}

/// Send one prompt; ctrl-c while it runs cancels the turn.
async fn run_prompt(supervisor: &AgentSupervisor, text: &str) {
    let turn = supervisor.prompt(text);
    tokio::pin!(turn);

    let outcome = loop {
        tokio::select! {
            outcome = &mut turn => break outcome,
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!(%err, "ctrl-c handler failed");
                }
                if let Err(err) = supervisor.cancel().await {
                    warn!(%err, "cancel failed");
                }
            }
        }
    };

    match outcome {
        Ok(outcome) if outcome.text.is_empty() => print_out("No response from agent").await,
        Ok(outcome) => print_out(&outcome.text).await,
        Err(err) => print_error(&err).await,
    }
}

/// Handle a `/command`. Returns `false` when the loop should end.
async fn run_command(supervisor: &AgentSupervisor, command: &str) -> bool {
    let mut parts = command.split_whitespace();
    let result = match (parts.next(), parts.next()) {
        (Some("quit" | "exit"), _) => return false,
        (Some("restart"), None) => supervisor.restart().await.map(|()| "restarted".to_owned()),
        (Some("session"), cwd) => restart_in(supervisor, cwd).await,
        (Some("mode"), None) => Ok(supervisor.permission_mode().await.to_string()),
        (Some("mode"), Some(value)) => match PermissionMode::from_str(value, true) {
            Ok(mode) => {
                supervisor.set_permission_mode(mode).await;
                Ok(format!("permission mode: {mode}"))
            }
            Err(_) => Ok(format!("unknown permission mode: {value}")),
        },
        (Some("history"), None) => {
            serde_json::to_string_pretty(&supervisor.permission_history().await)
                .map_err(|err| AppError::Protocol(err.to_string()))
        }
        (Some("info"), None) => match supervisor.session_info().await {
            Some(info) => serde_json::to_string_pretty(&info)
                .map_err(|err| AppError::Protocol(err.to_string())),
            None => Ok(format!("agent {}", supervisor.state())),
        },
        _ => Ok("commands: /session [CWD], /restart, /mode [auto|manual|deny], /history, /info, /quit"
            .to_owned()),
    };

    match result {
        Ok(text) => print_out(&text).await,
        Err(err) => print_error(&err).await,
    }
    true
}

async fn restart_in(supervisor: &AgentSupervisor, cwd: Option<&str>) -> Result<String> {
    let Some(cwd) = cwd else {
        supervisor.restart().await?;
        return Ok("new session started".to_owned());
    };

    let cwd = PathBuf::from(cwd)
        .canonicalize()
        .map_err(|err| AppError::Config(format!("invalid session directory: {err}")))?;
    let Some(mut launch) = supervisor.last_launch().await else {
        return Err(AppError::NotRunning("no agent to restart".into()));
    };
    launch.cwd = cwd;
    supervisor.restart_with(launch).await?;
    Ok("new session started".to_owned())
}

async fn print_out(text: &str) {
    let mut stdout = tokio::io::stdout();
    let mut buf = text.as_bytes().to_vec();
    if !text.ends_with('\n') {
        buf.push(b'\n');
    }
    if let Err(err) = stdout.write_all(&buf).await {
        warn!(%err, "stdout write failed");
    }
    let _ = stdout.flush().await;
}

async fn print_error(err: &AppError) {
    print_out(&format!("Error: {err}\n\n{CONFIG_HINT}")).await;
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
