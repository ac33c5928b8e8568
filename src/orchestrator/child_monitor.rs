//! Child process helpers: stderr draining, graceful termination, and
//! human-readable exit descriptions.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Span};

use crate::{AppError, Result};

/// Forward each stderr line of the agent to the log at `DEBUG`.
///
/// The task ends when the agent closes stderr.
#[must_use]
pub fn drain_stderr(stderr: ChildStderr, span: Span) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => debug!(target: "acp_bridge::agent_stderr", "{line}"),
                    Ok(None) => break,
                    Err(err) => {
                        debug!(%err, "agent stderr unreadable, stopping drain");
                        break;
                    }
                }
            }
        }
        .instrument(span),
    )
}

/// Stop `child`: polite termination request, then a forced kill once
/// `grace` has elapsed.
///
/// Returns immediately if the process has already exited.
///
/// # Errors
///
/// Returns `AppError::Io` if waiting on or killing the process fails.
pub async fn terminate_gracefully(child: &mut Child, grace: Duration) -> Result<ExitStatus> {
    if let Ok(Some(status)) = child.try_wait() {
        debug!(status = %describe_exit(status), "agent already exited");
        return Ok(status);
    }

    request_termination(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            info!(status = %describe_exit(status), "agent exited gracefully");
            Ok(status)
        }
        Ok(Err(err)) => Err(AppError::Io(format!("error waiting for agent: {err}"))),
        Err(_) => {
            warn!(?grace, "agent did not exit within grace period, forcing kill");
            child
                .kill()
                .await
                .map_err(|err| AppError::Io(format!("failed to kill agent: {err}")))?;
            let status = child
                .wait()
                .await
                .map_err(|err| AppError::Io(format!("error waiting for agent: {err}")))?;
            info!(status = %describe_exit(status), "agent killed");
            Ok(status)
        }
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        warn!(pid, %err, "failed to send SIGTERM to agent");
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        warn!(%err, "failed to terminate agent");
    }
}

/// Short description such as `exited with code 1`.
#[must_use]
pub fn describe_exit(status: ExitStatus) -> String {
    if status.success() {
        return "exited normally (code 0)".to_owned();
    }
    if let Some(code) = status.code() {
        return format!("exited with code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {signal}");
        }
    }
    "terminated by signal".to_owned()
}
