//! Running the downloaded binary.

// Forwarding SIGTERM to the child goes through libc::kill.
#![allow(unsafe_code)]

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use relshim_core::{CancellationToken, Error, Result};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Exit code reported when the child did not exit normally.
pub const EXIT_ABNORMAL: i32 = 1;

/// How long a cancelled child has to exit before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Run `path` with `args`, inheriting stdio and the environment, and return
/// its exit code.
///
/// When `cancel` fires the child is asked to terminate (SIGTERM on unix, a
/// hard kill elsewhere). A child still running after [`TERMINATE_GRACE`] is
/// killed.
///
/// # Errors
///
/// Returns [`Error::Execution`] when the process cannot be started or
/// waited on.
pub async fn run_binary(cancel: &CancellationToken, path: &Path, args: &[String]) -> Result<i32> {
    run_binary_with_grace(cancel, path, args, TERMINATE_GRACE).await
}

async fn run_binary_with_grace(
    cancel: &CancellationToken,
    path: &Path,
    args: &[String],
    grace: Duration,
) -> Result<i32> {
    let program = path.display().to_string();
    debug!(%program, ?args, "Spawning");

    let mut child = Command::new(path)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::execution(&program, format!("failed to start: {e}")))?;

    let status = tokio::select! {
        biased;
        status = child.wait() => status,
        () = cancel.cancelled() => {
            info!(%program, "Forwarding termination to child");
            terminate(&mut child);
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(
                        %program,
                        grace_ms = grace.as_millis(),
                        "Child did not exit after termination, killing"
                    );
                    if let Err(e) = child.start_kill() {
                        warn!(%program, error = %e, "Failed to kill child");
                    }
                    child.wait().await
                }
            }
        }
    }
    .map_err(|e| Error::execution(&program, format!("failed to wait: {e}")))?;

    let code = exit_code(status);
    debug!(%program, %status, code, "Child exited");
    Ok(code)
}

/// Map an exit status to the code relshim exits with.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(EXIT_ABNORMAL)
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    let Some(pid) = child.id().and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    // SAFETY: kill(2) with a pid we spawned and still own; the child has not
    // been reaped, so the pid cannot have been recycled.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        warn!(pid, error = %std::io::Error::last_os_error(), "Failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Failed to kill child");
    }
}
