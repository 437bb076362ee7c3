//! Escalating stop protocol: graceful request, two waits, then force.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::config::SupervisorSettings;
use crate::error::Result;
use crate::run_state::{Phase, RunSnapshot};
use crate::spawn::ProcessHandle;

/// What a stop request acts on.
#[derive(Debug, Clone)]
pub enum StopTarget {
    /// The directly spawned process
    Handle(Arc<dyn ProcessHandle>),
    /// A PID discovered outside the spawn call
    Pid(u32),
}

/// Sends termination signals to arbitrary PIDs.
#[async_trait]
pub trait KillCommand: Send + Sync {
    async fn terminate(&self, pid: u32) -> Result<()>;
    async fn kill(&self, pid: u32) -> Result<()>;
}

/// `SIGTERM`/`SIGKILL` on Unix, `taskkill` elsewhere.
#[derive(Debug, Default, Clone)]
pub struct SignalKill;

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> Result<()> {
    use crate::error::Error;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|e| Error::KillFailed {
        pid,
        reason: e.to_string(),
    })?;
    nix::sys::signal::kill(Pid::from_raw(raw), signal).map_err(|e| Error::KillFailed {
        pid,
        reason: e.to_string(),
    })
}

#[cfg(not(unix))]
async fn taskkill(pid: u32, force: bool) -> Result<()> {
    use crate::error::Error;
    use std::process::Stdio;

    let mut command = tokio::process::Command::new("taskkill");
    command.arg("/PID").arg(pid.to_string());
    if force {
        command.arg("/F");
    }
    let status = command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| Error::KillFailed {
            pid,
            reason: e.to_string(),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::KillFailed {
            pid,
            reason: format!("taskkill exited with {}", status),
        })
    }
}

#[async_trait]
impl KillCommand for SignalKill {
    #[cfg(unix)]
    async fn terminate(&self, pid: u32) -> Result<()> {
        send_signal(pid, nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(unix)]
    async fn kill(&self, pid: u32) -> Result<()> {
        send_signal(pid, nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(not(unix))]
    async fn terminate(&self, pid: u32) -> Result<()> {
        taskkill(pid, false).await
    }

    #[cfg(not(unix))]
    async fn kill(&self, pid: u32) -> Result<()> {
        taskkill(pid, true).await
    }
}

/// Runs the stop protocol against one run.
///
/// The run's phase is re-checked after every wait; once it reads `Exited`
/// the remaining escalation is skipped.
#[derive(Clone)]
pub struct Terminator {
    kill: Arc<dyn KillCommand>,
    grace_check: Duration,
    kill_timeout: Duration,
}

impl Terminator {
    pub fn new(kill: Arc<dyn KillCommand>, settings: &SupervisorSettings) -> Self {
        Self {
            kill,
            grace_check: settings.grace_check(),
            kill_timeout: settings.kill_timeout(),
        }
    }

    pub async fn stop(&self, target: StopTarget, run: watch::Receiver<RunSnapshot>) {
        match target {
            StopTarget::Handle(handle) => {
                if !handle.request_graceful().await {
                    debug!("Pid {} already gone", handle.pid());
                    return;
                }
                if self.exited_after_waits(&run).await {
                    return;
                }
                debug!("Pid {} ignored the stop request, forcing", handle.pid());
                handle.request_forced().await;
            }
            StopTarget::Pid(pid) => {
                if let Err(e) = self.kill.terminate(pid).await {
                    debug!("Pid {} already gone: {}", pid, e);
                    return;
                }
                if self.exited_after_waits(&run).await {
                    return;
                }
                debug!("Pid {} ignored the stop request, forcing", pid);
                if let Err(e) = self.kill.kill(pid).await {
                    debug!("Force kill of pid {} failed, assuming it is gone: {}", pid, e);
                }
            }
        }
    }

    async fn exited_after_waits(&self, run: &watch::Receiver<RunSnapshot>) -> bool {
        for wait in [self.grace_check, self.kill_timeout] {
            tokio::time::sleep(wait).await;
            if run.borrow().phase == Phase::Exited {
                return true;
            }
        }
        false
    }
}
