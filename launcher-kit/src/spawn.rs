//! Process creation and the notification contract consumed by the supervisor.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::plan::SpawnPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Notifications for one spawned process, delivered in order.
///
/// Exactly one of `Spawned` or `SpawnFailed` arrives first. `Exited` only
/// ever follows `Spawned`, and comes after every `Output` line the process
/// wrote.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Spawned {
        pid: u32,
        handle: Arc<dyn ProcessHandle>,
    },
    SpawnFailed {
        reason: String,
    },
    Output {
        stream: OutputStream,
        chunk: String,
    },
    /// A process-level error after a successful spawn.
    Error {
        reason: String,
    },
    Exited {
        code: Option<i32>,
    },
}

/// Live handle on a spawned process.
#[async_trait]
pub trait ProcessHandle: Send + Sync + fmt::Debug {
    fn pid(&self) -> u32;

    /// Ask the process to terminate. Returns `false` when the request could
    /// not be delivered, e.g. because the process is already gone.
    async fn request_graceful(&self) -> bool;

    /// Terminate the process without giving it a chance to clean up.
    async fn request_forced(&self);
}

/// Starts processes described by a [`SpawnPlan`].
pub trait Spawner: Send + Sync {
    /// Start the process and report its lifecycle on `events`. Never blocks on the child.
    fn spawn(&self, app: &str, plan: &SpawnPlan, events: mpsc::UnboundedSender<ProcessEvent>);
}

/// Spawner backed by `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct OsSpawner;

impl OsSpawner {
    fn command(plan: &SpawnPlan) -> Command {
        let mut command = Command::new(&plan.executable);

        #[cfg(windows)]
        {
            if plan.options.verbatim_args {
                for arg in &plan.args {
                    command.raw_arg(arg);
                }
            } else {
                command.args(&plan.args);
            }
        }
        #[cfg(not(windows))]
        command.args(&plan.args);

        if let Some(dir) = &plan.working_directory {
            command.current_dir(dir);
        }
        command.envs(&plan.env);
        command.stdin(Stdio::null());

        if plan.options.capture_output {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        // Own process group, so terminal signals aimed at the supervisor don't reach the app
        #[cfg(unix)]
        if plan.options.detached {
            command.process_group(0);
        }

        command.kill_on_drop(false);
        command
    }
}

impl Spawner for OsSpawner {
    fn spawn(&self, app: &str, plan: &SpawnPlan, events: mpsc::UnboundedSender<ProcessEvent>) {
        debug!(app = %app, "Running command: {}", plan.display_command());

        let mut child = match Self::command(plan).spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = events.send(ProcessEvent::SpawnFailed {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let Some(pid) = child.id() else {
            let _ = events.send(ProcessEvent::SpawnFailed {
                reason: "process exited before its id could be read".to_string(),
            });
            return;
        };

        let handle = Arc::new(OsProcessHandle {
            pid,
            exited: AtomicBool::new(false),
            force: Notify::new(),
        });
        let _ = events.send(ProcessEvent::Spawned {
            pid,
            handle: handle.clone(),
        });

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_output(
                stdout,
                OutputStream::Stdout,
                events.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_output(
                stderr,
                OutputStream::Stderr,
                events.clone(),
            )));
        }

        tokio::spawn(wait_for_child(child, handle, readers, events));
    }
}

/// Strip a single trailing newline (`\n` or `\r\n`).
pub fn trim_trailing_newline(chunk: &str) -> &str {
    let chunk = chunk.strip_suffix('\n').unwrap_or(chunk);
    chunk.strip_suffix('\r').unwrap_or(chunk)
}

async fn forward_output<R>(
    reader: R,
    stream: OutputStream,
    events: mpsc::UnboundedSender<ProcessEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = String::from_utf8_lossy(&buf);
                let event = ProcessEvent::Output {
                    stream,
                    chunk: trim_trailing_newline(&chunk).to_string(),
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = events.send(ProcessEvent::Error {
                    reason: format!("reading {}: {}", stream, e),
                });
                break;
            }
        }
    }
}

/// How long output readers may keep draining after the child is reaped.
/// Pipes inherited by a grandchild never reach EOF.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

async fn wait_for_child(
    mut child: Child,
    handle: Arc<OsProcessHandle>,
    readers: Vec<JoinHandle<()>>,
    events: mpsc::UnboundedSender<ProcessEvent>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = handle.force.notified() => {
                if let Err(e) = child.start_kill() {
                    debug!("Force kill of pid {} failed: {}", handle.pid, e);
                }
            }
        }
    };

    handle.exited.store(true, Ordering::SeqCst);
    drain_output(handle.pid, readers).await;

    match status {
        Ok(status) => {
            let _ = events.send(ProcessEvent::Exited {
                code: status.code(),
            });
        }
        Err(e) => {
            let _ = events.send(ProcessEvent::Error {
                reason: format!("waiting for pid {}: {}", handle.pid, e),
            });
            let _ = events.send(ProcessEvent::Exited { code: None });
        }
    }
}

async fn drain_output(pid: u32, mut readers: Vec<JoinHandle<()>>) {
    let drained = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, async {
        for reader in readers.iter_mut() {
            let _ = reader.await;
        }
    })
    .await;

    if drained.is_err() {
        debug!("Output of pid {} still open after exit, no longer reading it", pid);
        for reader in &readers {
            reader.abort();
        }
    }
}

/// Handle on a child spawned by [`OsSpawner`].
#[derive(Debug)]
pub struct OsProcessHandle {
    pid: u32,
    exited: AtomicBool,
    force: Notify,
}

#[async_trait]
impl ProcessHandle for OsProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    #[cfg(unix)]
    async fn request_graceful(&self) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        // Once reaped the PID may belong to someone else
        if self.exited.load(Ordering::SeqCst) {
            return false;
        }
        let Ok(raw) = i32::try_from(self.pid) else {
            return false;
        };

        match signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(e) => {
                warn!("Failed to send SIGTERM to pid {}: {}", self.pid, e);
                false
            }
        }
    }

    #[cfg(not(unix))]
    async fn request_graceful(&self) -> bool {
        if self.exited.load(Ordering::SeqCst) {
            return false;
        }
        match Command::new("taskkill")
            .arg("/PID")
            .arg(self.pid.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(e) => {
                warn!("Failed to run taskkill for pid {}: {}", self.pid, e);
                false
            }
        }
    }

    async fn request_forced(&self) {
        if !self.exited.load(Ordering::SeqCst) {
            self.force.notify_one();
        }
    }
}
