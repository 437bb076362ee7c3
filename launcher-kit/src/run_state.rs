use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::spawn::ProcessHandle;
use crate::termination::StopTarget;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No run in progress
    #[default]
    Idle,
    /// Spawn requested, OS has not confirmed yet
    Starting,
    /// Process confirmed
    Running,
    /// Termination in progress. Left only through an exit notification.
    Stopping,
    Exited,
}

impl Phase {
    pub fn is_active(self) -> bool {
        matches!(self, Phase::Starting | Phase::Running | Phase::Stopping)
    }

    fn is_live(self) -> bool {
        matches!(self, Phase::Running | Phase::Stopping)
    }
}

/// `(start, stop, exit code)` of one completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub exit_code: Option<i32>,
}

impl SessionRecord {
    pub fn run_time(&self) -> std::time::Duration {
        (self.stop_time - self.start_time)
            .to_std()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    LaunchRequested,
    /// The OS created the process.
    SpawnConfirmed {
        pid: u32,
        handle: Arc<dyn ProcessHandle>,
    },
    /// The OS could not create the process at all.
    SpawnFailed,
    /// Native exit notification of the spawned process.
    ProcessExited { code: Option<i32> },
    StopRequested,
    /// The spawned process is a wrapper; its PID is meaningless for termination.
    TrackedPidDiscarded,
    TrackedPidResolved { pid: u32 },
    /// The tracked PID vanished from the process table.
    TrackedPidGone { pid: u32 },
    PidResolutionStalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    None,
    Starting,
    Started { pid: u32 },
    LaunchFailed,
    Stopping,
    /// Stop requested before the OS confirmed the spawn. Applied on confirm.
    StopDeferred,
    Exited(SessionRecord),
    /// Exit notification swallowed by `suppress_next_exit_notification`.
    Suppressed { code: Option<i32> },
    /// Event not applicable in the current phase.
    Ignored,
}

/// Observable view of a run, published to stop requests and callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSnapshot {
    pub phase: Phase,
    /// PID of the directly spawned process.
    pub pid: Option<u32>,
    pub tracked_pid: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub pid_resolution_stalled: bool,
}

/// Pure lifecycle state machine for one launch.
///
/// No I/O: the supervisor driver feeds it `RunEvent`s and acts on the
/// returned `Transition`. Exit is terminal and idempotent.
#[derive(Debug)]
pub struct RunState {
    phase: Phase,
    handle: Option<Arc<dyn ProcessHandle>>,
    pid: Option<u32>,
    tracked_pid: Option<u32>,
    start_time: Option<DateTime<Utc>>,
    stop_time: Option<DateTime<Utc>>,
    indirect: bool,
    suppress_next_exit_notification: bool,
    stop_pending: bool,
    pid_resolution_stalled: bool,
}

impl RunState {
    /// `indirect` runs swallow the wrapper's own exit notification once.
    pub fn new(indirect: bool) -> Self {
        Self {
            phase: Phase::Idle,
            handle: None,
            pid: None,
            tracked_pid: None,
            start_time: None,
            stop_time: None,
            indirect,
            suppress_next_exit_notification: false,
            stop_pending: false,
            pid_resolution_stalled: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tracked_pid(&self) -> Option<u32> {
        self.tracked_pid
    }

    pub fn on_event(&mut self, event: RunEvent, now: DateTime<Utc>) -> Transition {
        match event {
            RunEvent::LaunchRequested => {
                if self.phase != Phase::Idle {
                    return Transition::Ignored;
                }
                self.phase = Phase::Starting;
                Transition::Starting
            }
            RunEvent::SpawnConfirmed { pid, handle } => {
                if self.phase != Phase::Starting {
                    return Transition::Ignored;
                }
                self.phase = if std::mem::take(&mut self.stop_pending) {
                    Phase::Stopping
                } else {
                    Phase::Running
                };
                self.handle = Some(handle);
                self.pid = Some(pid);
                self.tracked_pid = Some(pid);
                self.start_time = Some(now);
                self.suppress_next_exit_notification = self.indirect;
                Transition::Started { pid }
            }
            RunEvent::SpawnFailed => {
                if self.phase != Phase::Starting {
                    return Transition::Ignored;
                }
                self.phase = Phase::Exited;
                self.stop_time = Some(now);
                self.stop_pending = false;
                Transition::LaunchFailed
            }
            RunEvent::ProcessExited { code } => {
                if !self.phase.is_active() {
                    return Transition::Ignored;
                }
                if std::mem::take(&mut self.suppress_next_exit_notification) {
                    return Transition::Suppressed { code };
                }
                self.exit(code, now)
            }
            RunEvent::StopRequested => match self.phase {
                Phase::Starting => {
                    self.stop_pending = true;
                    Transition::StopDeferred
                }
                Phase::Running => {
                    self.phase = Phase::Stopping;
                    Transition::Stopping
                }
                Phase::Stopping => Transition::None,
                _ => Transition::Ignored,
            },
            RunEvent::TrackedPidDiscarded => {
                if !self.phase.is_live() {
                    return Transition::Ignored;
                }
                self.tracked_pid = None;
                Transition::None
            }
            RunEvent::TrackedPidResolved { pid } => {
                if !self.phase.is_live() || self.tracked_pid.is_some() {
                    return Transition::Ignored;
                }
                self.tracked_pid = Some(pid);
                Transition::None
            }
            RunEvent::TrackedPidGone { pid } => {
                if !self.phase.is_live() || self.tracked_pid != Some(pid) {
                    return Transition::Ignored;
                }
                self.exit(None, now)
            }
            RunEvent::PidResolutionStalled => {
                if !self.phase.is_live() {
                    return Transition::Ignored;
                }
                self.pid_resolution_stalled = true;
                Transition::None
            }
        }
    }

    fn exit(&mut self, code: Option<i32>, now: DateTime<Utc>) -> Transition {
        let start_time = *self.start_time.get_or_insert(now);
        self.phase = Phase::Exited;
        self.stop_pending = false;
        self.stop_time = Some(now);
        self.tracked_pid = None;
        self.handle = None;

        Transition::Exited(SessionRecord {
            start_time,
            stop_time: now,
            exit_code: code,
        })
    }

    /// What a stop request should act on.
    ///
    /// Indirect runs with a resolved PID go through the PID path; otherwise
    /// the direct handle is preferred, then any known PID.
    pub fn stop_target(&self, uses_indirect_pid: bool) -> Option<StopTarget> {
        if !self.phase.is_live() {
            return None;
        }
        if uses_indirect_pid && let Some(pid) = self.tracked_pid {
            return Some(StopTarget::Pid(pid));
        }
        if let Some(handle) = &self.handle {
            return Some(StopTarget::Handle(handle.clone()));
        }
        self.tracked_pid.map(StopTarget::Pid)
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            phase: self.phase,
            pid: self.pid,
            tracked_pid: self.tracked_pid,
            start_time: self.start_time,
            stop_time: self.stop_time,
            pid_resolution_stalled: self.pid_resolution_stalled,
        }
    }
}
