//! Per-app launch supervision.
//!
//! Each launch gets a driver task that owns the run's [`RunState`]. The
//! driver consumes spawner notifications, resolver reports and stop
//! commands in order, publishes a [`RunSnapshot`] after every transition,
//! and resolves the run's [`Completion`] exactly once.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorSettings;
use crate::descriptor::{LaunchContext, LaunchDescriptor};
use crate::error::{Error, Result};
use crate::plan::PlanOutcome;
use crate::process_table::{ProcessTable, PsProcessTable};
use crate::resolver::{PidResolver, ResolverEvent};
use crate::run_state::{RunEvent, RunSnapshot, RunState, SessionRecord, Transition};
use crate::session::SessionRecorder;
use crate::spawn::{OsSpawner, ProcessEvent, Spawner};
use crate::termination::{KillCommand, SignalKill, StopTarget, Terminator};
use crate::variant::LauncherVariant;

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// OS-facing collaborators shared by every launcher.
#[derive(Clone)]
pub struct LaunchServices {
    pub spawner: Arc<dyn Spawner>,
    pub process_table: Arc<dyn ProcessTable>,
    pub kill: Arc<dyn KillCommand>,
    pub sessions: Arc<dyn SessionRecorder>,
    pub settings: SupervisorSettings,
    pub context: LaunchContext,
}

impl LaunchServices {
    /// Real processes, `ps` and signals.
    pub fn system(settings: SupervisorSettings, sessions: Arc<dyn SessionRecorder>) -> Self {
        Self {
            spawner: Arc::new(OsSpawner),
            process_table: Arc::new(PsProcessTable),
            kill: Arc::new(SignalKill),
            sessions,
            settings,
            context: LaunchContext::detect(),
        }
    }
}

/// Final state of a run that started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub run_time: Duration,
}

impl From<&SessionRecord> for RunOutcome {
    fn from(record: &SessionRecord) -> Self {
        Self {
            exit_code: record.exit_code,
            start_time: record.start_time,
            stop_time: record.stop_time,
            run_time: record.run_time(),
        }
    }
}

/// Single-resolution completion signal of one run.
///
/// Clones observe the same result. Resolves to an error when the run never
/// started (`LaunchFailure`, `UnsupportedOnPlatform`) and to a
/// [`RunOutcome`] carrying the exit code otherwise.
#[derive(Clone)]
pub struct Completion {
    run_id: u64,
    future: Shared<BoxFuture<'static, Result<RunOutcome>>>,
}

impl Completion {
    fn pending(run_id: u64, app: String, rx: oneshot::Receiver<Result<RunOutcome>>) -> Self {
        let future = async move { rx.await.unwrap_or_else(|_| Err(Error::SupervisorGone(app))) };
        Self {
            run_id,
            future: future.boxed().shared(),
        }
    }

    fn rejected(run_id: u64, error: Error) -> Self {
        Self {
            run_id,
            future: futures::future::ready(Err(error)).boxed().shared(),
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn same_run(&self, other: &Completion) -> bool {
        self.run_id == other.run_id
    }

    /// The result, if the run is already over.
    pub fn peek(&self) -> Option<Result<RunOutcome>> {
        self.future.peek().cloned()
    }

    pub async fn wait(self) -> Result<RunOutcome> {
        self.future.await
    }
}

impl IntoFuture for Completion {
    type Output = Result<RunOutcome>;
    type IntoFuture = Shared<BoxFuture<'static, Result<RunOutcome>>>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("run_id", &self.run_id)
            .field("result", &self.peek())
            .finish()
    }
}

enum Command {
    Stop(oneshot::Sender<Option<StopTarget>>),
}

struct ActiveRun {
    id: u64,
    completion: Completion,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<RunSnapshot>,
}

struct Inner {
    descriptor: LaunchDescriptor,
    variant: Arc<dyn LauncherVariant>,
    services: LaunchServices,
    active: Mutex<Option<Arc<ActiveRun>>>,
}

/// Supervises launches of one app. At most one run is active at a time.
#[derive(Clone)]
pub struct AppLauncher {
    inner: Arc<Inner>,
}

impl fmt::Debug for AppLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppLauncher")
            .field("id", &self.inner.descriptor.id)
            .field("variant", &self.inner.variant.name())
            .finish()
    }
}

impl AppLauncher {
    pub fn new(
        descriptor: LaunchDescriptor,
        variant: Arc<dyn LauncherVariant>,
        services: LaunchServices,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                descriptor,
                variant,
                services,
                active: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.inner.descriptor.name
    }

    pub fn descriptor(&self) -> &LaunchDescriptor {
        &self.inner.descriptor
    }

    pub fn variant(&self) -> &Arc<dyn LauncherVariant> {
        &self.inner.variant
    }

    /// The spawn plan a launch would use right now.
    pub fn plan(&self) -> Result<PlanOutcome> {
        self.inner
            .variant
            .build_spawn_plan(&self.inner.descriptor, &self.inner.services.context)
    }

    pub async fn is_running(&self) -> bool {
        self.inner.active.lock().await.is_some()
    }

    pub async fn snapshot(&self) -> RunSnapshot {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .map(|run| run.status.borrow().clone())
            .unwrap_or_default()
    }

    /// Start the app, or join the run already in progress.
    pub async fn launch(&self) -> Completion {
        let mut active = self.inner.active.lock().await;
        if let Some(run) = active.as_ref() {
            debug!(app = %self.id(), "Already running, joining run {}", run.id);
            return run.completion.clone();
        }

        let inner = &self.inner;
        let run_id = NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed);

        let plan = match self.plan() {
            Ok(PlanOutcome::Ready(plan)) => plan,
            Ok(PlanOutcome::Unsupported) => {
                let error = Error::UnsupportedOnPlatform {
                    variant: inner.variant.name().to_string(),
                    platform: inner.services.context.platform,
                };
                warn!(app = %self.id(), "{}", error);
                return Completion::rejected(run_id, error);
            }
            Err(error) => {
                error!(app = %self.id(), "Launch error: {}", error);
                return Completion::rejected(run_id, error);
            }
        };

        let wrapper_pattern = if inner.variant.uses_indirect_pid(&inner.descriptor) {
            let pattern = inner.variant.wrapper_pattern(&inner.descriptor);
            if pattern.is_none() {
                warn!(
                    app = %self.id(),
                    "Indirect launch without a wrapper pattern, tracking the spawned process"
                );
            }
            pattern
        } else {
            None
        };
        let indirect = wrapper_pattern.is_some();

        let mut state = RunState::new(indirect);
        state.on_event(RunEvent::LaunchRequested, Utc::now());

        let (done_tx, done_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(state.snapshot());

        let completion = Completion::pending(run_id, self.id().to_string(), done_rx);
        *active = Some(Arc::new(ActiveRun {
            id: run_id,
            completion: completion.clone(),
            commands: commands_tx,
            status: status_rx,
        }));

        let driver = Driver {
            inner: self.inner.clone(),
            run_id,
            state,
            indirect,
            wrapper_pattern,
            status: status_tx,
            resolver_cancel: CancellationToken::new(),
            deferred_stops: Vec::new(),
        };
        tokio::spawn(driver.run(events_rx, commands_rx, done_tx));

        if inner.variant.uses_open_action(&inner.descriptor) {
            debug!(app = %self.id(), "Handing {} to the OS default handler", plan.display_command());
        }
        inner.services.spawner.spawn(self.id(), &plan, events_tx);

        completion
    }

    /// Stop the active run with escalating force. A no-op when nothing runs.
    ///
    /// A run that is still starting is stopped as soon as the OS confirms
    /// the process.
    ///
    /// Returns once the stop protocol is done; the run itself ends when its
    /// exit is observed, which the completion signal reports.
    pub async fn stop(&self) {
        let Some(run) = self.inner.active.lock().await.clone() else {
            return;
        };

        let (tx, rx) = oneshot::channel();
        if run.commands.send(Command::Stop(tx)).is_err() {
            return;
        }
        let Ok(Some(target)) = rx.await else {
            return;
        };

        info!(app = %self.id(), "Stopping {}", self.name());
        Terminator::new(
            self.inner.services.kill.clone(),
            &self.inner.services.settings,
        )
        .stop(target, run.status.clone())
        .await;
    }
}

/// Owns one run's state until it exits.
struct Driver {
    inner: Arc<Inner>,
    run_id: u64,
    state: RunState,
    indirect: bool,
    wrapper_pattern: Option<Regex>,
    status: watch::Sender<RunSnapshot>,
    resolver_cancel: CancellationToken,
    /// Stop requests waiting for the spawn to be confirmed.
    deferred_stops: Vec<oneshot::Sender<Option<StopTarget>>>,
}

impl Driver {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ProcessEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        done: oneshot::Sender<Result<RunOutcome>>,
    ) {
        let (resolver_tx, mut resolver_rx) = mpsc::unbounded_channel();
        let mut resolver_tx = Some(resolver_tx);
        let mut events_open = true;

        let result = loop {
            // Process events first, so a queued confirmation is seen before a stop
            tokio::select! {
                biased;
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        if let Some(result) = self.on_process_event(event, &mut resolver_tx).await {
                            break result;
                        }
                    }
                    None => {
                        events_open = false;
                        // Indirect runs end through the resolver, not the wrapper
                        if !self.indirect {
                            break Err(Error::SupervisorGone(self.inner.descriptor.id.clone()));
                        }
                    }
                },
                Some(event) = resolver_rx.recv() => {
                    if let Some(result) = self.on_resolver_event(event) {
                        break result;
                    }
                }
                Some(command) = commands.recv() => self.on_command(command),
                else => break Err(Error::SupervisorGone(self.inner.descriptor.id.clone())),
            }
        };

        self.finish(result, done).await;
    }

    fn apply(&mut self, event: RunEvent) -> Transition {
        let transition = self.state.on_event(event, Utc::now());
        self.status.send_replace(self.state.snapshot());
        transition
    }

    async fn on_process_event(
        &mut self,
        event: ProcessEvent,
        resolver_tx: &mut Option<mpsc::UnboundedSender<ResolverEvent>>,
    ) -> Option<Result<RunOutcome>> {
        let inner = self.inner.clone();
        let app = inner.descriptor.id.as_str();

        match event {
            ProcessEvent::Spawned { pid, handle } => {
                let Transition::Started { pid } = self.apply(RunEvent::SpawnConfirmed { pid, handle })
                else {
                    return None;
                };
                info!(app = %app, pid, "Starting {}...", inner.descriptor.name);
                inner.variant.on_started(&inner.descriptor, pid).await;

                if let (Some(pattern), Some(tx)) = (self.wrapper_pattern.take(), resolver_tx.take()) {
                    self.apply(RunEvent::TrackedPidDiscarded);
                    let resolver = PidResolver::new(
                        inner.services.process_table.clone(),
                        &inner.services.settings,
                    );
                    tokio::spawn(resolver.track(
                        app.to_string(),
                        pattern,
                        tx,
                        self.resolver_cancel.clone(),
                    ));
                }

                self.release_deferred_stops();
                None
            }
            ProcessEvent::SpawnFailed { reason } => match self.apply(RunEvent::SpawnFailed) {
                Transition::LaunchFailed => {
                    error!(app = %app, "Launch error: {}", reason);
                    Some(Err(Error::LaunchFailure {
                        app: app.to_string(),
                        reason,
                    }))
                }
                _ => None,
            },
            ProcessEvent::Output { stream, chunk } => {
                debug!(target: "launcher_kit::app", app = %app, %stream, "{}", chunk);
                None
            }
            ProcessEvent::Error { reason } => {
                error!(app = %app, "Child process error: {}", reason);
                None
            }
            ProcessEvent::Exited { code } => match self.apply(RunEvent::ProcessExited { code }) {
                Transition::Suppressed { code } => {
                    info!(
                        app = %app,
                        "{}'s process exited with code {}",
                        inner.descriptor.name,
                        format_code(code)
                    );
                    None
                }
                Transition::Exited(record) => Some(Ok(self.completed(&record))),
                _ => {
                    debug!(app = %app, "Ignoring exit notification");
                    None
                }
            },
        }
    }

    fn on_resolver_event(&mut self, event: ResolverEvent) -> Option<Result<RunOutcome>> {
        match event {
            ResolverEvent::Resolved { pid } => {
                self.apply(RunEvent::TrackedPidResolved { pid });
                None
            }
            ResolverEvent::Gone { pid } => match self.apply(RunEvent::TrackedPidGone { pid }) {
                Transition::Exited(record) => Some(Ok(self.completed(&record))),
                _ => None,
            },
            ResolverEvent::Stalled { .. } => {
                self.apply(RunEvent::PidResolutionStalled);
                None
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Stop(reply) => {
                let target = match self.apply(RunEvent::StopRequested) {
                    Transition::Stopping => self.state.stop_target(self.indirect),
                    Transition::StopDeferred => {
                        debug!(
                            app = %self.inner.descriptor.id,
                            "Stop requested before the process started, waiting for it"
                        );
                        self.deferred_stops.push(reply);
                        return;
                    }
                    _ => None,
                };
                let _ = reply.send(target);
            }
        }
    }

    /// Hand the stop target to the first deferred request; later ones find
    /// the run already stopping.
    fn release_deferred_stops(&mut self) {
        let mut target = self.state.stop_target(self.indirect);
        for reply in self.deferred_stops.drain(..) {
            let _ = reply.send(target.take());
        }
    }

    fn completed(&self, record: &SessionRecord) -> RunOutcome {
        let descriptor = &self.inner.descriptor;
        let outcome = RunOutcome::from(record);
        info!(
            app = %descriptor.id,
            "{} exited with code {}, run time: {:?}",
            descriptor.name,
            format_code(outcome.exit_code),
            outcome.run_time
        );
        self.inner
            .services
            .sessions
            .record_session(&descriptor.id, record);
        outcome
    }

    async fn finish(self, result: Result<RunOutcome>, done: oneshot::Sender<Result<RunOutcome>>) {
        self.resolver_cancel.cancel();

        // Detach before resolving so a waiter can relaunch right away
        {
            let mut active = self.inner.active.lock().await;
            if active.as_ref().is_some_and(|run| run.id == self.run_id) {
                *active = None;
            }
        }

        if let Ok(outcome) = &result {
            self.inner
                .variant
                .on_exited(&self.inner.descriptor, outcome.exit_code)
                .await;
        }

        let _ = done.send(result);
    }
}

fn format_code(code: Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |code| code.to_string())
}
