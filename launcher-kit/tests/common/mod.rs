//! Shared fakes for launcher-kit integration tests.

// Each test file compiles separately, so not all helpers are used in each binary
#![allow(dead_code)]

use async_trait::async_trait;
use launcher_kit::descriptor::{LaunchContext, LaunchDescriptor};
use launcher_kit::plan::{PlanOutcome, SpawnPlan};
use launcher_kit::process_table::{ProcessEntry, ProcessTable};
use launcher_kit::session::MetaStore;
use launcher_kit::spawn::{ProcessEvent, ProcessHandle, Spawner};
use launcher_kit::termination::KillCommand;
use launcher_kit::{Error, LaunchServices, LauncherVariant, Platform, Result, SupervisorSettings};
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// ============================================================================
// Spawner
// ============================================================================

/// Records spawn requests; the test drives each spawn's notifications.
#[derive(Default)]
pub struct FakeSpawner {
    spawns: Mutex<Vec<(SpawnPlan, mpsc::UnboundedSender<ProcessEvent>)>>,
}

impl FakeSpawner {
    pub fn count(&self) -> usize {
        self.spawns.lock().unwrap().len()
    }

    pub fn plan(&self, n: usize) -> SpawnPlan {
        self.spawns.lock().unwrap()[n].0.clone()
    }

    pub fn send(&self, n: usize, event: ProcessEvent) {
        let _ = self.spawns.lock().unwrap()[n].1.send(event);
    }

    /// Report spawn `n` as started with `handle`.
    pub fn confirm(&self, n: usize, handle: Arc<FakeHandle>) {
        self.send(
            n,
            ProcessEvent::Spawned {
                pid: handle.pid(),
                handle,
            },
        );
    }

    pub fn exit(&self, n: usize, code: Option<i32>) {
        self.send(n, ProcessEvent::Exited { code });
    }

    /// Drop the notification channel of spawn `n`.
    pub fn close(&self, n: usize) {
        let (tx, _) = mpsc::unbounded_channel();
        self.spawns.lock().unwrap()[n].1 = tx;
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&self, _app: &str, plan: &SpawnPlan, events: mpsc::UnboundedSender<ProcessEvent>) {
        self.spawns.lock().unwrap().push((plan.clone(), events));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleRequest {
    Graceful,
    Forced,
}

#[derive(Debug)]
pub struct FakeHandle {
    pid: u32,
    requests: Mutex<Vec<HandleRequest>>,
}

impl FakeHandle {
    pub fn new(pid: u32) -> Arc<Self> {
        Arc::new(Self {
            pid,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HandleRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessHandle for FakeHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn request_graceful(&self) -> bool {
        self.requests.lock().unwrap().push(HandleRequest::Graceful);
        true
    }

    async fn request_forced(&self) {
        self.requests.lock().unwrap().push(HandleRequest::Forced);
    }
}

// ============================================================================
// Process table and kill
// ============================================================================

/// The n-th `list()` call returns `script[n]`; the last snapshot repeats.
/// Every PID is alive until marked dead.
pub struct FakeTable {
    script: Vec<Vec<ProcessEntry>>,
    calls: Mutex<usize>,
    dead: Mutex<HashSet<u32>>,
}

impl FakeTable {
    pub fn new(script: Vec<Vec<ProcessEntry>>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: Mutex::new(0),
            dead: Mutex::new(HashSet::new()),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::new(vec![vec![]])
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn mark_dead(&self, pid: u32) {
        self.dead.lock().unwrap().insert(pid);
    }
}

#[async_trait]
impl ProcessTable for FakeTable {
    async fn list(&self) -> Result<Vec<ProcessEntry>> {
        let mut calls = self.calls.lock().unwrap();
        let index = (*calls).min(self.script.len() - 1);
        *calls += 1;
        Ok(self.script[index].clone())
    }

    async fn is_alive(&self, pid: u32) -> Result<bool> {
        Ok(!self.dead.lock().unwrap().contains(&pid))
    }
}

pub fn entry(pid: u32, ppid: u32, command: &str) -> ProcessEntry {
    ProcessEntry {
        pid,
        ppid,
        command: command.to_string(),
    }
}

/// Records kill commands. `terminate` takes the PID out of `table` when set.
#[derive(Default)]
pub struct FakeKill {
    pub table: Option<Arc<FakeTable>>,
    calls: Mutex<Vec<(&'static str, u32)>>,
}

impl FakeKill {
    pub fn killing(table: Arc<FakeTable>) -> Arc<Self> {
        Arc::new(Self {
            table: Some(table),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(&'static str, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl KillCommand for FakeKill {
    async fn terminate(&self, pid: u32) -> Result<()> {
        self.calls.lock().unwrap().push(("terminate", pid));
        if let Some(table) = &self.table {
            table.mark_dead(pid);
        }
        Ok(())
    }

    async fn kill(&self, pid: u32) -> Result<()> {
        self.calls.lock().unwrap().push(("kill", pid));
        Err(Error::KillFailed {
            pid,
            reason: "No such process".to_string(),
        })
    }
}

// ============================================================================
// Variant
// ============================================================================

/// Runs `exe args` and counts lifecycle hooks.
#[derive(Debug, Default)]
pub struct CountingVariant {
    pub unsupported: bool,
    pub pattern: Option<Regex>,
    pub(crate) started: AtomicUsize,
    pub(crate) exited: Mutex<Vec<Option<i32>>>,
}

impl CountingVariant {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn exited(&self) -> Vec<Option<i32>> {
        self.exited.lock().unwrap().clone()
    }
}

#[async_trait]
impl LauncherVariant for CountingVariant {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn build_spawn_plan(
        &self,
        descriptor: &LaunchDescriptor,
        _ctx: &LaunchContext,
    ) -> Result<PlanOutcome> {
        if self.unsupported {
            return Ok(PlanOutcome::Unsupported);
        }
        Ok(PlanOutcome::Ready(
            SpawnPlan::new(descriptor.require_exe()?).args(descriptor.args.clone()),
        ))
    }

    fn uses_indirect_pid(&self, _descriptor: &LaunchDescriptor) -> bool {
        self.pattern.is_some()
    }

    fn wrapper_pattern(&self, _descriptor: &LaunchDescriptor) -> Option<Regex> {
        self.pattern.clone()
    }

    async fn on_started(&self, _descriptor: &LaunchDescriptor, _pid: u32) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_exited(&self, _descriptor: &LaunchDescriptor, exit_code: Option<i32>) {
        self.exited.lock().unwrap().push(exit_code);
    }
}

// ============================================================================
// Services
// ============================================================================

pub fn linux() -> LaunchContext {
    LaunchContext {
        home: PathBuf::from("/home/player"),
        platform: Platform::Linux,
        shell: Some("/bin/bash".to_string()),
    }
}

pub struct Harness {
    pub spawner: Arc<FakeSpawner>,
    pub table: Arc<FakeTable>,
    pub kill: Arc<FakeKill>,
    pub meta: Arc<MetaStore>,
    pub services: LaunchServices,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_table(FakeTable::empty())
    }

    pub fn with_table(table: Arc<FakeTable>) -> Self {
        let spawner = Arc::new(FakeSpawner::default());
        let kill = FakeKill::killing(table.clone());
        let meta = Arc::new(MetaStore::new());

        let services = LaunchServices {
            spawner: spawner.clone(),
            process_table: table.clone(),
            kill: kill.clone(),
            sessions: meta.clone(),
            settings: SupervisorSettings::default(),
            context: linux(),
        };

        Self {
            spawner,
            table,
            kill,
            meta,
            services,
        }
    }
}
