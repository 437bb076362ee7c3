//! Discovery of the real process behind a disposable wrapper.
//!
//! Some launchers (store-front clients) hand the request to a long-lived
//! service and exit, or keep a wrapper around the real game. The resolver
//! polls the process table for the wrapper by command line, then for its
//! child, and finally watches that child until it disappears.

use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorSettings;
use crate::error::{Error, Result};
use crate::process_table::{ProcessEntry, ProcessTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverEvent {
    /// The real target process was found.
    Resolved { pid: u32 },
    /// The resolved process is no longer in the process table.
    Gone { pid: u32 },
    /// Resolution hit the configured cap.
    Stalled { waited: Duration },
}

#[derive(Clone)]
pub struct PidResolver {
    table: Arc<dyn ProcessTable>,
    poll_interval: Duration,
    liveness_interval: Duration,
    timeout: Option<Duration>,
}

impl PidResolver {
    pub fn new(table: Arc<dyn ProcessTable>, settings: &SupervisorSettings) -> Self {
        Self {
            table,
            poll_interval: settings.pid_poll_interval(),
            liveness_interval: settings.liveness_interval(),
            timeout: settings.pid_resolution_timeout(),
        }
    }

    /// Sleep and check until `check` yields a value or the cap is hit.
    async fn poll<T, F, Fut>(&self, target: &str, mut check: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let started = Instant::now();
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if let Some(found) = check().await? {
                return Ok(found);
            }
            let waited = started.elapsed();
            if let Some(timeout) = self.timeout
                && waited >= timeout
            {
                return Err(Error::PidResolutionStall {
                    target: target.to_string(),
                    waited,
                });
            }
        }
    }

    /// Wait for a process whose command line matches `pattern`.
    pub async fn find_wrapper(&self, pattern: &Regex) -> Result<ProcessEntry> {
        let table = &self.table;
        self.poll(&format!("/{}/", pattern), || async move {
            let entries = table.list().await?;
            Ok::<_, Error>(
                entries
                    .into_iter()
                    .find(|entry| pattern.is_match(&entry.command)),
            )
        })
        .await
    }

    /// Wait for a child process of `ppid`.
    pub async fn find_child(&self, ppid: u32) -> Result<ProcessEntry> {
        let table = &self.table;
        self.poll(&format!("a child of pid {}", ppid), || async move {
            let entries = table.list().await?;
            Ok::<_, Error>(entries.into_iter().find(|entry| entry.ppid == ppid))
        })
        .await
    }

    /// Wait until `pid` is no longer alive. Unbounded.
    pub async fn wait_for_exit(&self, pid: u32) -> Result<()> {
        loop {
            tokio::time::sleep(self.liveness_interval).await;
            if !self.table.is_alive(pid).await? {
                return Ok(());
            }
        }
    }

    async fn resolve_and_watch(
        &self,
        app: &str,
        pattern: &Regex,
        events: &mpsc::UnboundedSender<ResolverEvent>,
    ) -> Result<()> {
        let wrapper = self.find_wrapper(pattern).await?;
        debug!(app = %app, "Found wrapper pid {}: {}", wrapper.pid, wrapper.command);

        let target = self.find_child(wrapper.pid).await?;
        info!(app = %app, "Found real pid {}: {}", target.pid, target.command);
        let _ = events.send(ResolverEvent::Resolved { pid: target.pid });

        self.wait_for_exit(target.pid).await?;
        debug!(app = %app, "Pid {} is gone, exit detected", target.pid);
        let _ = events.send(ResolverEvent::Gone { pid: target.pid });
        Ok(())
    }

    /// Resolve the real PID behind the wrapper matching `pattern` and report
    /// it on `events`, until done or `cancel` fires.
    ///
    /// Process table failures abandon resolution; the run stays as it is.
    pub async fn track(
        self,
        app: String,
        pattern: Regex,
        events: mpsc::UnboundedSender<ResolverEvent>,
        cancel: CancellationToken,
    ) {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(app = %app, "Pid resolution cancelled");
            }
            result = self.resolve_and_watch(&app, &pattern, &events) => match result {
                Ok(()) => {}
                Err(Error::PidResolutionStall { target, waited }) => {
                    warn!(app = %app, "No process matching {} after {:?}", target, waited);
                    let _ = events.send(ResolverEvent::Stalled { waited });
                }
                Err(e) => {
                    error!(app = %app, "Abandoning pid resolution: {}", e);
                }
            }
        }
    }
}
