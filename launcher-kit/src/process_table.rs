//! Read-only access to the OS process table.

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub ppid: u32,
    /// Full command line
    pub command: String,
}

/// Lists processes and checks PID liveness.
///
/// Results race with the real world: a listed PID may be gone by the time
/// it is acted upon.
#[async_trait]
pub trait ProcessTable: Send + Sync {
    async fn list(&self) -> Result<Vec<ProcessEntry>>;

    async fn is_alive(&self, pid: u32) -> Result<bool> {
        Ok(self.list().await?.iter().any(|entry| entry.pid == pid))
    }
}

/// Process table read through `ps` (PowerShell CIM on Windows).
#[derive(Debug, Default, Clone)]
pub struct PsProcessTable;

impl PsProcessTable {
    fn list_command() -> Command {
        if cfg!(windows) {
            let mut command = Command::new("powershell.exe");
            command.args([
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                "Get-CimInstance Win32_Process | ForEach-Object { \"$($_.ProcessId) $($_.ParentProcessId) $($_.CommandLine)\" }",
            ]);
            command
        } else {
            let mut command = Command::new("ps");
            command.args(["-e", "-o", "pid=", "-o", "ppid=", "-o", "args="]);
            command
        }
    }
}

/// Parse `pid ppid command...` rows. Rows that don't parse are skipped.
pub fn parse_table(output: &str) -> Vec<ProcessEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.trim_start().splitn(2, char::is_whitespace);
            let pid = fields.next()?.parse().ok()?;
            let rest = fields.next()?.trim_start();
            let mut fields = rest.splitn(2, char::is_whitespace);
            let ppid = fields.next()?.parse().ok()?;
            let command = fields.next().unwrap_or("").trim().to_string();
            Some(ProcessEntry { pid, ppid, command })
        })
        .collect()
}

#[async_trait]
impl ProcessTable for PsProcessTable {
    async fn list(&self) -> Result<Vec<ProcessEntry>> {
        let output = Self::list_command()
            .output()
            .await
            .map_err(|e| Error::ProcessTableUnavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(Error::ProcessTableUnavailable(format!(
                "process listing exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_table(&String::from_utf8_lossy(&output.stdout)))
    }

    #[cfg(unix)]
    async fn is_alive(&self, pid: u32) -> Result<bool> {
        use nix::errno::Errno;
        use nix::sys::signal;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return Ok(false);
        };
        match signal::kill(Pid::from_raw(raw), None) {
            Ok(()) => Ok(true),
            // Exists, but owned by someone else
            Err(Errno::EPERM) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(Error::ProcessTableUnavailable(e.to_string())),
        }
    }
}
