use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::platform::Platform;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the launch supervisor.
///
/// Every variant carries rendered strings rather than source errors so a
/// single completion result can be cloned to every waiter of a run.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The OS refused or failed to create the process.
    #[error("failed to launch {app}: {reason}")]
    #[diagnostic(code(launcher_kit::launch_failure))]
    LaunchFailure { app: String, reason: String },

    /// The selected launcher variant cannot run on this OS.
    #[error("launcher variant '{variant}' is not supported on {platform}")]
    #[diagnostic(
        code(launcher_kit::unsupported_on_platform),
        help("select another `type`/`use` for this app")
    )]
    UnsupportedOnPlatform { variant: String, platform: Platform },

    #[error("invalid app descriptor: {0}")]
    #[diagnostic(code(launcher_kit::invalid_descriptor))]
    InvalidDescriptor(String),

    #[error("no app registered with id '{0}'")]
    AppNotFound(String),

    /// Listing or probing the OS process table failed structurally.
    #[error("process table unavailable: {0}")]
    ProcessTableUnavailable(String),

    #[error("no process matching {target} appeared after {waited:?}")]
    PidResolutionStall { target: String, waited: Duration },

    /// A kill command could not be delivered, usually because the target is gone.
    #[error("failed to signal pid {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },

    #[error("supervisor for {0} stopped without reporting an exit")]
    SupervisorGone(String),

    #[error("failed to load config {}: {reason}", .path.display())]
    #[diagnostic(code(launcher_kit::config))]
    Config { path: PathBuf, reason: String },
}
