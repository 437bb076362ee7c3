//! Launch and supervise desktop applications, games and documents.
//!
//! An app is described by a [`LaunchDescriptor`], turned into a
//! [`SpawnPlan`] by the [`LauncherVariant`] its `type`/`use` selects, and run
//! by an [`AppLauncher`] that tracks the process (or, for wrapper-based
//! launchers, the real process behind the wrapper) until it exits.

pub mod config;
pub mod descriptor;
mod error;
pub mod kit;
pub mod log;
pub mod plan;
pub mod platform;
pub mod process_table;
pub mod registry;
pub mod resolver;
pub mod run_state;
pub mod session;
pub mod spawn;
pub mod supervisor;
pub mod termination;
pub mod variant;
pub mod variants;

pub use config::{AppConfig, KitConfig, SupervisorSettings};
pub use descriptor::{LaunchContext, LaunchDescriptor};
pub use error::{Error, Result};
pub use kit::LauncherKit;
pub use plan::{PlanOutcome, SpawnPlan};
pub use platform::Platform;
pub use registry::Registry;
pub use run_state::{Phase, RunSnapshot};
pub use supervisor::{AppLauncher, Completion, LaunchServices, RunOutcome};
pub use variant::LauncherVariant;
