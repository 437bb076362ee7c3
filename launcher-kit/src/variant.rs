use async_trait::async_trait;
use regex::Regex;
use std::fmt;

use crate::descriptor::{LaunchContext, LaunchDescriptor};
use crate::error::Result;
use crate::plan::PlanOutcome;

/// One concrete launch strategy.
///
/// Variants are independent implementations selected by the
/// [`Registry`](crate::registry::Registry); shared behavior lives in free
/// helpers in [`descriptor`](crate::descriptor) and [`plan`](crate::plan).
#[async_trait]
pub trait LauncherVariant: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Turn a descriptor into a spawn command. Pure: nothing is started here.
    fn build_spawn_plan(&self, descriptor: &LaunchDescriptor, ctx: &LaunchContext)
    -> Result<PlanOutcome>;

    /// Whether the spawned process is a disposable wrapper whose real
    /// target must be found through the process table.
    fn uses_indirect_pid(&self, descriptor: &LaunchDescriptor) -> bool {
        descriptor.indirect
    }

    /// Whether the launch is handed to the OS default handler.
    fn uses_open_action(&self, _descriptor: &LaunchDescriptor) -> bool {
        false
    }

    /// Pattern identifying the wrapper process by its command line.
    fn wrapper_pattern(&self, descriptor: &LaunchDescriptor) -> Option<Regex> {
        descriptor.wrapper_pattern.clone()
    }

    async fn on_started(&self, _descriptor: &LaunchDescriptor, _pid: u32) {}

    async fn on_exited(&self, _descriptor: &LaunchDescriptor, _exit_code: Option<i32>) {}
}
