use async_trait::async_trait;

use crate::descriptor::{LaunchContext, LaunchDescriptor};
use crate::error::Result;
use crate::plan::{PlanOutcome, SpawnPlan};
use crate::variant::LauncherVariant;

/// Runs the configured executable directly.
#[derive(Debug, Default)]
pub struct NativeVariant;

/// `exe args...` in the app's directory, falling back to the executable's own.
pub(crate) fn direct_plan(descriptor: &LaunchDescriptor, ctx: &LaunchContext) -> Result<SpawnPlan> {
    let exe = descriptor.resolve_exe(descriptor.require_exe()?, ctx);
    let cwd = descriptor.cwd_for(&exe, ctx);

    Ok(SpawnPlan::new(exe)
        .args(descriptor.expanded_args(ctx))
        .current_dir(cwd)
        .envs(&descriptor.env)
        .detached())
}

#[async_trait]
impl LauncherVariant for NativeVariant {
    fn name(&self) -> &'static str {
        "native"
    }

    fn build_spawn_plan(
        &self,
        descriptor: &LaunchDescriptor,
        ctx: &LaunchContext,
    ) -> Result<PlanOutcome> {
        direct_plan(descriptor, ctx).map(PlanOutcome::Ready)
    }
}
