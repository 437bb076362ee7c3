use async_trait::async_trait;

use crate::descriptor::{LaunchContext, LaunchDescriptor};
use crate::error::{Error, Result};
use crate::plan::{PlanOutcome, SpawnPlan};
use crate::variant::LauncherVariant;

/// Runs a ROM image through an emulator.
#[derive(Debug, Default)]
pub struct RomVariant;

#[async_trait]
impl LauncherVariant for RomVariant {
    fn name(&self) -> &'static str {
        "rom"
    }

    fn build_spawn_plan(
        &self,
        descriptor: &LaunchDescriptor,
        ctx: &LaunchContext,
    ) -> Result<PlanOutcome> {
        let emulator = descriptor.options.emulator_exe.as_deref().ok_or_else(|| {
            Error::InvalidDescriptor(format!("app '{}' has no `emulator_exe`", descriptor.id))
        })?;
        let rom = descriptor
            .options
            .rom
            .as_deref()
            .map(|rom| descriptor.resolve_path(rom, ctx));

        let plan = SpawnPlan::new(descriptor.resolve_exe(emulator, ctx))
            .args(descriptor.expanded_args(ctx))
            .args(rom)
            .current_dir(descriptor.working_directory(ctx))
            .envs(&descriptor.env)
            .detached();

        Ok(PlanOutcome::Ready(plan))
    }
}
