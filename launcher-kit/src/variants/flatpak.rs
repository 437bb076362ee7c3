use async_trait::async_trait;

use crate::descriptor::{LaunchContext, LaunchDescriptor};
use crate::error::{Error, Result};
use crate::plan::{PlanOutcome, SpawnPlan};
use crate::variant::LauncherVariant;

#[derive(Debug, Default)]
pub struct FlatpakVariant;

#[async_trait]
impl LauncherVariant for FlatpakVariant {
    fn name(&self) -> &'static str {
        "flatpak"
    }

    fn build_spawn_plan(
        &self,
        descriptor: &LaunchDescriptor,
        ctx: &LaunchContext,
    ) -> Result<PlanOutcome> {
        let app_id = descriptor.options.app_id.as_deref().ok_or_else(|| {
            Error::InvalidDescriptor(format!("flatpak app '{}' has no `app_id`", descriptor.id))
        })?;

        let plan = SpawnPlan::new("flatpak")
            .args(["run", app_id])
            .args(descriptor.expanded_args(ctx))
            .envs(&descriptor.env)
            .detached();

        Ok(PlanOutcome::Ready(plan))
    }
}
