use async_trait::async_trait;
use tracing::warn;

use crate::descriptor::{LaunchContext, LaunchDescriptor};
use crate::error::{Error, Result};
use crate::plan::{PlanOutcome, SpawnPlan, quote_cmd};
use crate::platform::Platform;
use crate::variant::LauncherVariant;

/// Hands the target to the OS default file-association handler.
#[derive(Debug, Default)]
pub struct OpenVariant;

pub(crate) fn open_plan(target: &str, args: &[String], ctx: &LaunchContext) -> SpawnPlan {
    let plan = match ctx.platform {
        Platform::MacOs => {
            let plan = SpawnPlan::new("open").arg(target);
            if args.is_empty() {
                plan
            } else {
                plan.arg("--args").args(args.iter().cloned())
            }
        }
        Platform::Windows => SpawnPlan::new("cmd.exe")
            .args(["/c", "start", "\"\"", quote_cmd(target).as_str()])
            .args(args.iter().map(|arg| quote_cmd(arg)))
            .verbatim(),
        Platform::Linux | Platform::Other => {
            if !args.is_empty() {
                warn!(
                    "xdg-open cannot forward arguments, not passing {:?} to {}",
                    args, target
                );
            }
            SpawnPlan::new("xdg-open").arg(target)
        }
    };

    plan.without_output()
}

pub(crate) fn open_target<'a>(descriptor: &'a LaunchDescriptor) -> Result<&'a str> {
    descriptor
        .options
        .content
        .as_deref()
        .or(descriptor.exe.as_deref())
        .ok_or_else(|| {
            Error::InvalidDescriptor(format!(
                "app '{}' has neither `content` nor `exe` to open",
                descriptor.id
            ))
        })
}

#[async_trait]
impl LauncherVariant for OpenVariant {
    fn name(&self) -> &'static str {
        "open"
    }

    fn build_spawn_plan(
        &self,
        descriptor: &LaunchDescriptor,
        ctx: &LaunchContext,
    ) -> Result<PlanOutcome> {
        let target = descriptor.resolve_path(open_target(descriptor)?, ctx);
        let plan = open_plan(&target, &descriptor.expanded_args(ctx), ctx)
            .current_dir(descriptor.working_directory(ctx))
            .envs(&descriptor.env);
        Ok(PlanOutcome::Ready(plan))
    }

    fn uses_open_action(&self, _descriptor: &LaunchDescriptor) -> bool {
        true
    }
}
