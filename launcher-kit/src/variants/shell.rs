use async_trait::async_trait;

use crate::descriptor::{LaunchContext, LaunchDescriptor};
use crate::error::Result;
use crate::plan::{PlanOutcome, SpawnPlan, quote_cmd};
use crate::variant::LauncherVariant;

/// Runs the executable through the user's shell, or `cmd.exe` on Windows.
#[derive(Debug, Default)]
pub struct ShellVariant;

#[async_trait]
impl LauncherVariant for ShellVariant {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn build_spawn_plan(
        &self,
        descriptor: &LaunchDescriptor,
        ctx: &LaunchContext,
    ) -> Result<PlanOutcome> {
        let exe = descriptor.resolve_exe(descriptor.require_exe()?, ctx);
        let cwd = descriptor.cwd_for(&exe, ctx);
        let args = descriptor.expanded_args(ctx);

        let plan = if ctx.platform.is_windows() {
            SpawnPlan::new("cmd.exe")
                .arg("/c")
                .arg(quote_cmd(&exe.to_string_lossy()))
                .args(args.iter().map(|arg| quote_cmd(arg)))
                .verbatim()
        } else {
            let shell = ctx.shell.as_deref().unwrap_or("sh");
            SpawnPlan::new(shell)
                .arg(exe.to_string_lossy())
                .args(args)
        };

        Ok(PlanOutcome::Ready(
            plan.current_dir(cwd).envs(&descriptor.env).detached(),
        ))
    }
}
