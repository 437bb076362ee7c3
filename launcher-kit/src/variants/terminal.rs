use async_trait::async_trait;

use crate::descriptor::{LaunchContext, LaunchDescriptor};
use crate::error::Result;
use crate::plan::{PlanOutcome, SpawnPlan};
use crate::variant::LauncherVariant;

const DEFAULT_TERMINAL: &str = "gnome-terminal";
const DEFAULT_TERMINAL_ARGS: &[&str] = &["--wait", "--"];

/// Runs the executable inside a terminal emulator.
#[derive(Debug, Default)]
pub struct TerminalVariant;

#[async_trait]
impl LauncherVariant for TerminalVariant {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn build_spawn_plan(
        &self,
        descriptor: &LaunchDescriptor,
        ctx: &LaunchContext,
    ) -> Result<PlanOutcome> {
        let options = &descriptor.options;
        let terminal = descriptor.resolve_exe(
            options.terminal_exe.as_deref().unwrap_or(DEFAULT_TERMINAL),
            ctx,
        );
        let terminal_args = match &options.terminal_args {
            Some(args) => args.clone(),
            None => DEFAULT_TERMINAL_ARGS.iter().map(|s| s.to_string()).collect(),
        };
        let exe = descriptor.resolve_exe(descriptor.require_exe()?, ctx);

        let plan = SpawnPlan::new(terminal)
            .args(terminal_args)
            .arg(exe.to_string_lossy())
            .args(descriptor.expanded_args(ctx))
            .current_dir(descriptor.working_directory(ctx))
            .envs(&descriptor.env);

        Ok(PlanOutcome::Ready(plan))
    }
}
