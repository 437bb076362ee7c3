use async_trait::async_trait;
use regex::Regex;
use std::borrow::Cow;
use tokio::process::Command;
use tracing::{error, info};

use crate::descriptor::{LaunchContext, LaunchDescriptor};
use crate::error::{Error, Result};
use crate::plan::{PlanOutcome, SpawnPlan};
use crate::variant::LauncherVariant;
use crate::variants::native::direct_plan;

const STEAM_EXE: &str = "steam";

/// Launches a game through the Steam client.
///
/// The spawned `steam` process only forwards the request to the running
/// client, so the game's PID is found through the `reaper` wrapper Steam
/// starts it under. With `steamless` the executable is run directly.
#[derive(Debug, Default)]
pub struct SteamVariant;

fn app_id(descriptor: &LaunchDescriptor) -> Result<&str> {
    descriptor.options.app_id.as_deref().ok_or_else(|| {
        Error::InvalidDescriptor(format!("steam app '{}' has no `app_id`", descriptor.id))
    })
}

/// `steam://rungameid/<id>`, or `steam://run/<id>//<args>/` when there are arguments.
pub(crate) fn steam_url(app_id: &str, args: &[String]) -> String {
    if args.is_empty() {
        return format!("steam://rungameid/{}", app_id);
    }

    let args = args
        .iter()
        .map(|arg| shell_escape::unix::escape(Cow::Borrowed(arg.as_str())))
        .collect::<Vec<_>>()
        .join(" ");
    format!("steam://run/{}//{}/", app_id, args)
}

#[async_trait]
impl LauncherVariant for SteamVariant {
    fn name(&self) -> &'static str {
        "steam"
    }

    fn build_spawn_plan(
        &self,
        descriptor: &LaunchDescriptor,
        ctx: &LaunchContext,
    ) -> Result<PlanOutcome> {
        if descriptor.options.steamless {
            return direct_plan(descriptor, ctx).map(PlanOutcome::Ready);
        }

        let url = steam_url(app_id(descriptor)?, &descriptor.expanded_args(ctx));
        Ok(PlanOutcome::Ready(
            SpawnPlan::new(STEAM_EXE).arg(url).envs(&descriptor.env),
        ))
    }

    fn uses_indirect_pid(&self, descriptor: &LaunchDescriptor) -> bool {
        !descriptor.options.steamless
    }

    fn wrapper_pattern(&self, descriptor: &LaunchDescriptor) -> Option<Regex> {
        if descriptor.options.steamless {
            return None;
        }
        let app_id = descriptor.options.app_id.as_deref()?;
        Regex::new(&format!(
            r"^\S*/reaper SteamLaunch AppId={} -- (.+)$",
            regex::escape(app_id)
        ))
        .ok()
    }

    async fn on_exited(&self, descriptor: &LaunchDescriptor, _exit_code: Option<i32>) {
        let options = &descriptor.options;
        if options.steamless || options.auto_close_steam == Some(false) {
            return;
        }

        info!("Shutting down steam...");
        match Command::new(STEAM_EXE).arg("-shutdown").status().await {
            Ok(status) if status.success() => {}
            Ok(status) => error!("Steam shutdown exited with {}", status),
            Err(e) => error!("Steam shutdown error: {}", e),
        }
    }
}
