//! PowerShell `Start-Process` based launchers. Windows only.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::descriptor::{LaunchContext, LaunchDescriptor};
use crate::error::{Error, Result};
use crate::plan::{PlanOutcome, SpawnPlan, quote_powershell};
use crate::variant::LauncherVariant;

fn powershell(command: String, descriptor: &LaunchDescriptor) -> PlanOutcome {
    PlanOutcome::Ready(
        SpawnPlan::new("powershell.exe")
            .args(["-NoProfile", "-NonInteractive", "-Command"])
            .arg(command)
            .envs(&descriptor.env),
    )
}

/// `Start-Process -FilePath <file> -WorkingDirectory <dir> [-ArgumentList ...]`
fn start_process(file: &Path, wdir: Option<&Path>, args: &[String]) -> String {
    let mut command = format!(
        "Start-Process -FilePath {}",
        quote_powershell(&file.to_string_lossy())
    );
    if let Some(wdir) = wdir {
        command.push_str(" -WorkingDirectory ");
        command.push_str(&quote_powershell(&wdir.to_string_lossy()));
    }
    if !args.is_empty() {
        let list = args
            .iter()
            .map(|arg| quote_powershell(arg))
            .collect::<Vec<_>>()
            .join(",");
        command.push_str(" -ArgumentList ");
        command.push_str(&list);
    }
    command
}

fn file_and_wdir(
    descriptor: &LaunchDescriptor,
    file: &str,
    ctx: &LaunchContext,
) -> (PathBuf, Option<PathBuf>) {
    let file = descriptor.resolve_exe(file, ctx);
    let wdir = descriptor.cwd_for(&file, ctx);
    (file, wdir)
}

/// Opens a `.lnk` shortcut.
#[derive(Debug, Default)]
pub struct LinkVariant;

#[async_trait]
impl LauncherVariant for LinkVariant {
    fn name(&self) -> &'static str {
        "lnk@powershell"
    }

    fn build_spawn_plan(
        &self,
        descriptor: &LaunchDescriptor,
        ctx: &LaunchContext,
    ) -> Result<PlanOutcome> {
        if !ctx.platform.is_windows() {
            return Ok(PlanOutcome::Unsupported);
        }
        let target = descriptor.options.target.as_deref().ok_or_else(|| {
            Error::InvalidDescriptor(format!("link app '{}' has no `target`", descriptor.id))
        })?;
        let (target, wdir) = file_and_wdir(descriptor, target, ctx);
        let command = start_process(&target, wdir.as_deref(), &descriptor.expanded_args(ctx));
        Ok(powershell(command, descriptor))
    }
}

/// Starts an executable through `Start-Process`.
#[derive(Debug, Default)]
pub struct StartProcessVariant;

#[async_trait]
impl LauncherVariant for StartProcessVariant {
    fn name(&self) -> &'static str {
        "powershell-start-process"
    }

    fn build_spawn_plan(
        &self,
        descriptor: &LaunchDescriptor,
        ctx: &LaunchContext,
    ) -> Result<PlanOutcome> {
        if !ctx.platform.is_windows() {
            return Ok(PlanOutcome::Unsupported);
        }
        let (exe, wdir) = file_and_wdir(descriptor, descriptor.require_exe()?, ctx);
        let command = start_process(&exe, wdir.as_deref(), &descriptor.expanded_args(ctx));
        Ok(powershell(command, descriptor))
    }
}

/// Starts a packaged (Store) app by its AppX id.
#[derive(Debug, Default)]
pub struct AppxVariant;

#[async_trait]
impl LauncherVariant for AppxVariant {
    fn name(&self) -> &'static str {
        "appx@powershell"
    }

    fn build_spawn_plan(
        &self,
        descriptor: &LaunchDescriptor,
        ctx: &LaunchContext,
    ) -> Result<PlanOutcome> {
        if !ctx.platform.is_windows() {
            return Ok(PlanOutcome::Unsupported);
        }
        let app_id = descriptor.options.app_id.as_deref().ok_or_else(|| {
            Error::InvalidDescriptor(format!("appx app '{}' has no `app_id`", descriptor.id))
        })?;
        let target = format!("Shell:AppsFolder\\{}", descriptor.expand(app_id, ctx));
        let mut command = format!("Start-Process {}", quote_powershell(&target));
        let args = descriptor.expanded_args(ctx);
        if !args.is_empty() {
            let list = args
                .iter()
                .map(|arg| quote_powershell(arg))
                .collect::<Vec<_>>()
                .join(",");
            command.push_str(" -ArgumentList ");
            command.push_str(&list);
        }
        Ok(powershell(command, descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::test_support::{linux, windows};
    use pretty_assertions::assert_eq;

    #[test]
    fn unsupported_off_windows() {
        let mut descriptor = LaunchDescriptor::new("x", "C:\\x.exe");
        descriptor.options.target = Some("C:\\x.lnk".into());
        descriptor.options.app_id = Some("Microsoft.App!App".into());

        for variant in [
            &LinkVariant as &dyn LauncherVariant,
            &StartProcessVariant,
            &AppxVariant,
        ] {
            assert_eq!(
                variant.build_spawn_plan(&descriptor, &linux()).unwrap(),
                PlanOutcome::Unsupported,
                "{}",
                variant.name()
            );
        }
    }

    #[test]
    fn start_process_quotes_every_argument() {
        let mut descriptor = LaunchDescriptor::new("game", "C:\\Games\\It's\\game.exe");
        descriptor.directory = Some("C:\\Games".into());
        descriptor.args = vec!["-w".into(), "two words".into()];

        let PlanOutcome::Ready(plan) = StartProcessVariant
            .build_spawn_plan(&descriptor, &windows())
            .unwrap()
        else {
            panic!("expected a plan");
        };
        assert_eq!(plan.executable, PathBuf::from("powershell.exe"));
        assert_eq!(
            plan.args,
            vec![
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                "Start-Process -FilePath 'C:\\Games\\It''s\\game.exe' -WorkingDirectory 'C:\\Games' -ArgumentList '-w','two words'",
            ]
        );
    }

    #[test]
    fn appx_targets_the_apps_folder() {
        let mut descriptor = LaunchDescriptor::new("calc", "unused");
        descriptor.options.app_id = Some("Microsoft.WindowsCalculator_8wekyb3d8bbwe!App".into());

        let PlanOutcome::Ready(plan) = AppxVariant.build_spawn_plan(&descriptor, &windows()).unwrap()
        else {
            panic!("expected a plan");
        };
        assert_eq!(
            plan.args.last().map(String::as_str),
            Some("Start-Process 'Shell:AppsFolder\\Microsoft.WindowsCalculator_8wekyb3d8bbwe!App'")
        );
    }
}
