use clap::{Parser, Subcommand};
use launcher_kit::log::{Level, LogFormat, init_tracing};
use launcher_kit::{KitConfig, LauncherKit};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[clap(author, version, about)]
struct Args {
    /// App configuration file (JSON).
    #[clap(short, long, default_value = "launcher-kit.json")]
    config: PathBuf,

    /// Increase log verbosity, repeat for more.
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable logging.
    #[clap(short, long, global = true)]
    quiet: bool,

    #[clap(long, value_enum, default_value_t, global = true)]
    log_format: LogFormat,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured apps and the launcher each one uses.
    List,
    /// Print the spawn plan for an app without starting it.
    Plan {
        #[clap()]
        id: String,
    },
    /// Launch an app and supervise it until it exits. Ctrl-C stops it.
    Run {
        #[clap()]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(Level::from_flags(args.quiet, args.verbose), args.log_format);

    let config = KitConfig::load(&args.config).await?;
    let kit = LauncherKit::from_config(config).await?;

    match args.command {
        Command::List => {
            for id in kit.ids().await {
                let app = kit.get(&id).await?;
                println!("{}\t{}\t{}", id, app.variant().name(), app.name());
            }
        }
        Command::Plan { id } => {
            let plan = kit.get(&id).await?.plan()?;
            println!("{}", serde_json::to_string_pretty(&plan).into_diagnostic()?);
        }
        Command::Run { id } => {
            let completion = kit.launch(&id).await?;
            let outcome = tokio::select! {
                result = completion.clone().wait() => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping {}", id);
                    kit.stop(&id).await?;
                    completion.wait().await?
                }
            };

            if let Some(code) = outcome.exit_code.filter(|code| *code != 0) {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
