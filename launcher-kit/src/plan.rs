//! Concrete, OS-executable spawn commands produced by launcher variants.

use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Process creation flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformOptions {
    /// Start the child in its own process group so it outlives the supervisor.
    pub detached: bool,
    /// Pipe stdout/stderr into the logging tap.
    pub capture_output: bool,
    /// Pass arguments to the OS without further quoting. Only honored on Windows,
    /// where `cmd.exe` and PowerShell command lines are pre-quoted by the builder.
    pub verbatim_args: bool,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            detached: false,
            capture_output: true,
            verbatim_args: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpawnPlan {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub options: PlatformOptions,
}

impl SpawnPlan {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_directory: None,
            env: BTreeMap::new(),
            options: PlatformOptions::default(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_directory = dir;
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn detached(mut self) -> Self {
        self.options.detached = true;
        self
    }

    pub fn without_output(mut self) -> Self {
        self.options.capture_output = false;
        self
    }

    pub fn verbatim(mut self) -> Self {
        self.options.verbatim_args = true;
        self
    }

    /// Human-readable command line, for logs.
    pub fn display_command(&self) -> String {
        std::iter::once(self.executable.to_string_lossy())
            .chain(self.args.iter().map(|a| Cow::Borrowed(a.as_str())))
            .map(shell_escape::escape)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of asking a variant for a spawn plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "plan", rename_all = "snake_case")]
pub enum PlanOutcome {
    Ready(SpawnPlan),
    /// The variant cannot run on this OS.
    Unsupported,
}

/// Quote one argument for a POSIX shell.
pub fn quote_posix(arg: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(arg)).into_owned()
}

/// Quote one argument for a `cmd.exe /c` command line.
pub fn quote_cmd(arg: &str) -> String {
    const SPECIAL: &[char] = &['&', '|', '<', '>', '^', '(', ')', '%', '!', ',', ';', '=', '"'];

    if !arg.is_empty() && !arg.contains(char::is_whitespace) && !arg.contains(SPECIAL) {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('"', "\"\""))
}

/// Quote one argument as a PowerShell literal string.
pub fn quote_powershell(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "''"))
}
