//! Configuration types for the launch supervisor.
//!
//! App records and supervisor tunables with serde support for JSON
//! deserialization. Loading is read-only; nothing here is written back.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

fn default_kind() -> Option<String> {
    Some("native".to_string())
}

/// One app record as supplied by the configuration provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Launcher type, `native` when absent.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: Option<String>,
    #[serde(rename = "use", default)]
    pub use_: Option<String>,
    #[serde(default)]
    pub exe: Option<String>,
    /// Either a list of arguments or a single shell-like command line.
    #[serde(default, deserialize_with = "deserialize_args")]
    pub args: Vec<String>,
    /// Working directory
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// The spawned process is a disposable wrapper around the real target.
    #[serde(default)]
    pub indirect: bool,
    /// Regex matched against process command lines to find the wrapper.
    #[serde(default)]
    pub wrapper_pattern: Option<String>,

    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reader_exe: Option<String>,
    #[serde(default)]
    pub rom: Option<String>,
    #[serde(default)]
    pub emulator_exe: Option<String>,
    /// Store or package id (Steam app id, flatpak ref, AppX id)
    #[serde(default)]
    pub app_id: Option<String>,
    /// Shortcut target for link launchers
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub terminal_exe: Option<String>,
    #[serde(default)]
    pub terminal_args: Option<Vec<String>>,
    #[serde(default)]
    pub steamless: bool,
    #[serde(default)]
    pub auto_close_steam: Option<bool>,
}

impl TryFrom<serde_json::Value> for AppConfig {
    type Error = serde_json::Error;

    fn try_from(json: serde_json::Value) -> std::result::Result<Self, Self::Error> {
        serde_json::from_value(json)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArgsInput {
    List(Vec<String>),
    Line(String),
}

fn deserialize_args<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<ArgsInput>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(ArgsInput::List(args)) => Ok(args),
        Some(ArgsInput::Line(line)) => shell_words::split(&line).map_err(serde::de::Error::custom),
    }
}

/// Timing knobs for termination escalation and indirect PID resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Wait after the graceful request before re-checking the run.
    pub grace_check_ms: u64,
    /// Further wait before escalating to a forced kill.
    pub kill_timeout_ms: u64,
    /// Process table poll interval while looking for the wrapper and its child.
    pub pid_poll_interval_ms: u64,
    /// Liveness check interval once the real PID is known.
    pub liveness_interval_ms: u64,
    /// Give up PID resolution after this long. Unbounded when unset.
    pub pid_resolution_timeout_ms: Option<u64>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            grace_check_ms: 100,
            kill_timeout_ms: 10_000,
            pid_poll_interval_ms: 1_000,
            liveness_interval_ms: 2_000,
            pid_resolution_timeout_ms: None,
        }
    }
}

impl SupervisorSettings {
    pub fn grace_check(&self) -> Duration {
        Duration::from_millis(self.grace_check_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    pub fn pid_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pid_poll_interval_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn pid_resolution_timeout(&self) -> Option<Duration> {
        self.pid_resolution_timeout_ms.map(Duration::from_millis)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KitConfig {
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub apps: Vec<AppConfig>,
}

impl KitConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        serde_json::from_str(&content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn args_accept_a_command_line() {
        let config = AppConfig::try_from(json!({
            "name": "Wesnoth",
            "exe": "wesnoth",
            "args": "--fullscreen --log-file 'my logs/out.txt'"
        }))
        .unwrap();

        assert_eq!(
            config.args,
            vec!["--fullscreen", "--log-file", "my logs/out.txt"]
        );
    }

    #[test]
    fn args_accept_a_list() {
        let config = AppConfig::try_from(json!({
            "name": "Wesnoth",
            "args": ["a b", "c"]
        }))
        .unwrap();

        assert_eq!(config.args, vec!["a b", "c"]);
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        let result = AppConfig::try_from(json!({ "name": "x", "args": "'oops" }));
        assert!(result.is_err());
    }

    #[test]
    fn type_defaults_to_native() {
        let config = AppConfig::try_from(json!({ "name": "x" })).unwrap();
        assert_eq!(config.kind.as_deref(), Some("native"));
        assert_eq!(config.use_, None);
        assert!(config.args.is_empty());
    }

    #[test]
    fn type_and_use_keys() {
        let config =
            AppConfig::try_from(json!({ "name": "doc", "type": "pdf", "use": "evince" })).unwrap();
        assert_eq!(config.kind.as_deref(), Some("pdf"));
        assert_eq!(config.use_.as_deref(), Some("evince"));
    }

    #[test]
    fn supervisor_settings_defaults() {
        let settings: SupervisorSettings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings.grace_check(), Duration::from_millis(100));
        assert_eq!(settings.kill_timeout(), Duration::from_secs(10));
        assert_eq!(settings.pid_poll_interval(), Duration::from_secs(1));
        assert_eq!(settings.liveness_interval(), Duration::from_secs(2));
        assert_eq!(settings.pid_resolution_timeout(), None);
    }

    #[test]
    fn supervisor_settings_partial_override() {
        let settings: SupervisorSettings =
            serde_json::from_value(json!({ "kill_timeout_ms": 500, "pid_resolution_timeout_ms": 30000 }))
                .unwrap();
        assert_eq!(settings.kill_timeout(), Duration::from_millis(500));
        assert_eq!(settings.grace_check(), Duration::from_millis(100));
        assert_eq!(
            settings.pid_resolution_timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[tokio::test]
    async fn load_reports_the_path_on_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apps.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = KitConfig::load(&path).await.unwrap_err();
        assert!(matches!(err, Error::Config { path: p, .. } if p == path));
    }

    #[tokio::test]
    async fn load_reads_apps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apps.json");
        let content = json!({
            "supervisor": { "grace_check_ms": 50 },
            "apps": [{ "id": "ftl", "type": "steam", "app_id": "212680" }]
        });
        tokio::fs::write(&path, content.to_string()).await.unwrap();

        let config = KitConfig::load(&path).await.unwrap();
        assert_eq!(config.supervisor.grace_check_ms, 50);
        assert_eq!(config.apps.len(), 1);
        assert_eq!(config.apps[0].app_id.as_deref(), Some("212680"));
    }
}
