//! Launch descriptors and the path helpers shared by every launcher variant.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::platform::Platform;

/// Variant-specific options carried by a descriptor.
///
/// Each launcher variant reads only the fields it needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantOptions {
    pub content: Option<String>,
    pub reader_exe: Option<String>,
    pub rom: Option<String>,
    pub emulator_exe: Option<String>,
    pub app_id: Option<String>,
    pub target: Option<String>,
    pub terminal_exe: Option<String>,
    pub terminal_args: Option<Vec<String>>,
    pub steamless: bool,
    pub auto_close_steam: Option<bool>,
}

/// Immutable description of what to launch and how.
#[derive(Debug, Clone)]
pub struct LaunchDescriptor {
    pub id: String,
    /// Display name
    pub name: String,
    pub kind: Option<String>,
    pub use_: Option<String>,
    pub exe: Option<String>,
    pub args: Vec<String>,
    pub directory: Option<String>,
    pub env: BTreeMap<String, String>,
    pub indirect: bool,
    pub wrapper_pattern: Option<Regex>,
    pub options: VariantOptions,
}

impl LaunchDescriptor {
    /// Minimal descriptor for a direct executable.
    pub fn new(id: impl Into<String>, exe: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: Some("native".to_string()),
            use_: None,
            exe: Some(exe.into()),
            args: Vec::new(),
            directory: None,
            env: BTreeMap::new(),
            indirect: false,
            wrapper_pattern: None,
            options: VariantOptions::default(),
        }
    }

    /// The configured working directory, resolved against the home directory.
    pub fn working_directory(&self, ctx: &LaunchContext) -> Option<PathBuf> {
        let directory = self.directory.as_deref()?;
        let expanded = ctx.expand(directory, None);
        Some(fix_path(&expanded, None, &ctx.home, false, ctx.platform))
    }

    /// Expand `${home}` and `${wdir}` placeholders in a configured value.
    pub fn expand(&self, value: &str, ctx: &LaunchContext) -> String {
        ctx.expand(value, self.working_directory(ctx).as_deref())
    }

    /// Resolve an executable path against the working directory.
    pub fn resolve_exe(&self, value: &str, ctx: &LaunchContext) -> PathBuf {
        let wdir = self.working_directory(ctx);
        let expanded = ctx.expand(value, wdir.as_deref());
        fix_path(&expanded, wdir.as_deref(), &ctx.home, true, ctx.platform)
    }

    /// Resolve a document, ROM or shortcut path. URLs are only expanded.
    pub fn resolve_path(&self, value: &str, ctx: &LaunchContext) -> String {
        let wdir = self.working_directory(ctx);
        let expanded = ctx.expand(value, wdir.as_deref());
        if expanded.contains("://") {
            return expanded;
        }
        fix_path(&expanded, wdir.as_deref(), &ctx.home, false, ctx.platform)
            .to_string_lossy()
            .into_owned()
    }

    pub fn expanded_args(&self, ctx: &LaunchContext) -> Vec<String> {
        let wdir = self.working_directory(ctx);
        self.args
            .iter()
            .map(|arg| ctx.expand(arg, wdir.as_deref()))
            .collect()
    }

    /// Working directory for a spawn: the configured one, else the executable's own directory.
    pub fn cwd_for(&self, exe: &Path, ctx: &LaunchContext) -> Option<PathBuf> {
        self.working_directory(ctx).or_else(|| {
            exe.parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
        })
    }

    pub fn require_exe(&self) -> Result<&str> {
        self.exe
            .as_deref()
            .ok_or_else(|| Error::InvalidDescriptor(format!("app '{}' has no `exe`", self.id)))
    }
}

impl TryFrom<AppConfig> for LaunchDescriptor {
    type Error = Error;

    fn try_from(config: AppConfig) -> Result<Self> {
        let id = config
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| {
                config
                    .name
                    .as_deref()
                    .or(config.title.as_deref())
                    .and_then(name_to_id)
            })
            .ok_or_else(|| Error::InvalidDescriptor("invalid or missing app id".to_string()))?;

        let wrapper_pattern = config
            .wrapper_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| {
                Error::InvalidDescriptor(format!("app '{}' has an invalid wrapper_pattern: {}", id, e))
            })?;

        let name = config
            .name
            .or(config.title)
            .unwrap_or_else(|| id.clone());

        Ok(Self {
            id,
            name,
            kind: config.kind,
            use_: config.use_,
            exe: config.exe,
            args: config.args,
            directory: config.directory,
            env: config.env,
            indirect: config.indirect,
            wrapper_pattern,
            options: VariantOptions {
                content: config.content,
                reader_exe: config.reader_exe,
                rom: config.rom,
                emulator_exe: config.emulator_exe,
                app_id: config.app_id,
                target: config.target,
                terminal_exe: config.terminal_exe,
                terminal_args: config.terminal_args,
                steamless: config.steamless,
                auto_close_steam: config.auto_close_steam,
            },
        })
    }
}

/// Runtime facts about the host, supplied to spawn plan builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchContext {
    pub home: PathBuf,
    pub platform: Platform,
    /// Login shell, from `$SHELL`
    pub shell: Option<String>,
}

impl LaunchContext {
    pub fn detect() -> Self {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            home,
            platform: Platform::current(),
            shell: std::env::var("SHELL").ok().filter(|s| !s.is_empty()),
        }
    }

    pub fn expand(&self, value: &str, wdir: Option<&Path>) -> String {
        let mut expanded = value.replace("${home}", &self.home.to_string_lossy());
        if let Some(wdir) = wdir {
            expanded = expanded.replace("${wdir}", &wdir.to_string_lossy());
        }
        expanded
    }
}

/// Resolve a configured path.
///
/// Absolute paths are kept, `~/` is expanded against `home`, and everything
/// else is joined to `relative_to` (the home directory when absent). A bare
/// executable name is kept as-is so the OS can search `PATH`.
pub fn fix_path(
    path: &str,
    relative_to: Option<&Path>,
    home: &Path,
    is_exe: bool,
    platform: Platform,
) -> PathBuf {
    let base = relative_to.unwrap_or(home);

    if path.starts_with('/') {
        return PathBuf::from(path);
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return home.join(rest);
    }
    if let Some(rest) = path.strip_prefix("./") {
        return base.join(rest);
    }
    if path.starts_with("../") {
        return base.join(path);
    }
    if platform.is_windows() && is_drive_absolute(path) {
        return PathBuf::from(path);
    }
    let has_separator = path.contains('/') || (platform.is_windows() && path.contains('\\'));
    if is_exe && !has_separator {
        return PathBuf::from(path);
    }

    base.join(path)
}

fn is_drive_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

fn slugify(value: &str, keep: &[char]) -> Option<String> {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.to_lowercase().chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            pending_dash = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() || keep.contains(&c) {
            if pending_dash {
                slug.push('-');
                pending_dash = false;
            }
            slug.push(c);
        }
    }
    if pending_dash {
        slug.push('-');
    }

    (!slug.is_empty()).then_some(slug)
}

/// Normalize a launcher `type` or `use` into a registry key fragment.
pub fn str_to_path(value: &str) -> Option<String> {
    slugify(value, &[])
}

/// Derive an app id from a display name.
pub fn name_to_id(name: &str) -> Option<String> {
    slugify(name, &['+'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx() -> LaunchContext {
        LaunchContext {
            home: PathBuf::from("/home/player"),
            platform: Platform::Linux,
            shell: None,
        }
    }

    fn fix(path: &str, relative_to: Option<&str>, is_exe: bool) -> PathBuf {
        fix_path(
            path,
            relative_to.map(Path::new),
            Path::new("/home/player"),
            is_exe,
            Platform::Linux,
        )
    }

    #[test]
    fn fix_path_keeps_absolute_paths() {
        assert_eq!(fix("/usr/bin/foo", Some("/opt"), true), PathBuf::from("/usr/bin/foo"));
    }

    #[test]
    fn fix_path_expands_tilde() {
        assert_eq!(
            fix("~/games/ftl", Some("/opt"), true),
            PathBuf::from("/home/player/games/ftl")
        );
    }

    #[test]
    fn fix_path_joins_dot_relative_once() {
        assert_eq!(fix("./run.sh", Some("/opt/game"), true), PathBuf::from("/opt/game/run.sh"));
        assert_eq!(
            fix("../bin/run", Some("/opt/game"), true),
            PathBuf::from("/opt/game/../bin/run")
        );
    }

    #[test]
    fn fix_path_keeps_bare_executables_for_path_lookup() {
        assert_eq!(fix("evince", Some("/opt"), true), PathBuf::from("evince"));
        assert_eq!(fix("evince", Some("/opt"), false), PathBuf::from("/opt/evince"));
    }

    #[test]
    fn fix_path_defaults_to_home() {
        assert_eq!(fix("games/ftl", None, true), PathBuf::from("/home/player/games/ftl"));
    }

    #[test]
    fn fix_path_keeps_windows_drive_paths() {
        let fixed = fix_path(
            "C:\\Games\\game.exe",
            None,
            Path::new("/home/player"),
            true,
            Platform::Windows,
        );
        assert_eq!(fixed, PathBuf::from("C:\\Games\\game.exe"));
    }

    #[test]
    fn str_to_path_normalizes() {
        assert_eq!(str_to_path("Gnome Terminal").as_deref(), Some("gnome-terminal"));
        assert_eq!(str_to_path("lnk__PowerShell").as_deref(), Some("lnk-powershell"));
        assert_eq!(str_to_path("a - é - b").as_deref(), Some("a-b"));
        assert_eq!(str_to_path("C++"), Some("c".to_string()));
        assert_eq!(str_to_path("!!!"), None);
    }

    #[test]
    fn name_to_id_keeps_plus() {
        assert_eq!(name_to_id("Notepad++").as_deref(), Some("notepad++"));
        assert_eq!(
            name_to_id("The Battle for Wesnoth").as_deref(),
            Some("the-battle-for-wesnoth")
        );
    }

    #[test]
    fn descriptor_id_from_name_or_title() {
        let descriptor = LaunchDescriptor::try_from(AppConfig {
            title: Some("Faster Than Light".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(descriptor.id, "faster-than-light");
        assert_eq!(descriptor.name, "Faster Than Light");
    }

    #[test]
    fn descriptor_without_any_id_is_invalid() {
        let err = LaunchDescriptor::try_from(AppConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor(_)));
    }

    #[test]
    fn descriptor_rejects_bad_wrapper_pattern() {
        let err = LaunchDescriptor::try_from(AppConfig {
            id: Some("x".to_string()),
            wrapper_pattern: Some("(".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor(_)));
    }

    #[test]
    fn placeholders_expand() {
        let mut descriptor = LaunchDescriptor::new("doom", "${wdir}/doom");
        descriptor.directory = Some("${home}/games/doom".to_string());
        descriptor.args = vec!["-config".to_string(), "${home}/.doomrc".to_string()];

        let ctx = ctx();
        assert_eq!(
            descriptor.working_directory(&ctx),
            Some(PathBuf::from("/home/player/games/doom"))
        );
        assert_eq!(
            descriptor.resolve_exe("${wdir}/doom", &ctx),
            PathBuf::from("/home/player/games/doom/doom")
        );
        assert_eq!(
            descriptor.expanded_args(&ctx),
            vec!["-config", "/home/player/.doomrc"]
        );
    }

    #[test]
    fn cwd_falls_back_to_exe_directory() {
        let descriptor = LaunchDescriptor::new("ftl", "/opt/ftl/FTL");
        let ctx = ctx();
        let exe = descriptor.resolve_exe("/opt/ftl/FTL", &ctx);
        assert_eq!(descriptor.cwd_for(&exe, &ctx), Some(PathBuf::from("/opt/ftl")));

        let bare = descriptor.resolve_exe("ftl", &ctx);
        assert_eq!(descriptor.cwd_for(&bare, &ctx), None);
    }
}
