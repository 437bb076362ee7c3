//! Resolution of a `(type, use)` pair to a launcher variant.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::descriptor::str_to_path;
use crate::variant::LauncherVariant;
use crate::variants::{
    AppxVariant, ContentVariant, FlatpakVariant, LinkVariant, NativeVariant, OpenVariant,
    RomVariant, ShellVariant, StartProcessVariant, SteamVariant, TerminalVariant,
};

/// `use` value that always selects the OS-open variant.
pub const OPEN_USE: &str = "open";

/// Static table of launcher variants keyed by `type[@use]`.
///
/// Never fails to resolve: `use = "open"` wins over any registration, and
/// unknown or missing types fall back to the content variant.
#[derive(Debug, Clone)]
pub struct Registry {
    variants: HashMap<String, Arc<dyn LauncherVariant>>,
    open: Arc<dyn LauncherVariant>,
    fallback: Arc<dyn LauncherVariant>,
}

impl Registry {
    /// A registry with only the open and fallback variants.
    pub fn empty() -> Self {
        Self {
            variants: HashMap::new(),
            open: Arc::new(OpenVariant),
            fallback: Arc::new(ContentVariant::new()),
        }
    }

    /// Register `variant` under `key` (`type` or `type@use`), replacing any previous one.
    pub fn register(&mut self, key: &str, variant: Arc<dyn LauncherVariant>) {
        let key = match key.split_once('@') {
            Some((kind, use_)) => variant_key(Some(kind), Some(use_)),
            None => variant_key(Some(key), None),
        };
        if let Some(key) = key {
            self.variants.insert(key, variant);
        }
    }

    pub fn resolve(&self, kind: Option<&str>, use_: Option<&str>) -> Arc<dyn LauncherVariant> {
        if use_.and_then(str_to_path).as_deref() == Some(OPEN_USE) {
            return self.open.clone();
        }

        match variant_key(kind, use_).and_then(|key| self.variants.get(&key)) {
            Some(variant) => variant.clone(),
            None => {
                debug!(
                    "No launcher registered for type {:?} use {:?}, using {}",
                    kind,
                    use_,
                    self.fallback.name()
                );
                self.fallback.clone()
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        let terminal: Arc<dyn LauncherVariant> = Arc::new(TerminalVariant);

        registry.register("native", Arc::new(NativeVariant));
        registry.register("shell", Arc::new(ShellVariant));
        registry.register("terminal", terminal.clone());
        registry.register("terminal@gnome-terminal", terminal);
        registry.register("steam", Arc::new(SteamVariant));
        registry.register("flatpak", Arc::new(FlatpakVariant));
        registry.register("content", registry.fallback.clone());
        registry.register(
            "pdf@evince",
            Arc::new(ContentVariant::with_reader("pdf@evince", "evince")),
        );
        registry.register("rom", Arc::new(RomVariant));
        registry.register("lnk@powershell", Arc::new(LinkVariant));
        registry.register("powershell-start-process", Arc::new(StartProcessVariant));
        registry.register("appx@powershell", Arc::new(AppxVariant));
        registry
    }
}

/// Compose the registry key `type` or `type@use`, normalized.
pub fn variant_key(kind: Option<&str>, use_: Option<&str>) -> Option<String> {
    let kind = kind.and_then(str_to_path)?;
    match use_.and_then(str_to_path) {
        Some(use_) => Some(format!("{}@{}", kind, use_)),
        None => Some(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{LaunchContext, LaunchDescriptor};
    use crate::error::Result;
    use crate::plan::PlanOutcome;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct Marker(&'static str);

    #[async_trait]
    impl LauncherVariant for Marker {
        fn name(&self) -> &'static str {
            self.0
        }

        fn build_spawn_plan(&self, _: &LaunchDescriptor, _: &LaunchContext) -> Result<PlanOutcome> {
            Ok(PlanOutcome::Unsupported)
        }
    }

    #[test]
    fn open_use_overrides_type_registration() {
        let mut registry = Registry::default();
        registry.register("native@open", Arc::new(Marker("native-open")));

        assert_eq!(registry.resolve(Some("native"), Some("open")).name(), "open");
        assert_eq!(registry.resolve(Some("steam"), Some("Open")).name(), "open");
        assert_eq!(registry.resolve(None, Some("open")).name(), "open");
    }

    #[test]
    fn unknown_type_falls_back_to_content() {
        let registry = Registry::default();
        assert_eq!(registry.resolve(Some("itch-io"), None).name(), "content");
        assert_eq!(registry.resolve(None, None).name(), "content");
        assert_eq!(registry.resolve(Some("!!!"), None).name(), "content");
    }

    #[test]
    fn unknown_use_falls_back_to_content() {
        let registry = Registry::default();
        assert_eq!(registry.resolve(Some("pdf"), Some("okular")).name(), "content");
    }

    #[test]
    fn type_and_use_compose_the_key() {
        let registry = Registry::default();
        assert_eq!(registry.resolve(Some("native"), None).name(), "native");
        assert_eq!(registry.resolve(Some("PDF"), Some("Evince")).name(), "pdf@evince");
        assert_eq!(
            registry.resolve(Some("terminal"), Some("gnome_terminal")).name(),
            "terminal"
        );
        assert_eq!(
            registry.resolve(Some("powershell start process"), None).name(),
            "powershell-start-process"
        );
    }

    #[test]
    fn registration_replaces() {
        let mut registry = Registry::empty();
        registry.register("emu", Arc::new(Marker("first")));
        registry.register("emu", Arc::new(Marker("second")));
        assert_eq!(registry.resolve(Some("emu"), None).name(), "second");
    }

    #[test]
    fn variant_keys() {
        assert_eq!(variant_key(Some("Lnk"), Some("PowerShell")).as_deref(), Some("lnk@powershell"));
        assert_eq!(variant_key(Some("native"), None).as_deref(), Some("native"));
        assert_eq!(variant_key(None, Some("evince")), None);
    }
}
