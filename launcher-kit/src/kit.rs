//! Registry of configured apps and their launchers.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{AppConfig, KitConfig, SupervisorSettings};
use crate::descriptor::LaunchDescriptor;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::session::MetaStore;
use crate::supervisor::{AppLauncher, Completion, LaunchServices};

/// All apps known to this process, keyed by id.
pub struct LauncherKit {
    registry: Registry,
    services: LaunchServices,
    meta: Option<Arc<MetaStore>>,
    apps: RwLock<BTreeMap<String, AppLauncher>>,
}

impl LauncherKit {
    /// A kit backed by real processes and the default launcher variants.
    pub fn new(settings: SupervisorSettings) -> Self {
        let meta = Arc::new(MetaStore::new());

        Self {
            registry: Registry::default(),
            services: LaunchServices::system(settings, meta.clone()),
            meta: Some(meta),
            apps: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_services(registry: Registry, services: LaunchServices) -> Self {
        Self {
            registry,
            services,
            meta: None,
            apps: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn from_config(config: KitConfig) -> Result<Self> {
        let kit = Self::new(config.supervisor);
        for app in config.apps {
            kit.add_app(app).await?;
        }
        Ok(kit)
    }

    /// Run statistics, when the kit owns its session store.
    pub fn meta(&self) -> Option<&Arc<MetaStore>> {
        self.meta.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register an app. An existing app with the same id is replaced.
    pub async fn add_app(&self, config: AppConfig) -> Result<AppLauncher> {
        let descriptor = LaunchDescriptor::try_from(config)?;
        let variant = self
            .registry
            .resolve(descriptor.kind.as_deref(), descriptor.use_.as_deref());
        debug!(app = %descriptor.id, "Using launcher variant {}", variant.name());

        let launcher = AppLauncher::new(descriptor, variant, self.services.clone());
        let mut apps = self.apps.write().await;
        if apps
            .insert(launcher.id().to_string(), launcher.clone())
            .is_some()
        {
            warn!("App id '{}' registered twice, replacing the earlier one", launcher.id());
        }
        Ok(launcher)
    }

    pub async fn get(&self, id: &str) -> Result<AppLauncher> {
        self.apps
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::AppNotFound(id.to_string()))
    }

    pub async fn ids(&self) -> Vec<String> {
        self.apps.read().await.keys().cloned().collect()
    }

    pub async fn launch(&self, id: &str) -> Result<Completion> {
        Ok(self.get(id).await?.launch().await)
    }

    pub async fn stop(&self, id: &str) -> Result<()> {
        self.get(id).await?.stop().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn app(value: serde_json::Value) -> AppConfig {
        AppConfig::try_from(value).unwrap()
    }

    #[tokio::test]
    async fn registers_apps_by_id() {
        let kit = LauncherKit::new(SupervisorSettings::default());
        let launcher = kit
            .add_app(app(json!({ "name": "Battle for Wesnoth", "exe": "wesnoth" })))
            .await
            .unwrap();

        assert_eq!(launcher.id(), "battle-for-wesnoth");
        assert_eq!(launcher.variant().name(), "native");
        assert_eq!(kit.ids().await, vec!["battle-for-wesnoth"]);
    }

    #[tokio::test]
    async fn duplicate_id_replaces() {
        let kit = LauncherKit::new(SupervisorSettings::default());
        kit.add_app(app(json!({ "id": "x", "exe": "one" }))).await.unwrap();
        kit.add_app(app(json!({ "id": "x", "exe": "two", "type": "shell" })))
            .await
            .unwrap();

        let launcher = kit.get("x").await.unwrap();
        assert_eq!(launcher.descriptor().exe.as_deref(), Some("two"));
        assert_eq!(launcher.variant().name(), "shell");
        assert_eq!(kit.ids().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_app_is_an_error() {
        let kit = LauncherKit::new(SupervisorSettings::default());
        assert_eq!(
            kit.launch("nope").await.unwrap_err(),
            Error::AppNotFound("nope".to_string())
        );
        assert_eq!(
            kit.stop("nope").await.unwrap_err(),
            Error::AppNotFound("nope".to_string())
        );
    }

    #[tokio::test]
    async fn missing_id_is_rejected() {
        let kit = LauncherKit::new(SupervisorSettings::default());
        let err = kit.add_app(app(json!({ "exe": "x" }))).await.unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor(_)));
    }
}
