//! Plugins resolved while a hit is being built.
//!
//! A parameter whose key matches a registered plugin name (for example `tvt`)
//! triggers that plugin during the build. The plugin's response is merged
//! into the `stc` parameter and the trigger parameter itself is dropped.

use crate::config::TrackerConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Name of the built-in TV tracking hook.
pub const TV_TRACKING_PLUGIN: &str = "tvt";

/// A build-time plugin.
pub trait Plugin: Send {
    fn execute(&mut self);

    /// JSON response produced by [`Plugin::execute`].
    fn response(&self) -> String;
}

/// Creates a plugin instance for one build.
pub type PluginFactory = Arc<dyn Fn(&TrackerConfig) -> Box<dyn Plugin> + Send + Sync>;

/// Registered plugins by trigger parameter name.
#[derive(Default)]
pub struct PluginRegistry {
    factories: RwLock<HashMap<String, PluginFactory>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&TrackerConfig) -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), Arc::new(factory));
    }

    pub fn unregister(&self, name: &str) {
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Instantiate and execute the plugin registered under `name`.
    pub fn run(&self, name: &str, config: &TrackerConfig) -> Option<String> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()?;
        let mut plugin = factory(config);
        plugin.execute();
        Some(plugin.response())
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .factories
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("PluginRegistry").field("plugins", &names).finish()
    }
}
