//! Plugin loading.
//!
//! Plugins are compiled in and registered by id on a [`StaticLoader`];
//! `Service::init` loads the ids listed in `SERVICE_PLUGIN`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Environment variable holding a comma separated list of plugin ids.
pub const PLUGIN_ENV: &str = "SERVICE_PLUGIN";

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn init(&self) -> Result<()>;
}

pub trait PluginLoader: Send + Sync {
    fn load(&self, id: &str) -> Result<Arc<dyn Plugin>>;

    fn init(&self, plugin: &Arc<dyn Plugin>) -> Result<()>;
}

/// Split a comma separated plugin list, skipping empty entries.
pub fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Loader over plugins registered at compile time.
#[derive(Default)]
pub struct StaticLoader {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin` under its own name.
    pub fn register(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.insert(plugin.name().to_string(), plugin);
        self
    }
}

impl PluginLoader for StaticLoader {
    fn load(&self, id: &str) -> Result<Arc<dyn Plugin>> {
        self.plugins.get(id).cloned().ok_or_else(|| Error::Plugin {
            name: id.to_string(),
            reason: "not registered".to_string(),
        })
    }

    fn init(&self, plugin: &Arc<dyn Plugin>) -> Result<()> {
        plugin.init().map_err(|e| Error::Plugin {
            name: plugin.name().to_string(),
            reason: e.to_string(),
        })
    }
}
