//! Plugin trait definitions

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use crate::application::errors::PluginResult;
use crate::application::events::EventBus;
use crate::application::host::HostHandle;
use crate::application::services::ServiceProvider;

/// Core plugin trait that all plugins must implement
///
/// Both hooks are optional. `initialize` runs before the gateway connects and
/// may register listeners but must not talk to the gateway; `start` runs once
/// the connection is live.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique identifier for the plugin
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str {
        ""
    }

    /// Optional: Get plugin metadata
    fn metadata(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    async fn initialize(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn start(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }
}

/// A plugin type that can build itself from the host context
pub trait ConstructPlugin: Plugin + Sized + 'static {
    fn construct(ctx: &PluginContext) -> PluginResult<Self>;
}

pub type PluginConstructor =
    Arc<dyn Fn(&PluginContext) -> PluginResult<Arc<dyn Plugin>> + Send + Sync>;

/// Named constructor standing in for a plugin type reference
#[derive(Clone)]
pub struct PluginType {
    name: String,
    construct: PluginConstructor,
}

impl PluginType {
    pub fn of<P: ConstructPlugin>() -> Self {
        Self::from_fn(std::any::type_name::<P>(), |ctx| {
            P::construct(ctx).map(|p| Arc::new(p) as Arc<dyn Plugin>)
        })
    }

    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&PluginContext) -> PluginResult<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            construct: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self, ctx: &PluginContext) -> PluginResult<Arc<dyn Plugin>> {
        (self.construct)(ctx)
    }
}

impl fmt::Debug for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginType").field("name", &self.name).finish()
    }
}

/// Expands to a batch of library files at load time
pub trait LibraryCollector: Send + Sync {
    /// Label used in logs and errors
    fn describe(&self) -> String;

    fn collect(&self) -> PluginResult<Vec<PathBuf>>;
}

/// Where a plugin comes from
#[derive(Clone)]
pub enum PluginSource {
    /// Pre-built instance, passed through unchanged
    Instance(Arc<dyn Plugin>),
    /// Type reference, constructed from the context at load time
    Type(PluginType),
    /// Shared library file or plugin directory, loaded at load time
    Library(PathBuf),
    /// Batch of library files discovered at load time
    Collector(Arc<dyn LibraryCollector>),
}

impl PluginSource {
    pub fn describe(&self) -> String {
        match self {
            PluginSource::Instance(p) => p.name().to_string(),
            PluginSource::Type(t) => t.name().to_string(),
            PluginSource::Library(path) => path.display().to_string(),
            PluginSource::Collector(c) => c.describe(),
        }
    }
}

impl fmt::Debug for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginSource::Instance(p) => write!(f, "Instance({})", p.name()),
            PluginSource::Type(t) => write!(f, "Type({})", t.name()),
            PluginSource::Library(path) => write!(f, "Library({})", path.display()),
            PluginSource::Collector(c) => write!(f, "Collector({})", c.describe()),
        }
    }
}

/// How a loaded plugin was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginOrigin {
    Instance,
    Type,
    Library,
}

/// Plugin information for listing
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub origin: PluginOrigin,
    pub metadata: HashMap<String, String>,
}

impl PluginInfo {
    pub fn of(plugin: &dyn Plugin, origin: PluginOrigin) -> Self {
        Self {
            name: plugin.name().to_string(),
            description: plugin.description().to_string(),
            origin,
            metadata: plugin.metadata(),
        }
    }
}

/// Shared list of loaded plugin metadata, in load order
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    entries: Arc<RwLock<Vec<PluginInfo>>>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, info: PluginInfo) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).push(info);
    }

    pub fn list(&self) -> Vec<PluginInfo> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything a plugin may ask the host for
#[derive(Clone)]
pub struct PluginContext {
    host: HostHandle,
    bus: Arc<EventBus>,
    services: Arc<ServiceProvider>,
    catalog: PluginCatalog,
}

impl PluginContext {
    pub fn new(
        host: HostHandle,
        bus: Arc<EventBus>,
        services: Arc<ServiceProvider>,
        catalog: PluginCatalog,
    ) -> Self {
        Self {
            host,
            bus,
            services,
            catalog,
        }
    }

    pub fn host(&self) -> &HostHandle {
        &self.host
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn services(&self) -> &ServiceProvider {
        &self.services
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    /// Shortcut for `services().require::<T>()`
    pub fn resolve<T: std::any::Any + Send + Sync>(&self) -> PluginResult<Arc<T>> {
        self.services
            .require::<T>()
            .map_err(|e| crate::application::errors::PluginError::NotFound(e.to_string()))
    }
}
