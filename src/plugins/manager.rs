//! Plugin manager - handles plugin resolution and lifecycle hooks

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::errors::{panic_message, BotError, LifecycleHook, PluginError};
use crate::domain::events::TraceEvent;
use crate::infrastructure::plugins::ModuleLoader;
use crate::plugins::trait_def::{Plugin, PluginContext, PluginInfo, PluginOrigin, PluginSource};

/// Owns the declared plugin sources and, once loaded, the plugin instances
pub struct PluginManager {
    sources: Vec<PluginSource>,
    loader: Arc<dyn ModuleLoader>,
    plugins: Vec<Arc<dyn Plugin>>,
    context: Option<PluginContext>,
}

impl PluginManager {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            sources: Vec::new(),
            loader,
            plugins: Vec::new(),
            context: None,
        }
    }

    pub fn add_source(&mut self, source: PluginSource) {
        self.sources.push(source);
    }

    pub fn set_loader(&mut self, loader: Arc<dyn ModuleLoader>) {
        self.loader = loader;
    }

    pub fn sources(&self) -> &[PluginSource] {
        &self.sources
    }

    /// Loaded plugins, in load order
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.context.is_some()
    }

    /// Resolve every source into a plugin instance, in declaration order
    ///
    /// Any resolution failure aborts the whole load and leaves both the
    /// manager and the catalog empty. Emits one trace event once every
    /// plugin has resolved.
    pub async fn load_all(&mut self, ctx: &PluginContext) -> Result<usize, BotError> {
        if self.is_loaded() {
            return Err(BotError::state("plugins are already loaded"));
        }

        let mut staged: Vec<(Arc<dyn Plugin>, PluginOrigin)> = Vec::new();
        for source in &self.sources {
            match source {
                PluginSource::Instance(plugin) => {
                    stage(&mut staged, plugin.clone(), PluginOrigin::Instance)?;
                }
                PluginSource::Type(plugin_type) => {
                    let plugin = plugin_type.instantiate(ctx).map_err(|e| BotError::Resolution {
                        plugin: plugin_type.name().to_string(),
                        source: e,
                    })?;
                    stage(&mut staged, plugin, PluginOrigin::Type)?;
                }
                PluginSource::Library(path) => {
                    self.load_library(path, ctx, &mut staged).await?;
                }
                PluginSource::Collector(collector) => {
                    let paths = collector.collect().map_err(|e| BotError::Resolution {
                        plugin: collector.describe(),
                        source: e,
                    })?;
                    debug!("Collected {} plugin libraries from {}", paths.len(), collector.describe());
                    for path in &paths {
                        self.load_library(path, ctx, &mut staged).await?;
                    }
                }
            }
        }

        for (plugin, origin) in staged {
            info!("Registering plugin: {}", plugin.name());
            ctx.catalog().push(PluginInfo::of(plugin.as_ref(), origin));
            self.plugins.push(plugin);
        }
        self.context = Some(ctx.clone());
        info!("Loaded {} plugins", self.plugins.len());
        ctx.bus().emit(&TraceEvent::new(format!("plugins loaded: {}", self.plugins.len())));
        Ok(self.plugins.len())
    }

    /// Run every `initialize` hook in load order, stopping at the first failure
    pub async fn invoke_initialize(&self) -> Result<(), BotError> {
        self.invoke(LifecycleHook::Initialize).await?;
        self.trace("plugins initialized");
        Ok(())
    }

    /// Run every `start` hook in load order, stopping at the first failure
    pub async fn invoke_start(&self) -> Result<(), BotError> {
        self.invoke(LifecycleHook::Start).await?;
        self.trace("plugins started");
        Ok(())
    }

    async fn invoke(&self, hook: LifecycleHook) -> Result<(), BotError> {
        let ctx = self
            .context
            .as_ref()
            .ok_or_else(|| BotError::state(format!("cannot {} plugins before they are loaded", hook)))?;

        for plugin in &self.plugins {
            debug!("Running {} hook: {}", hook, plugin.name());
            let running = match hook {
                LifecycleHook::Initialize => plugin.initialize(ctx),
                LifecycleHook::Start => plugin.start(ctx),
            };
            // A panicking hook fails like any other hook.
            let result = AssertUnwindSafe(running).catch_unwind().await.unwrap_or_else(|payload| {
                Err(PluginError::Internal(format!(
                    "{} hook panicked: {}",
                    hook,
                    panic_message(payload.as_ref())
                )))
            });
            result.map_err(|e| BotError::Lifecycle {
                plugin: plugin.name().to_string(),
                hook,
                source: e,
            })?;
        }
        Ok(())
    }

    async fn load_library(
        &self,
        path: &Path,
        ctx: &PluginContext,
        staged: &mut Vec<(Arc<dyn Plugin>, PluginOrigin)>,
    ) -> Result<(), BotError> {
        let loader = self.loader.clone();
        let owned = path.to_path_buf();
        // Library mapping touches the filesystem; keep it off the async workers.
        let types = tokio::task::spawn_blocking(move || loader.load(&owned))
            .await
            .map_err(|e| BotError::Internal(format!("plugin loader task failed: {}", e)))?
            .map_err(|e| BotError::Resolution {
                plugin: path.display().to_string(),
                source: e,
            })?;

        for plugin_type in types {
            let plugin = plugin_type.instantiate(ctx).map_err(|e| BotError::Resolution {
                plugin: plugin_type.name().to_string(),
                source: e,
            })?;
            stage(staged, plugin, PluginOrigin::Library)?;
        }
        Ok(())
    }

    fn trace(&self, message: &str) {
        if let Some(ctx) = &self.context {
            ctx.bus().emit(&TraceEvent::new(message));
        }
    }
}

/// Queue a resolved plugin, rejecting duplicate names
fn stage(
    staged: &mut Vec<(Arc<dyn Plugin>, PluginOrigin)>,
    plugin: Arc<dyn Plugin>,
    origin: PluginOrigin,
) -> Result<(), BotError> {
    let name = plugin.name().to_string();
    if staged.iter().any(|(p, _)| p.name() == name) {
        return Err(BotError::Resolution {
            source: PluginError::Load(format!("Plugin '{}' already registered", name)),
            plugin: name,
        });
    }
    staged.push((plugin, origin));
    Ok(())
}
