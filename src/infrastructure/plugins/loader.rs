//! Plugin loader - Resolves on-disk plugin libraries into plugin constructors

use async_trait::async_trait;
use libloading::Library;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::errors::{PluginError, PluginResult};
use crate::plugins::trait_def::{LibraryCollector, Plugin, PluginContext, PluginType};
use super::manifest::{PluginManifest, MANIFEST_FILE};

/// Symbol looked up when the manifest does not name one
pub const DEFAULT_ENTRY_SYMBOL: &str = "lintas_plugin_entry";

/// Signature of the exported entry point
///
/// Libraries must be built with the same toolchain as the host, since the
/// plugin crosses the boundary as a Rust trait object.
pub type PluginEntryFn = fn(&PluginContext) -> PluginResult<Box<dyn Plugin>>;

/// Turns a path into zero or more plugin constructors
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path) -> PluginResult<Vec<PluginType>>;
}

/// Plugin produced by a dynamic library; keeps the library mapped while alive
struct LibraryPlugin {
    inner: Box<dyn Plugin>,
    _library: Arc<Library>,
}

#[async_trait]
impl Plugin for LibraryPlugin {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn metadata(&self) -> HashMap<String, String> {
        self.inner.metadata()
    }

    async fn initialize(&self, ctx: &PluginContext) -> PluginResult<()> {
        self.inner.initialize(ctx).await
    }

    async fn start(&self, ctx: &PluginContext) -> PluginResult<()> {
        self.inner.start(ctx).await
    }
}

/// Loads plugins from shared libraries with `libloading`
///
/// A path is either a library file or a plugin directory holding a
/// `plugin.yaml` manifest.
#[derive(Debug, Default)]
pub struct NativeModuleLoader;

impl NativeModuleLoader {
    pub fn new() -> Self {
        Self
    }

    fn resolve(&self, path: &Path) -> PluginResult<(String, PathBuf, String)> {
        if path.is_dir() {
            let manifest_path = path.join(MANIFEST_FILE);
            if !manifest_path.exists() {
                return Err(PluginError::Load(format!(
                    "Missing {} in {}",
                    MANIFEST_FILE,
                    path.display()
                )));
            }
            let manifest = PluginManifest::from_file(&manifest_path)?;
            tracing::debug!("Read manifest for {} v{}", manifest.name, manifest.version);
            let library = manifest.library_path(path);
            let entry = manifest
                .entry
                .clone()
                .unwrap_or_else(|| DEFAULT_ENTRY_SYMBOL.to_string());
            return Ok((manifest.name, library, entry));
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.strip_prefix(std::env::consts::DLL_PREFIX).unwrap_or(s).to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok((name, path.to_path_buf(), DEFAULT_ENTRY_SYMBOL.to_string()))
    }
}

impl ModuleLoader for NativeModuleLoader {
    fn load(&self, path: &Path) -> PluginResult<Vec<PluginType>> {
        let (name, library_path, entry) = self.resolve(path)?;

        if !library_path.exists() {
            return Err(PluginError::Load(format!(
                "Library not found: {}",
                library_path.display()
            )));
        }

        // SAFETY: loading runs the library's initializers; plugin libraries are trusted.
        let library = unsafe {
            Library::new(&library_path)
                .map_err(|e| PluginError::Load(format!("Failed to load library: {}", e)))?
        };

        // SAFETY: the symbol type is part of the plugin contract, see `PluginEntryFn`.
        let entry_fn: PluginEntryFn = unsafe {
            *library
                .get::<PluginEntryFn>(entry.as_bytes())
                .map_err(|e| PluginError::Load(format!("Failed to find entry '{}': {}", entry, e)))?
        };

        tracing::info!("Loaded plugin library: {} ({})", name, library_path.display());

        let library = Arc::new(library);
        Ok(vec![PluginType::from_fn(name, move |ctx| {
            let inner = entry_fn(ctx)?;
            Ok(Arc::new(LibraryPlugin {
                inner,
                _library: library.clone(),
            }) as Arc<dyn Plugin>)
        })])
    }
}

/// Compiled-in registry mapping paths to constructors
///
/// Used on targets without dynamic loading and in tests.
#[derive(Default)]
pub struct StaticModuleLoader {
    modules: HashMap<PathBuf, Vec<PluginType>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, path: impl Into<PathBuf>, plugin: PluginType) -> Self {
        self.modules.entry(path.into()).or_default().push(plugin);
        self
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load(&self, path: &Path) -> PluginResult<Vec<PluginType>> {
        self.modules
            .get(path)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(format!("no module registered for {}", path.display())))
    }
}

/// Collects the plugin libraries and plugin directories directly under a directory
#[derive(Debug, Clone)]
pub struct DirectoryCollector {
    dir: PathBuf,
}

impl DirectoryCollector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LibraryCollector for DirectoryCollector {
    fn describe(&self) -> String {
        format!("{}/*", self.dir.display())
    }

    fn collect(&self) -> PluginResult<Vec<PathBuf>> {
        if !self.dir.exists() {
            tracing::warn!("Plugin directory does not exist: {}", self.dir.display());
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| PluginError::Load(format!("Failed to read plugin directory: {}", e)))?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();

            // Skip hidden entries
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    continue;
                }
            }

            let is_library = path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == std::env::consts::DLL_EXTENSION);
            let is_plugin_dir = path.is_dir() && path.join(MANIFEST_FILE).exists();

            if is_library || is_plugin_dir {
                found.push(path);
            }
        }

        found.sort();
        Ok(found)
    }
}
