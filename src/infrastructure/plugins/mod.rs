//! Plugin loading infrastructure
//!
//! Plugins on disk are shared libraries exporting an entry function, either
//! as a bare library file or inside a directory with a `plugin.yaml` manifest.

pub mod loader;
pub mod manifest;

pub use loader::{
    DirectoryCollector, ModuleLoader, NativeModuleLoader, PluginEntryFn, StaticModuleLoader,
    DEFAULT_ENTRY_SYMBOL,
};
pub use manifest::{PluginManifest, MANIFEST_FILE};
