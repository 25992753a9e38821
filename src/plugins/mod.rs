//! Plugin system for lintas-bot
//!
//! Plugins are declared as instances, constructible types or on-disk
//! libraries, resolved when the host starts, and driven through their
//! `initialize` and `start` hooks in load order.

pub mod builtin;
pub mod manager;
pub mod trait_def;

pub use manager::PluginManager;
pub use trait_def::{
    ConstructPlugin, LibraryCollector, Plugin, PluginCatalog, PluginContext, PluginInfo,
    PluginOrigin, PluginSource, PluginType,
};
