//! lintas-bot - a plugin-driven chat bot host
//!
//! A [`BotHost`] wires a gateway client to a typed [`EventBus`], loads
//! plugins, and brings everything up through a phased startup session.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;

pub use application::errors::{BotError, ConfigError, LifecycleHook, PluginError, PluginResult};
pub use application::events::{EventBus, EventMapper, Listener};
pub use application::host::{BotHost, BotHostBuilder, BotState, HostHandle, SessionTask};
pub use application::services::{Registry, ServiceCollection, ServiceProvider};
pub use domain::traits::{GatewayClient, RawEvent, RawEventKind};
pub use plugins::{ConstructPlugin, Plugin, PluginContext, PluginManager};
