//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Adapters: Gateway clients (console, Telegram)
//! - Plugins: Dynamic plugin library loading

pub mod adapters;
pub mod config;
pub mod plugins;
