//! Application layer - Orchestration and event distribution
//!
//! This layer contains:
//! - Errors: Host, plugin and configuration errors
//! - Events: Typed event bus and gateway event mapping
//! - Services: Dependency registry handed to plugins
//! - Host: The phased startup orchestrator

pub mod errors;
pub mod events;
pub mod host;
pub mod services;
