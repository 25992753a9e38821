//! Application services - dependency registration for plugins

pub mod registry;

pub use registry::{Registry, ServiceCollection, ServiceProvider};
