//! Plugins shipped with the host

pub mod event_log;

pub use event_log::EventLogPlugin;
