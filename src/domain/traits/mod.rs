//! Domain traits - Abstractions for infrastructure implementations

pub mod gateway;

pub use gateway::{GatewayClient, RawEvent, RawEventHandler, RawEventKind};
