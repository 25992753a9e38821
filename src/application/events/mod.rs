//! Event distribution - the typed bus and the gateway event mapper

pub mod bus;
pub mod mapper;

pub use bus::{EventBus, Listener};
pub use mapper::EventMapper;
