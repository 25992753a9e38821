//! Gateway adapters - concrete clients behind the `GatewayClient` boundary

pub mod console;
pub mod handlers;
pub mod telegram;

pub use console::ConsoleGateway;
pub use handlers::HandlerTable;
pub use telegram::TelegramGateway;
