//! Domain layer - Core types with no infrastructure dependencies
//!
//! This layer contains:
//! - Entities: Core business objects (User, Message)
//! - Events: Typed application events carried by the event bus
//! - Traits: Abstractions for infrastructure (GatewayClient)

pub mod entities;
pub mod events;
pub mod traits;
