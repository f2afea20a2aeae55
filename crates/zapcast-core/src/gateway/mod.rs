//! Messaging gateway integration

mod client;
mod directory;

pub use client::{EvolutionGatewayClient, GatewayError, GatewayTarget, MessageGateway};
pub use directory::GatewayDirectory;
