//! Zapcast Core - WhatsApp campaign dispatch
//!
//! Contact list parsing, message personalization, the messaging gateway
//! client and the paced campaign dispatcher.

pub mod campaign;
pub mod contacts;
pub mod dispatch;
pub mod gateway;
pub mod personalize;

pub use campaign::{CampaignError, CampaignManager};
pub use contacts::{ContactListParser, ContactParseReport, ParsedContact};
pub use dispatch::{
    BulkDispatchRequest, CampaignDispatcher, DelayBounds, DelayStrategy, DispatchError,
    DispatchOutcome, DispatchRegistry, DispatchReport, DispatchResult, NoDelay, UniformDelay,
};
pub use gateway::{
    EvolutionGatewayClient, GatewayDirectory, GatewayError, GatewayTarget, MessageGateway,
};
pub use personalize::MessagePersonalizer;
