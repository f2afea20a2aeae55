//! Campaign dispatch - Paced, partial-failure tolerant delivery

mod dispatcher;
mod pacing;
mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{
    BulkDispatchRequest, CampaignDispatcher, DispatchError, DispatchOutcome, DispatchReport,
    DispatchResult,
};
pub use pacing::{DelayBounds, DelayStrategy, NoDelay, UniformDelay};
pub use registry::{DispatchRegistry, RegisteredRun};
