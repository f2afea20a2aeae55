//! Campaign lifecycle
//!
//! Creation, contact import, dispatch, cancellation, restart and
//! recovery of runs interrupted by a crash.

mod manager;

pub use manager::{CampaignError, CampaignManager};
