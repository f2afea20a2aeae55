//! Zapcast API - REST API server
//!
//! API-key authenticated endpoints for one-off sends, contact list
//! parsing, instances and campaigns.

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::AppState;
pub use routes::create_router;
