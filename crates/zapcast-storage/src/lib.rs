//! Zapcast Storage - PostgreSQL persistence
//!
//! Row models, repositories, and the store traits the campaign
//! dispatcher runs against.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
