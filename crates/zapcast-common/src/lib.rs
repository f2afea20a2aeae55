//! Zapcast Common - Shared types and utilities
//!
//! This crate provides configuration, the shared error type, identifier
//! aliases and phone number normalization used by every Zapcast component.

pub mod config;
pub mod error;
pub mod phone;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use phone::{normalize_phone, NormalizedPhone};
