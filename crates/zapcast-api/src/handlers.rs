//! API request handlers

pub mod campaigns;
pub mod contacts;
pub mod health;
pub mod instances;
pub mod messages;

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::error;
use zapcast_core::{CampaignError, DispatchError, GatewayError};

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Error half of every handler result
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

pub fn not_found(what: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", format!("{} not found", what))
}

pub fn internal_error(context: &str, err: impl std::fmt::Display) -> ApiError {
    error!("{}: {}", context, err);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", context)
}

/// Map a shared error onto its HTTP status and code
pub fn common_error(err: zapcast_common::Error) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    api_error(status, &err.code().to_lowercase(), err.to_string())
}

pub fn dispatch_error(err: DispatchError) -> ApiError {
    match err {
        DispatchError::CampaignNotFound(_) => not_found("Campaign"),
        DispatchError::Config(msg) => api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "gateway_not_configured",
            msg,
        ),
        e @ DispatchError::NoPendingContacts(_) => {
            api_error(StatusCode::CONFLICT, "no_pending_contacts", e.to_string())
        }
        e @ DispatchError::NotPending { .. } => {
            api_error(StatusCode::CONFLICT, "invalid_state", e.to_string())
        }
        e @ (DispatchError::InvalidDelay { .. } | DispatchError::InvalidPhone(_)) => {
            api_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", e.to_string())
        }
        DispatchError::Gateway(e) => gateway_error(e),
        DispatchError::Store(e) => common_error(e),
    }
}

fn gateway_error(err: GatewayError) -> ApiError {
    match err {
        GatewayError::Client(msg) => internal_error("Gateway client unavailable", msg),
        e => api_error(StatusCode::BAD_GATEWAY, "gateway_error", e.to_string()),
    }
}

pub fn campaign_error(err: CampaignError) -> ApiError {
    match err {
        CampaignError::NotFound => not_found("Campaign"),
        e @ (CampaignError::AlreadyRunning | CampaignError::InvalidState { .. }) => {
            api_error(StatusCode::CONFLICT, "invalid_state", e.to_string())
        }
        e @ (CampaignError::NoValidContacts | CampaignError::Validation(_)) => {
            api_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", e.to_string())
        }
        CampaignError::Dispatch(e) => dispatch_error(e),
        CampaignError::Database(e) => internal_error("Database error", e),
        CampaignError::Task(e) => internal_error("Dispatch task failed", e),
        CampaignError::Store(e) => common_error(e),
    }
}
