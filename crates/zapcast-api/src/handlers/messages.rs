//! One-off message handlers

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use zapcast_common::types::MediaAttachment;
use zapcast_storage::InstanceDirectory;

use super::{api_error, common_error, dispatch_error, not_found, ApiError};
use crate::auth::{require_owner, AppState, AuthContext};

/// Request body for sending a single message
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub instance_id: Uuid,
    pub phone: String,
    #[serde(default)]
    pub message: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
}

/// Send response carrying the gateway acknowledgement
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub status: String,
    pub response: Value,
}

/// Send one message outside any campaign
///
/// POST /api/v1/messages/send
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let media = MediaAttachment::from_parts(req.media_url.as_deref(), req.media_type.as_deref());
    if req.message.trim().is_empty() && media.is_none() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "message or media_url is required",
        ));
    }

    let instance = state
        .instances
        .instance(req.instance_id)
        .await
        .map_err(common_error)?
        .ok_or_else(|| not_found("Instance"))?;
    require_owner(&auth, instance.user_id).map_err(|_| not_found("Instance"))?;

    let response = state
        .manager
        .dispatcher()
        .dispatch_single(instance.id, &req.phone, &req.message, media.as_ref())
        .await
        .map_err(dispatch_error)?;

    info!("Message sent via instance {}", instance.instance_name);

    Ok(Json(SendMessageResponse {
        status: "sent".to_string(),
        response,
    }))
}
