//! Gateway instance handlers

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use zapcast_storage::models::{CreateInstance, Instance};

use super::{api_error, common_error, ApiError};
use crate::auth::{AppState, AuthContext};

/// Instance response. The gateway key is never echoed back.
#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    pub id: Uuid,
    pub instance_name: String,
    pub api_url: Option<String>,
    pub has_api_key: bool,
    pub phone_number: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Instance> for InstanceResponse {
    fn from(i: Instance) -> Self {
        Self {
            id: i.id,
            instance_name: i.instance_name,
            api_url: i.api_url,
            has_api_key: i.api_key.is_some(),
            phone_number: i.phone_number,
            status: i.status,
            created_at: i.created_at,
        }
    }
}

/// Request body for registering an instance
#[derive(Debug, Deserialize)]
pub struct CreateInstanceRequest {
    pub instance_name: String,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub phone_number: Option<String>,
}

/// List the caller's instances
///
/// GET /api/v1/instances
pub async fn list_instances(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<InstanceResponse>>, ApiError> {
    let instances = state
        .instances
        .list_by_user(auth.user_id)
        .await
        .map_err(common_error)?;

    Ok(Json(instances.into_iter().map(InstanceResponse::from).collect()))
}

/// Register an instance
///
/// POST /api/v1/instances
pub async fn create_instance(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateInstanceRequest>,
) -> Result<(StatusCode, Json<InstanceResponse>), ApiError> {
    let instance_name = req.instance_name.trim();
    if instance_name.is_empty() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "instance_name is required",
        ));
    }

    let instance = state
        .instances
        .create(CreateInstance {
            user_id: auth.user_id,
            instance_name: instance_name.to_string(),
            api_url: req.api_url,
            api_key: req.api_key,
            phone_number: req.phone_number,
        })
        .await
        .map_err(common_error)?;

    info!("Instance {} registered", instance.id);

    Ok((StatusCode::CREATED, Json(instance.into())))
}
