//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use zapcast_core::{ContactParseReport, DispatchReport, ParsedContact};
use zapcast_storage::models::{
    Campaign, CampaignContact, CampaignStats, CampaignStatus, ContactStatus, CreateCampaign,
};
use zapcast_storage::InstanceDirectory;

use super::contacts::content_type;
use super::{api_error, campaign_error, common_error, internal_error, not_found, ApiError};
use crate::auth::{require_owner, AppState, AuthContext};

/// Query parameters for listing campaigns or contacts
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

const MAX_PAGE_SIZE: i64 = 500;

impl ListQuery {
    /// `limit` clamped to `1..=500` and a non-negative `offset`
    fn page(&self) -> (i64, i64) {
        (self.limit.clamp(1, MAX_PAGE_SIZE), self.offset.max(0))
    }
}

/// Paginated list response
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Campaign response
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub name: String,
    pub message_template: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub delay_min_secs: i32,
    pub delay_max_secs: i32,
    pub status: String,
    pub total_contacts: i32,
    pub sent_count: i32,
    pub failed_count: i32,
    pub delivered_count: i32,
    pub progress_percentage: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        let progress = c.progress_percentage();
        Self {
            id: c.id,
            instance_id: c.instance_id,
            name: c.name,
            message_template: c.message_template,
            media_url: c.media_url,
            media_type: c.media_type,
            delay_min_secs: c.delay_min_secs,
            delay_max_secs: c.delay_max_secs,
            status: c.status,
            total_contacts: c.total_contacts,
            sent_count: c.sent_count,
            failed_count: c.failed_count,
            delivered_count: c.delivered_count,
            progress_percentage: progress,
            started_at: c.started_at,
            completed_at: c.completed_at,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Campaign contact response
#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub id: Uuid,
    pub phone: String,
    pub name: Option<String>,
    pub variables: Value,
    pub status: String,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl From<CampaignContact> for ContactResponse {
    fn from(c: CampaignContact) -> Self {
        Self {
            id: c.id,
            phone: c.phone,
            name: c.name,
            variables: c.variables,
            status: c.status,
            error_message: c.error_message,
            sent_at: c.sent_at,
        }
    }
}

/// A contact given inline in a request body
#[derive(Debug, Deserialize)]
pub struct ContactInput {
    pub phone: String,
    pub name: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Request body for creating a campaign
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub instance_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub message_template: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub delay_min_secs: Option<i32>,
    pub delay_max_secs: Option<i32>,
    #[serde(default)]
    pub contacts: Vec<ContactInput>,
    /// Raw contact list, parsed like an upload
    pub contact_file: Option<String>,
    pub contact_file_type: Option<String>,
}

/// Outcome of loading contacts into a campaign
#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Rows actually stored; duplicates are not
    pub inserted: u64,
    pub invalid_contacts: Vec<ParsedContact>,
}

impl ImportSummary {
    fn new(report: ContactParseReport, inserted: u64) -> Self {
        Self {
            total: report.total,
            valid: report.valid,
            invalid: report.invalid,
            inserted,
            invalid_contacts: report.contacts.into_iter().filter(|c| !c.is_valid).collect(),
        }
    }
}

/// Response of campaign creation
#[derive(Debug, Serialize)]
pub struct CreateCampaignResponse {
    pub campaign: CampaignResponse,
    pub contacts: ImportSummary,
}

/// Request body for dispatching a campaign
#[derive(Debug, Default, Deserialize)]
pub struct DispatchCampaignRequest {
    /// Pre-rendered messages keyed by phone
    #[serde(default)]
    pub custom_messages: HashMap<String, String>,
}

fn parse_status<T: std::str::FromStr>(status: Option<&str>) -> Result<Option<T>, ApiError> {
    status
        .map(|s| {
            s.parse::<T>().map_err(|_| {
                api_error(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "validation_error",
                    format!("Unknown status: {}", s),
                )
            })
        })
        .transpose()
}

fn saturate(secs: u32) -> i32 {
    i32::try_from(secs).unwrap_or(i32::MAX)
}

async fn owned_campaign(
    state: &AppState,
    auth: &AuthContext,
    campaign_id: Uuid,
) -> Result<Campaign, ApiError> {
    state
        .manager
        .campaigns()
        .get_for_user(auth.user_id, campaign_id)
        .await
        .map_err(|e| internal_error("Failed to get campaign", e))?
        .ok_or_else(|| not_found("Campaign"))
}

/// List campaigns
///
/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<CampaignResponse>>, ApiError> {
    let status = parse_status::<CampaignStatus>(query.status.as_deref())?;
    let (limit, offset) = query.page();
    let repo = state.manager.campaigns();

    let campaigns = repo
        .list_by_user(auth.user_id, status, limit, offset)
        .await
        .map_err(|e| internal_error("Failed to list campaigns", e))?;

    let total = repo
        .count_by_user(auth.user_id, status)
        .await
        .map_err(|e| internal_error("Failed to count campaigns", e))?;

    Ok(Json(ListResponse {
        data: campaigns.into_iter().map(CampaignResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Create a campaign with its contacts
///
/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CreateCampaignResponse>), ApiError> {
    let instance = state
        .instances
        .instance(req.instance_id)
        .await
        .map_err(common_error)?
        .ok_or_else(|| not_found("Instance"))?;
    require_owner(&auth, instance.user_id).map_err(|_| not_found("Instance"))?;

    let mut parsed = match &req.contact_file {
        Some(file) => {
            let file_type = req.contact_file_type.as_deref().unwrap_or("text/plain");
            state.parser.parse(file, file_type).contacts
        }
        None => Vec::new(),
    };
    parsed.extend(
        req.contacts
            .into_iter()
            .map(|c| state.parser.contact(&c.phone, c.name, c.variables)),
    );
    let report = ContactParseReport::from_contacts(parsed);

    let defaults = &state.config.dispatch;
    let input = CreateCampaign {
        user_id: auth.user_id,
        instance_id: instance.id,
        name: req.name.trim().to_string(),
        message_template: req.message_template,
        media_url: req.media_url,
        media_type: req.media_type,
        delay_min_secs: req
            .delay_min_secs
            .unwrap_or_else(|| saturate(defaults.default_delay_min_secs)),
        delay_max_secs: req
            .delay_max_secs
            .unwrap_or_else(|| saturate(defaults.default_delay_max_secs)),
    };

    let (campaign, inserted) = state
        .manager
        .create_campaign(input, report.valid_contacts())
        .await
        .map_err(campaign_error)?;

    info!(
        "Campaign {} created by user {} ({} of {} contacts valid)",
        campaign.id, auth.user_id, report.valid, report.total
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateCampaignResponse {
            campaign: campaign.into(),
            contacts: ImportSummary::new(report, inserted),
        }),
    ))
}

/// Get a campaign
///
/// GET /api/v1/campaigns/:campaign_id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = owned_campaign(&state, &auth, campaign_id).await?;
    Ok(Json(campaign.into()))
}

/// Get campaign statistics
///
/// GET /api/v1/campaigns/:campaign_id/stats
pub async fn get_campaign_stats(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignStats>, ApiError> {
    state
        .manager
        .stats(auth.user_id, campaign_id)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// List a campaign's contacts in dispatch order
///
/// GET /api/v1/campaigns/:campaign_id/contacts
pub async fn list_campaign_contacts(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<ContactResponse>>, ApiError> {
    owned_campaign(&state, &auth, campaign_id).await?;
    let status = parse_status::<ContactStatus>(query.status.as_deref())?;
    let (limit, offset) = query.page();
    let repo = state.manager.contacts();

    let contacts = repo
        .list_by_campaign(campaign_id, status, limit, offset)
        .await
        .map_err(|e| internal_error("Failed to list contacts", e))?;

    let total = repo
        .count_by_campaign(campaign_id, status)
        .await
        .map_err(|e| internal_error("Failed to count contacts", e))?;

    Ok(Json(ListResponse {
        data: contacts.into_iter().map(ContactResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Add an uploaded contact list to a pending campaign
///
/// POST /api/v1/campaigns/:campaign_id/contacts/import
pub async fn import_campaign_contacts(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<ImportSummary>, ApiError> {
    let report = state.parser.parse(&body, content_type(&headers));

    let inserted = state
        .manager
        .import_contacts(auth.user_id, campaign_id, report.valid_contacts())
        .await
        .map_err(campaign_error)?;

    Ok(Json(ImportSummary::new(report, inserted)))
}

/// Run a campaign and return its delivery report once every pending
/// contact has been attempted
///
/// POST /api/v1/campaigns/:campaign_id/dispatch
pub async fn dispatch_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
    body: Option<Json<DispatchCampaignRequest>>,
) -> Result<Json<DispatchReport>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    state
        .manager
        .dispatch(auth.user_id, campaign_id, req.custom_messages)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// Cancel a pending or running campaign
///
/// POST /api/v1/campaigns/:campaign_id/cancel
pub async fn cancel_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    state
        .manager
        .cancel(auth.user_id, campaign_id)
        .await
        .map(|c| Json(c.into()))
        .map_err(campaign_error)
}

/// Reopen a finished campaign
///
/// POST /api/v1/campaigns/:campaign_id/restart
pub async fn restart_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    state
        .manager
        .restart(auth.user_id, campaign_id)
        .await
        .map(|c| Json(c.into()))
        .map_err(campaign_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(
            parse_status::<CampaignStatus>(Some("running")).unwrap(),
            Some(CampaignStatus::Running)
        );
        assert_eq!(parse_status::<ContactStatus>(None).unwrap(), None);

        let (status, _) = parse_status::<CampaignStatus>(Some("paused")).unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_list_query_page_is_clamped() {
        let query = |limit, offset| ListQuery {
            status: None,
            limit,
            offset,
        };

        assert_eq!(query(50, 10).page(), (50, 10));
        assert_eq!(query(-5, -1).page(), (1, 0));
        assert_eq!(query(0, 0).page(), (1, 0));
        assert_eq!(query(i64::MAX, 0).page(), (500, 0));
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateCampaignRequest = serde_json::from_value(serde_json::json!({
            "instance_id": Uuid::nil(),
            "name": "Promo",
            "contacts": [{ "phone": "11987654321" }]
        }))
        .unwrap();

        assert_eq!(req.message_template, "");
        assert_eq!(req.delay_min_secs, None);
        assert!(req.contacts[0].variables.is_empty());
    }
}
