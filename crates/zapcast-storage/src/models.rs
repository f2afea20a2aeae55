//! Database models for Zapcast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use zapcast_common::types::{CampaignId, ContactId, InstanceId, MediaAttachment, UserId};

// ============================================================================
// Instances
// ============================================================================

/// A sending account on the messaging gateway
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub user_id: UserId,
    pub instance_name: String,
    /// Gateway base URL; falls back to the configured default
    pub api_url: Option<String>,
    /// Gateway API key; falls back to the configured default
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub phone_number: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create instance input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstance {
    pub user_id: UserId,
    pub instance_name: String,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub phone_number: Option<String>,
}

// ============================================================================
// Campaigns
// ============================================================================

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    /// Whether a run has ended and only an explicit restart reopens it
    pub fn is_finished(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Cancelled)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Pending => write!(f, "pending"),
            CampaignStatus::Running => write!(f, "running"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CampaignStatus::Pending),
            "running" => Ok(CampaignStatus::Running),
            "completed" => Ok(CampaignStatus::Completed),
            "cancelled" => Ok(CampaignStatus::Cancelled),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub user_id: UserId,
    pub instance_id: InstanceId,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// Media attached to every message of this campaign
    pub fn media(&self) -> Option<MediaAttachment> {
        MediaAttachment::from_parts(self.media_url.as_deref(), self.media_type.as_deref())
    }

    /// Contacts already processed (sent or failed)
    pub fn processed_count(&self) -> i32 {
        self.sent_count + self.failed_count
    }

    /// Calculate progress percentage
    pub fn progress_percentage(&self) -> f64 {
        if self.total_contacts == 0 {
            0.0
        } else {
            (self.processed_count() as f64 / self.total_contacts as f64) * 100.0
        }
    }
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub user_id: UserId,
    pub instance_id: InstanceId,
    pub name: String,
    pub message_template: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub delay_min_secs: i32,
    pub delay_max_secs: i32,
}

/// Campaign statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStats {
    pub campaign_id: CampaignId,
    pub status: String,
    pub total_contacts: i32,
    pub pending: i64,
    pub sent: i32,
    pub failed: i32,
    pub delivered: i32,
    pub progress_percentage: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Campaign contacts
// ============================================================================

/// Per-contact delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Pending,
    Sent,
    Failed,
}

impl std::fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactStatus::Pending => write!(f, "pending"),
            ContactStatus::Sent => write!(f, "sent"),
            ContactStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ContactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ContactStatus::Pending),
            "sent" => Ok(ContactStatus::Sent),
            "failed" => Ok(ContactStatus::Failed),
            _ => Err(format!("Invalid contact status: {}", s)),
        }
    }
}

/// One recipient within a campaign
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignContact {
    pub id: ContactId,
    pub campaign_id: CampaignId,
    pub seq: i64,
    /// Normalized, digits only
    pub phone: String,
    pub name: Option<String>,
    pub variables: serde_json::Value,
    pub status: String,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CampaignContact {
    /// Get status enum
    pub fn status_enum(&self) -> Option<ContactStatus> {
        self.status.parse().ok()
    }

    /// Template variables as plain strings. Non-string JSON values are
    /// rendered with their JSON text; anything that is not an object
    /// yields an empty map.
    pub fn variables_map(&self) -> BTreeMap<String, String> {
        match &self.variables {
            serde_json::Value::Object(map) => map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect(),
            _ => BTreeMap::new(),
        }
    }
}

/// Contact to insert into a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCampaignContact {
    pub phone: String,
    pub name: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}
