//! Campaign Dispatcher - Sends a campaign to its pending contacts
//!
//! One message is in flight at a time, in contact list order, with a
//! random pause between consecutive messages. A failed send is recorded on
//! its contact and the run moves on.

use super::pacing::{DelayBounds, DelayStrategy, UniformDelay};
use crate::gateway::{GatewayDirectory, GatewayError, MessageGateway};
use crate::personalize::MessagePersonalizer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zapcast_common::phone::{normalize_phone_with, DEFAULT_COUNTRY_CODE};
use zapcast_common::types::{CampaignId, ContactId, InstanceId, MediaAttachment};
use zapcast_storage::models::Campaign;
use zapcast_storage::CampaignStateStore;

/// Attempts to store one contact's outcome before giving up
const MARK_ATTEMPTS: u32 = 3;

/// Pause before the next attempt, multiplied by the attempt number
const MARK_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Errors that abort a dispatch before any message is sent
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Campaign {0} not found")]
    CampaignNotFound(CampaignId),

    #[error("Campaign {0} has no pending contacts")]
    NoPendingContacts(CampaignId),

    #[error("Campaign {campaign_id} is {status}, only pending campaigns can be dispatched")]
    NotPending {
        campaign_id: CampaignId,
        status: String,
    },

    #[error("Invalid delay bounds: min {min}s, max {max}s")]
    InvalidDelay { min: i64, max: i64 },

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Storage error: {0}")]
    Store(zapcast_common::Error),
}

impl From<zapcast_common::Error> for DispatchError {
    fn from(err: zapcast_common::Error) -> Self {
        match err {
            zapcast_common::Error::Config(msg) => DispatchError::Config(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Outcome of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    Failed,
}

/// Per-contact entry of a dispatch report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub contact_id: ContactId,
    pub phone: String,
    pub status: DispatchOutcome,
    /// Gateway acknowledgement, when sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Error text, when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of a bulk dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    pub campaign_id: CampaignId,
    pub sent: usize,
    pub failed: usize,
    /// Whether the run stopped early on a cancellation request
    pub cancelled: bool,
    /// Contacts left pending by a cancelled run
    pub remaining: usize,
    /// Contacts whose outcome could not be stored. Their rows stay
    /// `pending` and the stored counters leave them out.
    pub unrecorded: usize,
    pub results: Vec<DispatchResult>,
}

impl DispatchReport {
    fn new(campaign_id: CampaignId) -> Self {
        Self {
            campaign_id,
            sent: 0,
            failed: 0,
            cancelled: false,
            remaining: 0,
            unrecorded: 0,
            results: Vec::new(),
        }
    }

    fn push(&mut self, result: DispatchResult) {
        match result.status {
            DispatchOutcome::Sent => self.sent += 1,
            DispatchOutcome::Failed => self.failed += 1,
        }
        self.results.push(result);
    }
}

/// Parameters of a bulk dispatch
#[derive(Debug, Clone)]
pub struct BulkDispatchRequest {
    pub campaign_id: CampaignId,
    pub instance_id: InstanceId,
    pub template: String,
    pub media: Option<MediaAttachment>,
    pub delay: DelayBounds,
    /// Prefer `custom_messages` over the template where one exists
    pub use_custom_message: bool,
    /// Pre-rendered messages keyed by phone number
    pub custom_messages: HashMap<String, String>,
}

impl BulkDispatchRequest {
    /// Request built from a campaign's stored settings
    pub fn for_campaign(campaign: &Campaign) -> Result<Self, DispatchError> {
        Ok(Self {
            campaign_id: campaign.id,
            instance_id: campaign.instance_id,
            template: campaign.message_template.clone(),
            media: campaign.media(),
            delay: DelayBounds::from_secs(
                campaign.delay_min_secs.into(),
                campaign.delay_max_secs.into(),
            )?,
            use_custom_message: false,
            custom_messages: HashMap::new(),
        })
    }

    /// Use pre-rendered messages keyed by phone
    pub fn with_custom_messages(mut self, messages: HashMap<String, String>) -> Self {
        self.use_custom_message = !messages.is_empty();
        self.custom_messages = messages;
        self
    }
}

/// Campaign Dispatcher
pub struct CampaignDispatcher {
    store: Arc<dyn CampaignStateStore>,
    gateways: GatewayDirectory,
    gateway: Arc<dyn MessageGateway>,
    pacing: Arc<dyn DelayStrategy>,
    personalizer: MessagePersonalizer,
    country_code: String,
}

impl CampaignDispatcher {
    /// Create a new dispatcher with uniform random pacing
    pub fn new(
        store: Arc<dyn CampaignStateStore>,
        gateways: GatewayDirectory,
        gateway: Arc<dyn MessageGateway>,
    ) -> Self {
        Self {
            store,
            gateways,
            gateway,
            pacing: Arc::new(UniformDelay),
            personalizer: MessagePersonalizer::new(),
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
        }
    }

    /// Set the pacing strategy
    pub fn with_pacing(mut self, pacing: Arc<dyn DelayStrategy>) -> Self {
        self.pacing = pacing;
        self
    }

    /// Set the country code used to normalize phone numbers
    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = country_code.into();
        self
    }

    /// Send one message outside any campaign. No pacing, no bookkeeping.
    pub async fn dispatch_single(
        &self,
        instance_id: InstanceId,
        phone: &str,
        message: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<Value, DispatchError> {
        let target = self.gateways.resolve(instance_id).await?;

        let normalized = normalize_phone_with(phone, &self.country_code);
        if !normalized.is_valid {
            return Err(DispatchError::InvalidPhone(phone.to_string()));
        }

        debug!("Sending single message to {}", normalized.normalized);

        Ok(self
            .gateway
            .send(&target, &normalized.normalized, message, media)
            .await?)
    }

    /// Send a campaign to every pending contact.
    ///
    /// Fails before sending anything when the gateway cannot be resolved,
    /// the campaign has no pending contacts, or another run holds it.
    /// Per-contact failures only show up in the report. Cancelling `cancel`
    /// stops the run before the next message; unsent contacts stay pending
    /// and the campaign ends `cancelled`.
    pub async fn dispatch_bulk(
        &self,
        request: &BulkDispatchRequest,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, DispatchError> {
        let campaign_id = request.campaign_id;

        let campaign = self
            .store
            .campaign(campaign_id)
            .await?
            .ok_or(DispatchError::CampaignNotFound(campaign_id))?;

        let target = self.gateways.resolve(request.instance_id).await?;

        let contacts = self.store.pending_contacts(campaign_id).await?;
        if contacts.is_empty() {
            return Err(DispatchError::NoPendingContacts(campaign_id));
        }

        if !self.store.begin_run(campaign_id).await? {
            return Err(DispatchError::NotPending {
                campaign_id,
                status: campaign.status,
            });
        }

        let custom_messages = self.custom_message_lookup(request);
        let total = contacts.len();

        info!(
            "Campaign {} running: {} contacts via instance {}",
            campaign_id, total, target.instance_name
        );

        let mut report = DispatchReport::new(campaign_id);

        for (index, contact) in contacts.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let custom = custom_messages.get(&contact.phone).map(String::as_str);
            let text = self.personalizer.personalize(
                &request.template,
                &contact.variables_map(),
                contact.name.as_deref(),
                custom,
            );

            match self
                .gateway
                .send(&target, &contact.phone, &text, request.media.as_ref())
                .await
            {
                Ok(ack) => {
                    debug!("Campaign {}: sent to {}", campaign_id, contact.phone);
                    if !self.record_outcome(campaign_id, contact.id, None).await {
                        report.unrecorded += 1;
                    }
                    report.push(DispatchResult {
                        contact_id: contact.id,
                        phone: contact.phone.clone(),
                        status: DispatchOutcome::Sent,
                        response: Some(ack),
                        error: None,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!("Campaign {}: failed to send to {}: {}", campaign_id, contact.phone, message);
                    if !self
                        .record_outcome(campaign_id, contact.id, Some(&message))
                        .await
                    {
                        report.unrecorded += 1;
                    }
                    report.push(DispatchResult {
                        contact_id: contact.id,
                        phone: contact.phone.clone(),
                        status: DispatchOutcome::Failed,
                        response: None,
                        error: Some(message),
                    });
                }
            }

            if index + 1 < total {
                let delay = self.pacing.next_delay(request.delay);
                debug!("Campaign {}: waiting {:?} before next message", campaign_id, delay);

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        report.remaining = total - report.results.len();

        let finished = if report.cancelled {
            self.store.cancel_run(campaign_id).await
        } else {
            self.store.complete_run(campaign_id).await
        };

        match finished {
            Ok(Some(_)) => {}
            // cancelled from outside; the canceller already set the status
            Ok(None) if report.cancelled => {}
            Ok(None) => warn!(
                "Campaign {} changed status during the run; final status not applied",
                campaign_id
            ),
            Err(e) => error!("Failed to finalize campaign {}: {}", campaign_id, e),
        }

        if report.unrecorded > 0 {
            error!(
                "Campaign {}: {} outcomes were not stored; stored counters are short by that many",
                campaign_id, report.unrecorded
            );
        }

        info!(
            "Campaign {} {}: {} sent, {} failed, {} remaining",
            campaign_id,
            if report.cancelled { "cancelled" } else { "completed" },
            report.sent,
            report.failed,
            report.remaining
        );

        Ok(report)
    }

    /// Store the outcome of one contact, retrying transient store errors.
    ///
    /// Returns `false` when every attempt failed. The message is not sent
    /// again, so the contact must not be retried by a later run.
    async fn record_outcome(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        error: Option<&str>,
    ) -> bool {
        for attempt in 1..=MARK_ATTEMPTS {
            let marked = match error {
                None => self.store.mark_contact_sent(campaign_id, contact_id).await,
                Some(e) => {
                    self.store
                        .mark_contact_failed(campaign_id, contact_id, e)
                        .await
                }
            };

            match marked {
                Ok(_) => return true,
                Err(e) if attempt < MARK_ATTEMPTS => {
                    warn!(
                        "Failed to record contact {} (attempt {}/{}): {}",
                        contact_id, attempt, MARK_ATTEMPTS, e
                    );
                    tokio::time::sleep(MARK_RETRY_BACKOFF * attempt).await;
                }
                Err(e) => {
                    error!(
                        "Giving up recording contact {} after {} attempts: {}",
                        contact_id, MARK_ATTEMPTS, e
                    );
                }
            }
        }
        false
    }

    /// Custom messages keyed by normalized phone, or empty when disabled
    fn custom_message_lookup(&self, request: &BulkDispatchRequest) -> HashMap<String, String> {
        if !request.use_custom_message {
            return HashMap::new();
        }

        request
            .custom_messages
            .iter()
            .map(|(phone, message)| {
                (
                    normalize_phone_with(phone, &self.country_code).normalized,
                    message.clone(),
                )
            })
            .collect()
    }
}
