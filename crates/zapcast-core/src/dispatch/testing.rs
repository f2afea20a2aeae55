//! In-memory fakes for dispatcher tests

use crate::gateway::{GatewayError, GatewayTarget, MessageGateway};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use zapcast_common::types::{CampaignId, ContactId, InstanceId, MediaAttachment};
use zapcast_common::{Error, Result};
use zapcast_storage::models::{Campaign, CampaignContact, Instance};
use zapcast_storage::{CampaignStateStore, InstanceDirectory};

#[derive(Default)]
struct State {
    campaigns: HashMap<CampaignId, Campaign>,
    contacts: Vec<CampaignContact>,
}

/// Campaign state kept in memory, with the same transition rules as the
/// database store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    failing_marks: AtomicUsize,
}

impl MemoryStore {
    /// Add a pending campaign with one pending contact per entry
    pub fn seed(&self, instance_id: InstanceId, contacts: &[(&str, Option<&str>, Value)]) -> CampaignId {
        let campaign_id = Uuid::new_v4();
        let mut state = self.state.lock().unwrap();

        for (i, (phone, name, variables)) in contacts.iter().enumerate() {
            state.contacts.push(CampaignContact {
                id: Uuid::new_v4(),
                campaign_id,
                seq: i as i64 + 1,
                phone: phone.to_string(),
                name: name.map(str::to_string),
                variables: variables.clone(),
                status: "pending".to_string(),
                error_message: None,
                sent_at: None,
                created_at: Utc::now(),
            });
        }

        state.campaigns.insert(
            campaign_id,
            Campaign {
                id: campaign_id,
                user_id: Uuid::new_v4(),
                instance_id,
                name: "test".to_string(),
                message_template: "Oi {{nome}}".to_string(),
                media_url: None,
                media_type: None,
                delay_min_secs: 0,
                delay_max_secs: 0,
                status: "pending".to_string(),
                total_contacts: contacts.len() as i32,
                sent_count: 0,
                failed_count: 0,
                delivered_count: 0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                started_at: None,
                completed_at: None,
            },
        );

        campaign_id
    }

    pub fn campaign_now(&self, id: CampaignId) -> Campaign {
        self.state.lock().unwrap().campaigns[&id].clone()
    }

    pub fn contacts_now(&self, id: CampaignId) -> Vec<CampaignContact> {
        self.state
            .lock()
            .unwrap()
            .contacts
            .iter()
            .filter(|c| c.campaign_id == id)
            .cloned()
            .collect()
    }

    pub fn set_status(&self, id: CampaignId, status: &str) {
        if let Some(c) = self.state.lock().unwrap().campaigns.get_mut(&id) {
            c.status = status.to_string();
        }
    }

    /// Make the next `count` contact marks fail with a database error
    pub fn fail_next_marks(&self, count: usize) {
        self.failing_marks.store(count, Ordering::SeqCst);
    }

    fn mark_failure(&self) -> Result<()> {
        let failing = self
            .failing_marks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match failing {
            Ok(_) => Err(Error::Database("connection reset by peer".to_string())),
            Err(_) => Ok(()),
        }
    }

    pub fn set_delays(&self, id: CampaignId, min_secs: i32, max_secs: i32) {
        if let Some(c) = self.state.lock().unwrap().campaigns.get_mut(&id) {
            c.delay_min_secs = min_secs;
            c.delay_max_secs = max_secs;
        }
    }

    fn mark(&self, campaign_id: CampaignId, contact_id: ContactId, error: Option<&str>) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(contact) = state
            .contacts
            .iter_mut()
            .find(|c| c.id == contact_id && c.campaign_id == campaign_id && c.status == "pending")
        else {
            return false;
        };

        match error {
            None => {
                contact.status = "sent".to_string();
                contact.sent_at = Some(Utc::now());
            }
            Some(e) => {
                contact.status = "failed".to_string();
                contact.error_message = Some(e.to_string());
            }
        }

        if let Some(campaign) = state.campaigns.get_mut(&campaign_id) {
            match error {
                None => campaign.sent_count += 1,
                Some(_) => campaign.failed_count += 1,
            }
        }
        true
    }

    fn finish(&self, id: CampaignId, from: &[&str], to: &str) -> Option<Campaign> {
        let mut state = self.state.lock().unwrap();
        let count = |status: &str| {
            state
                .contacts
                .iter()
                .filter(|c| c.campaign_id == id && c.status == status)
                .count() as i32
        };
        let (sent, failed) = (count("sent"), count("failed"));

        let campaign = state.campaigns.get_mut(&id)?;
        if !from.contains(&campaign.status.as_str()) {
            return None;
        }
        campaign.status = to.to_string();
        campaign.sent_count = sent;
        campaign.failed_count = failed;
        campaign.completed_at = Some(Utc::now());
        Some(campaign.clone())
    }
}

#[async_trait]
impl CampaignStateStore for MemoryStore {
    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.state.lock().unwrap().campaigns.get(&id).cloned())
    }

    async fn pending_contacts(&self, campaign_id: CampaignId) -> Result<Vec<CampaignContact>> {
        let mut pending: Vec<_> = self
            .contacts_now(campaign_id)
            .into_iter()
            .filter(|c| c.status == "pending")
            .collect();
        pending.sort_by_key(|c| c.seq);
        Ok(pending)
    }

    async fn begin_run(&self, campaign_id: CampaignId) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        match state.campaigns.get_mut(&campaign_id) {
            Some(c) if c.status == "pending" => {
                c.status = "running".to_string();
                c.started_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_contact_sent(&self, campaign_id: CampaignId, contact_id: ContactId) -> Result<bool> {
        self.mark_failure()?;
        Ok(self.mark(campaign_id, contact_id, None))
    }

    async fn mark_contact_failed(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        error: &str,
    ) -> Result<bool> {
        self.mark_failure()?;
        Ok(self.mark(campaign_id, contact_id, Some(error)))
    }

    async fn complete_run(&self, campaign_id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.finish(campaign_id, &["running"], "completed"))
    }

    async fn cancel_run(&self, campaign_id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.finish(campaign_id, &["pending", "running"], "cancelled"))
    }
}

/// Instance directory holding fixed rows
#[derive(Default)]
pub struct MemoryInstances {
    instances: Mutex<HashMap<InstanceId, Instance>>,
}

impl MemoryInstances {
    pub fn add(&self, api_url: Option<&str>, api_key: Option<&str>) -> InstanceId {
        let id = Uuid::new_v4();
        self.instances.lock().unwrap().insert(
            id,
            Instance {
                id,
                user_id: Uuid::new_v4(),
                instance_name: "vendas".to_string(),
                api_url: api_url.map(str::to_string),
                api_key: api_key.map(str::to_string),
                phone_number: None,
                status: "active".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
        id
    }
}

#[async_trait]
impl InstanceDirectory for MemoryInstances {
    async fn instance(&self, id: InstanceId) -> Result<Option<Instance>> {
        Ok(self.instances.lock().unwrap().get(&id).cloned())
    }
}

/// A message the fake gateway received
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub phone: String,
    pub text: String,
    pub media: Option<MediaAttachment>,
    pub at: tokio::time::Instant,
}

/// Gateway that records every call and rejects chosen phones
#[derive(Default)]
pub struct FakeGateway {
    failing: HashSet<String>,
    sent: Mutex<Vec<SentMessage>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl FakeGateway {
    pub fn failing(phones: &[&str]) -> Self {
        Self {
            failing: phones.iter().map(|p| p.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Cancel `token` once `calls` messages have been attempted
    pub fn cancel_after(&self, calls: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((calls, token));
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageGateway for FakeGateway {
    async fn send(
        &self,
        _target: &GatewayTarget,
        phone: &str,
        text: &str,
        media: Option<&MediaAttachment>,
    ) -> std::result::Result<Value, GatewayError> {
        let calls = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(SentMessage {
                phone: phone.to_string(),
                text: text.to_string(),
                media: media.cloned(),
                at: tokio::time::Instant::now(),
            });
            sent.len()
        };

        if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if calls >= *after {
                token.cancel();
            }
        }

        if self.failing.contains(phone) {
            return Err(GatewayError::Rejected {
                status: 400,
                body: format!(r#"{{"error":"{} is not on WhatsApp"}}"#, phone),
            });
        }

        Ok(json!({ "key": { "id": format!("MSG-{}", calls) }, "status": "PENDING" }))
    }
}

/// Convenience bundle used by the dispatcher and manager tests
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub instances: Arc<MemoryInstances>,
    pub gateway: Arc<FakeGateway>,
}

impl Harness {
    pub fn new(gateway: FakeGateway) -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
            instances: Arc::new(MemoryInstances::default()),
            gateway: Arc::new(gateway),
        }
    }
}
