//! Campaign Manager - Handles campaign lifecycle around the dispatcher

use crate::dispatch::{
    BulkDispatchRequest, CampaignDispatcher, DelayBounds, DispatchError, DispatchRegistry,
    DispatchReport,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use zapcast_common::types::{CampaignId, UserId};
use zapcast_storage::db::DatabasePool;
use zapcast_storage::models::{Campaign, CampaignStats, CreateCampaign, NewCampaignContact};
use zapcast_storage::repository::{
    CampaignContactRepository, CampaignRepository, CampaignStateStore,
};

/// Campaign manager errors
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Campaign is already running")]
    AlreadyRunning,

    #[error("Campaign is {status}, cannot {action}")]
    InvalidState {
        status: String,
        action: &'static str,
    },

    #[error("No valid contacts")]
    NoValidContacts,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Dispatch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Store(#[from] zapcast_common::Error),
}

/// Campaign Manager - Manages campaign lifecycle
pub struct CampaignManager {
    campaign_repo: CampaignRepository,
    contact_repo: CampaignContactRepository,
    store: Arc<dyn CampaignStateStore>,
    dispatcher: Arc<CampaignDispatcher>,
    registry: Arc<DispatchRegistry>,
}

impl CampaignManager {
    /// Create a new campaign manager
    pub fn new(
        db_pool: &DatabasePool,
        store: Arc<dyn CampaignStateStore>,
        dispatcher: Arc<CampaignDispatcher>,
    ) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            campaign_repo: CampaignRepository::new(pool.clone()),
            contact_repo: CampaignContactRepository::new(pool),
            store,
            dispatcher,
            registry: Arc::new(DispatchRegistry::new()),
        }
    }

    pub fn registry(&self) -> Arc<DispatchRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn dispatcher(&self) -> &CampaignDispatcher {
        &self.dispatcher
    }

    pub fn campaigns(&self) -> &CampaignRepository {
        &self.campaign_repo
    }

    pub fn contacts(&self) -> &CampaignContactRepository {
        &self.contact_repo
    }

    /// Create a pending campaign holding `contacts`.
    ///
    /// Duplicate phones collapse into the first occurrence.
    pub async fn create_campaign(
        &self,
        input: CreateCampaign,
        contacts: Vec<NewCampaignContact>,
    ) -> Result<(Campaign, u64), CampaignError> {
        validate_campaign(&input)?;
        if contacts.is_empty() {
            return Err(CampaignError::NoValidContacts);
        }

        let (campaign, inserted) = self.campaign_repo.create(input, &contacts).await?;

        info!(
            "Campaign {} created with {} contacts",
            campaign.id, inserted
        );

        Ok((campaign, inserted))
    }

    /// Add contacts to a campaign that has not started yet
    pub async fn import_contacts(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        contacts: Vec<NewCampaignContact>,
    ) -> Result<u64, CampaignError> {
        let campaign = self
            .campaign_repo
            .get_for_user(user_id, campaign_id)
            .await?
            .ok_or(CampaignError::NotFound)?;

        if campaign.status != "pending" {
            return Err(CampaignError::InvalidState {
                status: campaign.status,
                action: "import contacts",
            });
        }
        if contacts.is_empty() {
            return Err(CampaignError::NoValidContacts);
        }

        let inserted = self.contact_repo.insert_batch(campaign_id, &contacts).await?;
        info!("Imported {} contacts into campaign {}", inserted, campaign_id);

        Ok(inserted)
    }

    /// Run a campaign to completion and return its report.
    ///
    /// The run lives in its own task and keeps going when the caller goes
    /// away, so the campaign always reaches `completed` or `cancelled`.
    /// `custom_messages` maps phone numbers to pre-rendered texts that
    /// replace the template for those contacts.
    pub async fn dispatch(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        custom_messages: HashMap<String, String>,
    ) -> Result<DispatchReport, CampaignError> {
        let campaign = self.owned_campaign(user_id, campaign_id).await?;

        let run = self
            .registry
            .register(campaign_id)
            .ok_or(CampaignError::AlreadyRunning)?;

        let request =
            BulkDispatchRequest::for_campaign(&campaign)?.with_custom_messages(custom_messages);

        let dispatcher = Arc::clone(&self.dispatcher);
        let handle = tokio::spawn(async move {
            let report = dispatcher.dispatch_bulk(&request, run.token()).await;
            drop(run);
            report
        });

        match handle.await? {
            Err(DispatchError::NotPending { status, .. }) if status == "running" => {
                Err(CampaignError::AlreadyRunning)
            }
            Err(DispatchError::NotPending { status, .. }) => Err(CampaignError::InvalidState {
                status,
                action: "dispatch",
            }),
            other => other.map_err(CampaignError::from),
        }
    }

    /// Cancel a pending or running campaign.
    ///
    /// A run in this process is signalled and stops before its next
    /// message. Contacts not yet attempted stay pending.
    pub async fn cancel(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Campaign, CampaignError> {
        let campaign = self.owned_campaign(user_id, campaign_id).await?;

        let signalled = self.registry.cancel(campaign_id);
        if !signalled && campaign.status == "running" {
            warn!(
                "Campaign {} is running but not in this process; marking cancelled",
                campaign_id
            );
        }

        match self.store.cancel_run(campaign_id).await? {
            Some(cancelled) => {
                info!("Campaign {} cancelled", campaign_id);
                Ok(cancelled)
            }
            None => {
                let current = self
                    .store
                    .campaign(campaign_id)
                    .await?
                    .ok_or(CampaignError::NotFound)?;

                // the signalled run may have finalized the cancellation first
                if signalled && current.status == "cancelled" {
                    info!("Campaign {} cancelled", campaign_id);
                    return Ok(current);
                }

                Err(CampaignError::InvalidState {
                    status: current.status,
                    action: "cancel",
                })
            }
        }
    }

    /// Put a completed or cancelled campaign back to pending with every
    /// contact pending again
    pub async fn restart(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Campaign, CampaignError> {
        let campaign = self
            .campaign_repo
            .get_for_user(user_id, campaign_id)
            .await?
            .ok_or(CampaignError::NotFound)?;

        if self.registry.is_running(campaign_id) {
            return Err(CampaignError::AlreadyRunning);
        }
        if !campaign.status_enum().is_some_and(|s| s.is_finished()) {
            return Err(CampaignError::InvalidState {
                status: campaign.status,
                action: "restart",
            });
        }

        match self.campaign_repo.reset_for_restart(campaign_id).await? {
            Some(restarted) => {
                info!("Campaign {} restarted", campaign_id);
                Ok(restarted)
            }
            None => Err(CampaignError::InvalidState {
                status: campaign.status,
                action: "restart",
            }),
        }
    }

    /// Statistics for a campaign owned by `user_id`
    pub async fn stats(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<CampaignStats, CampaignError> {
        self.campaign_repo
            .get_for_user(user_id, campaign_id)
            .await?
            .ok_or(CampaignError::NotFound)?;

        self.campaign_repo
            .stats(campaign_id)
            .await?
            .ok_or(CampaignError::NotFound)
    }

    /// Return campaigns left `running` by a crashed process to `pending`.
    ///
    /// Only campaigns started more than `older_than` ago and not running in
    /// this process are touched. A later dispatch resumes their pending
    /// contacts.
    pub async fn recover_stalled(
        &self,
        older_than: Duration,
    ) -> Result<Vec<CampaignId>, CampaignError> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| CampaignError::Validation(e.to_string()))?;
        let cutoff = Utc::now() - age;

        let mut recovered = self.campaign_repo.reset_stalled(cutoff).await?;
        recovered.retain(|id| !self.registry.is_running(*id));

        for id in &recovered {
            warn!("Campaign {} was stalled in running; reset to pending", id);
        }

        Ok(recovered)
    }

    async fn owned_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Campaign, CampaignError> {
        self.store
            .campaign(campaign_id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or(CampaignError::NotFound)
    }
}

fn validate_campaign(input: &CreateCampaign) -> Result<(), CampaignError> {
    if input.name.trim().is_empty() {
        return Err(CampaignError::Validation("name is required".to_string()));
    }
    if input.message_template.trim().is_empty() && input.media_url.is_none() {
        return Err(CampaignError::Validation(
            "a message template or media is required".to_string(),
        ));
    }
    DelayBounds::from_secs(input.delay_min_secs.into(), input.delay_max_secs.into())
        .map_err(|e| CampaignError::Validation(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::{FakeGateway, Harness};
    use crate::dispatch::{DelayStrategy, NoDelay, UniformDelay};
    use crate::gateway::GatewayDirectory;
    use serde_json::json;
    use zapcast_common::config::GatewayConfig;

    fn manager(h: &Harness) -> CampaignManager {
        manager_with_pacing(h, Arc::new(NoDelay))
    }

    fn manager_with_pacing(h: &Harness, pacing: Arc<dyn DelayStrategy>) -> CampaignManager {
        let db = DatabasePool::connect_lazy("postgres://localhost/zapcast_test").unwrap();
        let gateways = GatewayDirectory::new(h.instances.clone(), GatewayConfig::default());
        let dispatcher = CampaignDispatcher::new(h.store.clone(), gateways, h.gateway.clone())
            .with_pacing(pacing);
        CampaignManager::new(&db, h.store.clone(), Arc::new(dispatcher))
    }

    fn seeded(h: &Harness) -> (UserId, CampaignId) {
        let instance = h.instances.add(Some("http://gw"), Some("key"));
        let id = h.store.seed(
            instance,
            &[
                ("5511900000001", Some("Ana"), json!({})),
                ("5511900000002", None, json!({})),
            ],
        );
        (h.store.campaign_now(id).user_id, id)
    }

    fn create_input() -> CreateCampaign {
        CreateCampaign {
            user_id: uuid::Uuid::new_v4(),
            instance_id: uuid::Uuid::new_v4(),
            name: "Black Friday".to_string(),
            message_template: "Oi {{nome}}".to_string(),
            media_url: None,
            media_type: None,
            delay_min_secs: 5,
            delay_max_secs: 15,
        }
    }

    #[tokio::test]
    async fn test_dispatch_runs_owned_campaign() {
        let h = Harness::new(FakeGateway::default());
        let (user, id) = seeded(&h);
        let m = manager(&h);

        let report = m.dispatch(user, id, HashMap::new()).await.unwrap();
        assert_eq!(report.sent, 2);
        assert!(!m.registry().is_running(id));
        assert_eq!(h.store.campaign_now(id).status, "completed");
    }

    #[tokio::test]
    async fn test_dispatch_hides_other_users_campaigns() {
        let h = Harness::new(FakeGateway::default());
        let (_, id) = seeded(&h);

        let err = manager(&h)
            .dispatch(uuid::Uuid::new_v4(), id, HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::NotFound));
        assert!(h.gateway.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_finishes_after_caller_goes_away() {
        let h = Harness::new(FakeGateway::default());
        let (user, id) = seeded(&h);
        h.store.set_delays(id, 10, 10);
        let m = manager_with_pacing(&h, Arc::new(UniformDelay));

        let caller = tokio::time::timeout(
            Duration::from_secs(5),
            m.dispatch(user, id, HashMap::new()),
        )
        .await;
        assert!(caller.is_err());
        assert_eq!(h.gateway.sent().len(), 1);

        while m.registry().is_running(id) {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        let campaign = h.store.campaign_now(id);
        assert_eq!(campaign.status, "completed");
        assert_eq!(campaign.sent_count, 2);
        assert_eq!(h.gateway.sent().len(), 2);

        let err = m.dispatch(user, id, HashMap::new()).await.unwrap_err();
        assert!(matches!(
            err,
            CampaignError::Dispatch(DispatchError::NoPendingContacts(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_refuses_concurrent_run() {
        let h = Harness::new(FakeGateway::default());
        let (user, id) = seeded(&h);
        let m = manager(&h);

        let held = m.registry().register(id).unwrap();
        let err = m.dispatch(user, id, HashMap::new()).await.unwrap_err();
        assert!(matches!(err, CampaignError::AlreadyRunning));

        h.store.set_status(id, "running");
        drop(held);
        let err = m.dispatch(user, id, HashMap::new()).await.unwrap_err();
        assert!(matches!(err, CampaignError::AlreadyRunning));
        assert!(h.gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_completed_campaign_is_a_precondition_error() {
        let h = Harness::new(FakeGateway::default());
        let (user, id) = seeded(&h);
        let m = manager(&h);

        m.dispatch(user, id, HashMap::new()).await.unwrap();
        let err = m.dispatch(user, id, HashMap::new()).await.unwrap_err();
        assert!(matches!(
            err,
            CampaignError::Dispatch(DispatchError::NoPendingContacts(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_pending_campaign() {
        let h = Harness::new(FakeGateway::default());
        let (user, id) = seeded(&h);
        let m = manager(&h);

        let cancelled = m.cancel(user, id).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");

        let err = m.cancel(user, id).await.unwrap_err();
        assert!(matches!(err, CampaignError::InvalidState { ref status, .. } if status == "cancelled"));
    }

    #[tokio::test]
    async fn test_cancel_signals_local_run() {
        let h = Harness::new(FakeGateway::default());
        let (user, id) = seeded(&h);
        let m = manager(&h);

        let run = m.registry().register(id).unwrap();
        h.store.set_status(id, "running");

        let cancelled = m.cancel(user, id).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
        assert!(run.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_succeeds_when_run_finalized_first() {
        let h = Harness::new(FakeGateway::default());
        let (user, id) = seeded(&h);
        let m = manager(&h);

        let run = m.registry().register(id).unwrap();
        // the woken run already committed its own cancel_run
        h.store.set_status(id, "cancelled");

        let cancelled = m.cancel(user, id).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
        assert!(run.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_create_campaign_validates_before_writing() {
        let h = Harness::new(FakeGateway::default());
        let m = manager(&h);
        let contact = NewCampaignContact {
            phone: "5511900000001".to_string(),
            name: None,
            variables: Default::default(),
        };

        let err = m.create_campaign(create_input(), vec![]).await.unwrap_err();
        assert!(matches!(err, CampaignError::NoValidContacts));

        let mut input = create_input();
        input.delay_min_secs = 20;
        let err = m.create_campaign(input, vec![contact.clone()]).await.unwrap_err();
        assert!(matches!(err, CampaignError::Validation(_)));

        let mut input = create_input();
        input.message_template = "  ".to_string();
        let err = m.create_campaign(input, vec![contact]).await.unwrap_err();
        assert!(matches!(err, CampaignError::Validation(_)));
    }
}
