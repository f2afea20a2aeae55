//! Campaign run state
//!
//! The dispatcher reads and writes campaign progress only through
//! [`CampaignStateStore`], so its control flow can run against an
//! in-memory store in tests.

use crate::db::DatabasePool;
use crate::models::{Campaign, CampaignContact};
use async_trait::async_trait;
use zapcast_common::types::{CampaignId, ContactId};
use zapcast_common::{Error, Result};

/// Progress state of campaigns and their contacts
#[async_trait]
pub trait CampaignStateStore: Send + Sync {
    /// Get a campaign by ID
    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>>;

    /// Contacts still `pending`, in list order
    async fn pending_contacts(&self, campaign_id: CampaignId) -> Result<Vec<CampaignContact>>;

    /// Atomically move a campaign from `pending` to `running` and stamp
    /// `started_at`. Returns `false` if the campaign was not `pending`.
    async fn begin_run(&self, campaign_id: CampaignId) -> Result<bool>;

    /// Mark a pending contact `sent` and bump `sent_count`.
    /// Returns `false` if the contact was not pending.
    async fn mark_contact_sent(&self, campaign_id: CampaignId, contact_id: ContactId)
        -> Result<bool>;

    /// Mark a pending contact `failed` with the error text and bump
    /// `failed_count`. Returns `false` if the contact was not pending.
    async fn mark_contact_failed(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        error: &str,
    ) -> Result<bool>;

    /// Move a `running` campaign to `completed`, recounting the counters
    /// from contact rows and stamping `completed_at`.
    async fn complete_run(&self, campaign_id: CampaignId) -> Result<Option<Campaign>>;

    /// Move a `pending` or `running` campaign to `cancelled`. Contacts not
    /// yet processed stay `pending`.
    async fn cancel_run(&self, campaign_id: CampaignId) -> Result<Option<Campaign>>;
}

/// PostgreSQL-backed campaign state
#[derive(Clone)]
pub struct DbCampaignStateStore {
    pool: DatabasePool,
}

impl DbCampaignStateStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn mark_contact(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        error: Option<&str>,
    ) -> Result<bool> {
        let (status, counter) = match error {
            None => ("sent", "sent_count"),
            Some(_) => ("failed", "failed_count"),
        };

        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let updated = sqlx::query(
            r#"
            UPDATE campaign_contacts SET
                status = $3,
                error_message = $4,
                sent_at = CASE WHEN $3 = 'sent' THEN NOW() ELSE sent_at END
            WHERE id = $1 AND campaign_id = $2 AND status = 'pending'
            "#,
        )
        .bind(contact_id)
        .bind(campaign_id)
        .bind(status)
        .bind(error)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if updated.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
            return Ok(false);
        }

        // counter column comes from the match above, never from input
        let sql = format!(
            "UPDATE campaigns SET {counter} = {counter} + 1, updated_at = NOW() WHERE id = $1"
        );
        sqlx::query(&sql)
            .bind(campaign_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(true)
    }

    async fn finish_run(&self, campaign_id: CampaignId, from: &str, to: &str) -> Result<Option<Campaign>> {
        let sql = format!(
            r#"
            UPDATE campaigns c SET
                status = $2,
                sent_count = (SELECT COUNT(*) FROM campaign_contacts
                              WHERE campaign_id = c.id AND status = 'sent'),
                failed_count = (SELECT COUNT(*) FROM campaign_contacts
                                WHERE campaign_id = c.id AND status = 'failed'),
                completed_at = NOW(),
                updated_at = NOW()
            WHERE c.id = $1 AND c.status IN ({from})
            RETURNING *
            "#
        );

        sqlx::query_as::<_, Campaign>(&sql)
            .bind(campaign_id)
            .bind(to)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

#[async_trait]
impl CampaignStateStore for DbCampaignStateStore {
    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn pending_contacts(&self, campaign_id: CampaignId) -> Result<Vec<CampaignContact>> {
        sqlx::query_as::<_, CampaignContact>(
            r#"
            SELECT * FROM campaign_contacts
            WHERE campaign_id = $1 AND status = 'pending'
            ORDER BY seq ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn begin_run(&self, campaign_id: CampaignId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                status = 'running',
                started_at = NOW(),
                completed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(campaign_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_contact_sent(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<bool> {
        self.mark_contact(campaign_id, contact_id, None).await
    }

    async fn mark_contact_failed(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        error: &str,
    ) -> Result<bool> {
        self.mark_contact(campaign_id, contact_id, Some(error)).await
    }

    async fn complete_run(&self, campaign_id: CampaignId) -> Result<Option<Campaign>> {
        self.finish_run(campaign_id, "'running'", "completed").await
    }

    async fn cancel_run(&self, campaign_id: CampaignId) -> Result<Option<Campaign>> {
        self.finish_run(campaign_id, "'pending', 'running'", "cancelled")
            .await
    }
}
