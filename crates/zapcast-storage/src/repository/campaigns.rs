//! Campaign repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use zapcast_common::types::{CampaignId, UserId};

use super::campaign_contacts::insert_contacts;
use crate::models::{Campaign, CampaignStats, CampaignStatus, CreateCampaign, NewCampaignContact};

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    pool: PgPool,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a `pending` campaign together with its contacts.
    ///
    /// Both land in one transaction, so a failed contact insert leaves no
    /// campaign behind. Returns the campaign and the number of contacts
    /// inserted.
    pub async fn create(
        &self,
        input: CreateCampaign,
        contacts: &[NewCampaignContact],
    ) -> Result<(Campaign, u64), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO campaigns (
                id, user_id, instance_id, name, message_template,
                media_url, media_type, delay_min_secs, delay_max_secs
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(input.instance_id)
        .bind(&input.name)
        .bind(&input.message_template)
        .bind(&input.media_url)
        .bind(&input.media_type)
        .bind(input.delay_min_secs)
        .bind(input.delay_max_secs)
        .fetch_one(&mut *tx)
        .await?;

        let inserted = insert_contacts(&mut tx, id.0, contacts).await?;

        let campaign = sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((campaign, inserted))
    }

    /// Get a campaign by ID
    pub async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a campaign by ID and owner
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        id: CampaignId,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List campaigns for a user
    pub async fn list_by_user(
        &self,
        user_id: UserId,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        if let Some(status) = status {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                WHERE user_id = $1 AND status = $2
                ORDER BY created_at DESC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(user_id)
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                WHERE user_id = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Count campaigns for a user
    pub async fn count_by_user(
        &self,
        user_id: UserId,
        status: Option<CampaignStatus>,
    ) -> Result<i64, sqlx::Error> {
        let count: (i64,) = if let Some(status) = status {
            sqlx::query_as("SELECT COUNT(*) FROM campaigns WHERE user_id = $1 AND status = $2")
                .bind(user_id)
                .bind(status.to_string())
                .fetch_one(&self.pool)
                .await?
        } else {
            sqlx::query_as("SELECT COUNT(*) FROM campaigns WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?
        };
        Ok(count.0)
    }

    /// Reopen a completed or cancelled campaign: every contact goes back
    /// to `pending` and the counters restart from zero.
    ///
    /// Returns `None` when the campaign does not exist or is not finished.
    pub async fn reset_for_restart(&self, id: CampaignId) -> Result<Option<Campaign>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let campaign = sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = 'pending',
                sent_count = 0,
                failed_count = 0,
                delivered_count = 0,
                started_at = NULL,
                completed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('completed', 'cancelled')
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if campaign.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE campaign_contacts SET
                status = 'pending',
                error_message = NULL,
                sent_at = NULL
            WHERE campaign_id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(campaign)
    }

    /// Put campaigns stuck in `running` since before `started_before` back
    /// to `pending`, with counters recomputed from contact rows. A re-run
    /// then picks up the contacts that are still pending.
    pub async fn reset_stalled(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<CampaignId>, sqlx::Error> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE campaigns c SET
                status = 'pending',
                sent_count = (SELECT COUNT(*) FROM campaign_contacts
                              WHERE campaign_id = c.id AND status = 'sent'),
                failed_count = (SELECT COUNT(*) FROM campaign_contacts
                                WHERE campaign_id = c.id AND status = 'failed'),
                updated_at = NOW()
            WHERE c.status = 'running' AND c.started_at < $1
            RETURNING c.id
            "#,
        )
        .bind(started_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Aggregate statistics for a campaign
    pub async fn stats(&self, id: CampaignId) -> Result<Option<CampaignStats>, sqlx::Error> {
        let Some(campaign) = self.get(id).await? else {
            return Ok(None);
        };

        let pending: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id = $1 AND status = 'pending'",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(CampaignStats {
            campaign_id: campaign.id,
            status: campaign.status.clone(),
            total_contacts: campaign.total_contacts,
            pending: pending.0,
            sent: campaign.sent_count,
            failed: campaign.failed_count,
            delivered: campaign.delivered_count,
            progress_percentage: campaign.progress_percentage(),
            started_at: campaign.started_at,
            completed_at: campaign.completed_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabasePool;
    use std::collections::BTreeMap;

    /// Pool for the database named by `ZAPCAST_TEST_DATABASE_URL`, if any
    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("ZAPCAST_TEST_DATABASE_URL").ok()?;
        let db = DatabasePool::connect_lazy(&url).ok()?;
        db.migrate().await.ok()?;
        Some(db.pool().clone())
    }

    fn contact(phone: &str, name: &str) -> NewCampaignContact {
        NewCampaignContact {
            phone: phone.to_string(),
            name: Some(name.to_string()),
            variables: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_create_leaves_nothing_when_contacts_fail() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let repo = CampaignRepository::new(pool.clone());
        let user_id = Uuid::new_v4();
        let instance_id = Uuid::new_v4();

        sqlx::query("INSERT INTO instances (id, user_id, instance_name) VALUES ($1, $2, 'vendas')")
            .bind(instance_id)
            .bind(user_id)
            .execute(&pool)
            .await
            .unwrap();

        let input = CreateCampaign {
            user_id,
            instance_id,
            name: "Promo".to_string(),
            message_template: "Oi {{nome}}".to_string(),
            media_url: None,
            media_type: None,
            delay_min_secs: 5,
            delay_max_secs: 15,
        };

        // Postgres refuses NUL bytes in text columns
        let contacts = [contact("5511900000001", "Ana"), contact("5511900000002", "B\0ia")];
        assert!(repo.create(input.clone(), &contacts).await.is_err());
        assert_eq!(repo.count_by_user(user_id, None).await.unwrap(), 0);

        let (campaign, inserted) = repo.create(input, &contacts[..1]).await.unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(campaign.total_contacts, 1);
        assert_eq!(repo.count_by_user(user_id, None).await.unwrap(), 1);
    }
}
