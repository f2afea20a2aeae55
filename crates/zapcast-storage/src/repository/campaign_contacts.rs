//! Campaign contact repository

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use zapcast_common::types::CampaignId;

use crate::models::{CampaignContact, ContactStatus, NewCampaignContact};

/// Campaign contact repository
#[derive(Clone)]
pub struct CampaignContactRepository {
    pool: PgPool,
}

impl CampaignContactRepository {
    /// Create a new campaign contact repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert contacts in list order and refresh the campaign's
    /// `total_contacts`. Phones already in the campaign are skipped.
    ///
    /// Returns the number of rows inserted.
    pub async fn insert_batch(
        &self,
        campaign_id: CampaignId,
        contacts: &[NewCampaignContact],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let count = insert_contacts(&mut tx, campaign_id, contacts).await?;
        tx.commit().await?;
        Ok(count)
    }

    /// List contacts of a campaign in dispatch order
    pub async fn list_by_campaign(
        &self,
        campaign_id: CampaignId,
        status: Option<ContactStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CampaignContact>, sqlx::Error> {
        if let Some(status) = status {
            sqlx::query_as::<_, CampaignContact>(
                r#"
                SELECT * FROM campaign_contacts
                WHERE campaign_id = $1 AND status = $2
                ORDER BY seq ASC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(campaign_id)
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, CampaignContact>(
                r#"
                SELECT * FROM campaign_contacts
                WHERE campaign_id = $1
                ORDER BY seq ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(campaign_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Count contacts of a campaign, optionally by status
    pub async fn count_by_campaign(
        &self,
        campaign_id: CampaignId,
        status: Option<ContactStatus>,
    ) -> Result<i64, sqlx::Error> {
        let count: (i64,) = if let Some(status) = status {
            sqlx::query_as(
                "SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id = $1 AND status = $2",
            )
            .bind(campaign_id)
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_as("SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id = $1")
                .bind(campaign_id)
                .fetch_one(&self.pool)
                .await?
        };
        Ok(count.0)
    }
}

/// Insert `contacts` and refresh `total_contacts` on the caller's connection
pub(crate) async fn insert_contacts(
    conn: &mut PgConnection,
    campaign_id: CampaignId,
    contacts: &[NewCampaignContact],
) -> Result<u64, sqlx::Error> {
    let mut count = 0u64;

    for contact in contacts {
        let variables =
            serde_json::to_value(&contact.variables).unwrap_or_else(|_| serde_json::json!({}));

        let result = sqlx::query(
            r#"
            INSERT INTO campaign_contacts (id, campaign_id, phone, name, variables)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (campaign_id, phone) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(campaign_id)
        .bind(&contact.phone)
        .bind(&contact.name)
        .bind(&variables)
        .execute(&mut *conn)
        .await?;

        count += result.rows_affected();
    }

    sqlx::query(
        r#"
        UPDATE campaigns SET
            total_contacts = (SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id = $1),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(campaign_id)
    .execute(&mut *conn)
    .await?;

    Ok(count)
}
