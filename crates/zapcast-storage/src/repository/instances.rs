//! Gateway instance repository

use crate::db::DatabasePool;
use crate::models::{CreateInstance, Instance};
use async_trait::async_trait;
use uuid::Uuid;
use zapcast_common::types::{InstanceId, UserId};
use zapcast_common::{Error, Result};

/// Lookup of sending accounts by id
#[async_trait]
pub trait InstanceDirectory: Send + Sync {
    /// Get an instance by ID
    async fn instance(&self, id: InstanceId) -> Result<Option<Instance>>;
}

/// Database instance repository
#[derive(Clone)]
pub struct DbInstanceRepository {
    pool: DatabasePool,
}

impl DbInstanceRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Register a new instance
    pub async fn create(&self, input: CreateInstance) -> Result<Instance> {
        sqlx::query_as::<_, Instance>(
            r#"
            INSERT INTO instances (id, user_id, instance_name, api_url, api_key, phone_number)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(&input.instance_name)
        .bind(&input.api_url)
        .bind(&input.api_key)
        .bind(&input.phone_number)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Error::Conflict(format!(
                "Instance {} already exists",
                input.instance_name
            )),
            other => Error::Database(other.to_string()),
        })
    }

    /// List instances owned by a user
    pub async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Instance>> {
        sqlx::query_as::<_, Instance>(
            "SELECT * FROM instances WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}

#[async_trait]
impl InstanceDirectory for DbInstanceRepository {
    async fn instance(&self, id: InstanceId) -> Result<Option<Instance>> {
        sqlx::query_as::<_, Instance>("SELECT * FROM instances WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
