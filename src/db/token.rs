//! Refresh token records.
//!
//! A refresh token is only honoured while the record whose id it carries as
//! `jti` exists. Access tokens are stateless and never looked up here.

use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::sqlite::SqlitePool;

use crate::jwt::REFRESH_TOKEN_DURATION_SECS;

/// A persisted refresh token record.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    /// Unix seconds
    pub expires_at: i64,
    pub created_at: String,
}

/// Store for refresh token records.
#[derive(Clone)]
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a record for `user_id` expiring one refresh-token lifetime from
    /// now.
    pub async fn persist(&self, user_id: i64) -> Result<RefreshTokenRecord, sqlx::Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.create(user_id, (now + REFRESH_TOKEN_DURATION_SECS) as i64)
            .await
    }

    /// Create a record with an explicit expiry.
    pub async fn create(
        &self,
        user_id: i64,
        expires_at: i64,
    ) -> Result<RefreshTokenRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO refresh_tokens (user_id, expires_at) VALUES (?, ?)
             RETURNING id, user_id, expires_at, created_at",
        )
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<RefreshTokenRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, user_id, expires_at, created_at FROM refresh_tokens WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a record. Returns false if it was already gone.
    pub async fn revoke(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every record that expired before `now` (unix seconds).
    pub async fn delete_expired(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete all records for a user (logout everywhere).
    pub async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_for_user(&self, user_id: i64) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
