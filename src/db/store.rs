use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::tokens::OneTimeTokenKind;
use crate::db::models::User;
use crate::error::AppError;

const USER_COLUMNS: &str = "id, email, username, password_hash, role, is_email_verified, \
     email_verification_token, email_verification_expiry, \
     password_reset_token, password_reset_expiry, \
     refresh_token, created_at, updated_at";

/// Persistence seam for User records. The auth service only ever goes
/// through this trait, so tests can substitute a mock store.
///
/// The write operations are partial updates: each touches only the fields
/// named in its contract and performs no whole-record validation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<User, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, AppError>;

    /// Overwrite the stored refresh token, invalidating the previous one.
    /// Touches only `refresh_token` and `updated_at`.
    async fn store_refresh_token(&self, user_id: Uuid, refresh_token: &str)
        -> Result<(), AppError>;

    /// Clear the stored refresh token (logout). Clearing an already-empty
    /// field is a no-op success. Touches only `refresh_token` and
    /// `updated_at`.
    async fn clear_refresh_token(&self, user_id: Uuid) -> Result<(), AppError>;

    /// Store a one-time token digest and expiry in the field pair selected
    /// by `kind`. Touches only those two fields and `updated_at`.
    async fn store_one_time_token(
        &self,
        user_id: Uuid,
        kind: OneTimeTokenKind,
        digest: &str,
        expiry: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Atomically consume an email-verification token: the single UPDATE
    /// matches on digest and unexpired expiry, marks the email verified and
    /// clears the token fields. Returns the updated user, or `None` when no
    /// row matched (unknown digest and expired digest are indistinguishable).
    async fn consume_verification_token(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError>;

    /// Atomically consume a password-reset token, installing the new
    /// password hash and clearing the token fields. Same matching rules as
    /// `consume_verification_token`.
    async fn consume_reset_token(
        &self,
        digest: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError>;
}

pub struct PgUserStore {
    pool: Arc<PgPool>,
}

impl PgUserStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        Ok(Self { pool: Arc::new(pool) })
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(&self, user: &User) -> Result<User, AppError> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, username, password_hash, role, is_email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.is_email_verified)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 OR username = $2"
        ))
        .bind(email)
        .bind(username)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        refresh_token: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(refresh_token)
            .bind(Utc::now())
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn clear_refresh_token(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET refresh_token = NULL, updated_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(Utc::now())
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn store_one_time_token(
        &self,
        user_id: Uuid,
        kind: OneTimeTokenKind,
        digest: &str,
        expiry: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let sql = match kind {
            OneTimeTokenKind::EmailVerification => {
                "UPDATE users SET email_verification_token = $2, email_verification_expiry = $3, updated_at = $4 WHERE id = $1"
            }
            OneTimeTokenKind::PasswordReset => {
                "UPDATE users SET password_reset_token = $2, password_reset_expiry = $3, updated_at = $4 WHERE id = $1"
            }
        };

        sqlx::query(sql)
            .bind(user_id)
            .bind(digest)
            .bind(expiry)
            .bind(Utc::now())
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn consume_verification_token(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET is_email_verified = TRUE,
                email_verification_token = NULL,
                email_verification_expiry = NULL,
                updated_at = $2
            WHERE email_verification_token = $1
              AND email_verification_expiry > $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(digest)
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn consume_reset_token(
        &self,
        digest: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET password_hash = $2,
                password_reset_token = NULL,
                password_reset_expiry = NULL,
                updated_at = $3
            WHERE password_reset_token = $1
              AND password_reset_expiry > $3
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(digest)
        .bind(new_password_hash)
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }
}
