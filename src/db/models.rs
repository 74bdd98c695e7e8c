use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub is_email_verified: bool,
    // One-way digests only; the plaintext one-time tokens are never stored
    pub email_verification_token: Option<String>,
    pub email_verification_expiry: Option<DateTime<Utc>>,
    pub password_reset_token: Option<String>,
    pub password_reset_expiry: Option<DateTime<Utc>>,
    // Single active refresh token; overwriting it invalidates the previous one
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, username: String, password_hash: String, role: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            username,
            password_hash,
            role,
            is_email_verified: false,
            email_verification_token: None,
            email_verification_expiry: None,
            password_reset_token: None,
            password_reset_expiry: None,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            role: self.role.clone(),
            is_email_verified: self.is_email_verified,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// What callers are allowed to see of a User. Excludes the password hash,
/// the refresh token, and all one-time token digests and expiries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: String,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
