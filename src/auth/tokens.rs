use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, decode, Header, EncodingKey, DecodingKey, Validation, Algorithm};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AppError, AuthError};

/// One-time tokens carry 256 bits of OS randomness.
const ONE_TIME_TOKEN_BYTES: usize = 32;

/// Which pair of User fields a one-time token lives in. The mint and
/// consume logic is otherwise identical for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneTimeTokenKind {
    EmailVerification,
    PasswordReset,
}

/// A freshly minted one-time token. The plaintext goes out by email;
/// only the digest and expiry are ever persisted.
#[derive(Debug, Clone)]
pub struct OneTimeToken {
    pub plaintext: String,
    pub digest: String,
    pub expiry: DateTime<Utc>,
}

impl OneTimeToken {
    pub fn generate(window: Duration) -> Result<Self, AppError> {
        let mut bytes = [0u8; ONE_TIME_TOKEN_BYTES];
        // No fallback to a weaker source: an unavailable OS RNG is an error
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| AppError::InternalError(format!("OS random source unavailable: {}", e)))?;
        let plaintext = URL_SAFE_NO_PAD.encode(bytes);
        let digest = hash_token(&plaintext);
        Ok(Self {
            plaintext,
            digest,
            expiry: Utc::now() + window,
        })
    }
}

/// Deterministic one-way digest of a one-time token, recomputed at
/// verification time and compared against the stored value. Not the
/// password hash algorithm.
pub fn hash_token(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,  // User ID
    pub role: String,
    pub exp: i64,     // Expiration time
    pub iat: i64,     // Issued at
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,  // User ID
    pub jti: String,  // Random per mint, so consecutive tokens never collide
    pub exp: i64,
    pub iat: i64,
}

pub fn sign_access_token(user_id: Uuid, role: &str, config: &AuthConfig) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (now + Duration::minutes(config.access_token_expiry_minutes)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.access_token_secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalError(format!("Failed to sign access token: {}", e)))
}

pub fn sign_refresh_token(user_id: Uuid, config: &AuthConfig) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = RefreshClaims {
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        exp: (now + Duration::days(config.refresh_token_expiry_days)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalError(format!("Failed to sign refresh token: {}", e)))
}

pub fn verify_access_token(token: &str, config: &AuthConfig) -> Result<AccessClaims, AppError> {
    decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(config.access_token_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    // Bad signature and expiry collapse to the same error
    .map(|data| data.claims)
    .map_err(|_| AppError::AuthError(AuthError::InvalidToken))
}

pub fn verify_refresh_token(token: &str, config: &AuthConfig) -> Result<RefreshClaims, AppError> {
    decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::AuthError(AuthError::InvalidToken))
}
