use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::tokens::{
    hash_token, sign_access_token, sign_refresh_token, verify_refresh_token, OneTimeToken,
    OneTimeTokenKind,
};
use crate::config::{AuthConfig, MailConfig};
use crate::db::models::{User, UserSummary};
use crate::db::store::UserStore;
use crate::error::{AppError, AuthError};
use crate::mail::{
    action_url, deliver_in_background, email_verification_message, password_reset_message, Mailer,
};

const VERIFY_EMAIL_PATH: &str = "/api/v1/auth/verify-email";
const RESET_PASSWORD_PATH: &str = "/api/v1/auth/reset-password";

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct AuthService {
    store: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    auth_config: AuthConfig,
    mail_config: MailConfig,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        auth_config: AuthConfig,
        mail_config: MailConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            auth_config,
            mail_config,
        }
    }

    /// Create an account and dispatch an email-verification token.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<UserSummary, AppError> {
        if self
            .store
            .find_by_email_or_username(email, username)
            .await?
            .is_some()
        {
            return Err(AppError::ConflictError(
                "User with email or username already exists".to_string(),
            ));
        }

        let password_hash = hash_password(password)?;
        let user = self
            .store
            .create_user(&User::new(
                email.to_string(),
                username.to_string(),
                password_hash,
                role.to_string(),
            ))
            .await?;

        let plaintext = self
            .mint_one_time_token(user.id, OneTimeTokenKind::EmailVerification)
            .await?;
        self.send_verification_email(&user, &plaintext)?;

        info!("Registered user {} and sent verification mail", user.id);
        Ok(user.summary())
    }

    /// Verify credentials and establish a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<(TokenPair, UserSummary), AppError> {
        // Unknown email and wrong password are indistinguishable to the caller
        let user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AppError::AuthError(AuthError::InvalidCredentials))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::AuthError(AuthError::InvalidCredentials));
        }

        let pair = self.issue_token_pair(&user).await?;
        Ok((pair, user.summary()))
    }

    /// Mint an access/refresh pair and persist the refresh token verbatim,
    /// overwriting any previous value. One active session per user: issuing
    /// a new pair invalidates every previously issued refresh token.
    pub async fn issue_token_pair(&self, user: &User) -> Result<TokenPair, AppError> {
        let access_token = sign_access_token(user.id, &user.role, &self.auth_config)?;
        let refresh_token = sign_refresh_token(user.id, &self.auth_config)?;

        self.store
            .store_refresh_token(user.id, &refresh_token)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Exchange a refresh token for a new pair, rotating the stored value.
    /// The presented token must carry a valid signature, be unexpired, and
    /// match the refresh token currently stored on the user record, so a
    /// rotated-away, replayed, or logged-out token no longer refreshes.
    pub async fn refresh_session(&self, presented: &str) -> Result<TokenPair, AppError> {
        let claims = verify_refresh_token(presented, &self.auth_config)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::AuthError(AuthError::InvalidToken))?;

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::AuthError(AuthError::InvalidToken))?;

        if user.refresh_token.as_deref() != Some(presented) {
            return Err(AppError::AuthError(AuthError::InvalidToken));
        }

        self.issue_token_pair(&user).await
    }

    /// Clear the stored refresh token. Idempotent: logging out an already
    /// empty session is a no-op success.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        self.store.clear_refresh_token(user_id).await?;
        info!("Cleared session for user {}", user_id);
        Ok(())
    }

    /// Consume an email-verification token, marking the email verified.
    pub async fn verify_email(&self, plaintext: &str) -> Result<UserSummary, AppError> {
        let digest = hash_token(plaintext);
        let user = self
            .store
            .consume_verification_token(&digest, Utc::now())
            .await?
            .ok_or(AppError::AuthError(AuthError::InvalidToken))?;

        info!("Email verified for user {}", user.id);
        Ok(user.summary())
    }

    /// Re-mint and re-deliver a verification token. Rejected for accounts
    /// that are already verified.
    pub async fn resend_verification(&self, user_id: Uuid) -> Result<(), AppError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFoundError("User does not exist".to_string()))?;

        if user.is_email_verified {
            return Err(AppError::ConflictError(
                "Email is already verified".to_string(),
            ));
        }

        let plaintext = self
            .mint_one_time_token(user.id, OneTimeTokenKind::EmailVerification)
            .await?;
        self.send_verification_email(&user, &plaintext)?;
        Ok(())
    }

    /// Mint and deliver a password-reset token. Succeeds whether or not the
    /// email belongs to an account, so callers cannot probe for accounts.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let Some(user) = self.store.find_by_email(email).await? else {
            return Ok(());
        };

        let plaintext = self
            .mint_one_time_token(user.id, OneTimeTokenKind::PasswordReset)
            .await?;

        let url = action_url(&self.mail_config.public_base_url, RESET_PASSWORD_PATH, &plaintext)?;
        deliver_in_background(
            self.mailer.clone(),
            password_reset_message(&user.email, &user.username, &url),
        );
        Ok(())
    }

    /// Consume a password-reset token and install the new password.
    pub async fn reset_password(&self, plaintext: &str, new_password: &str) -> Result<(), AppError> {
        let new_hash = hash_password(new_password)?;
        let digest = hash_token(plaintext);

        let user = self
            .store
            .consume_reset_token(&digest, &new_hash, Utc::now())
            .await?
            .ok_or(AppError::AuthError(AuthError::InvalidToken))?;

        info!("Password reset for user {}", user.id);
        Ok(())
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<UserSummary, AppError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFoundError("User does not exist".to_string()))?;
        Ok(user.summary())
    }

    /// Generate a one-time token and persist its digest and expiry on the
    /// field pair named by `kind`. Returns the plaintext for mail delivery.
    async fn mint_one_time_token(
        &self,
        user_id: Uuid,
        kind: OneTimeTokenKind,
    ) -> Result<String, AppError> {
        let window = Duration::minutes(self.auth_config.temp_token_expiry_minutes);
        let token = OneTimeToken::generate(window)?;
        self.store
            .store_one_time_token(user_id, kind, &token.digest, token.expiry)
            .await?;
        Ok(token.plaintext)
    }

    fn send_verification_email(&self, user: &User, plaintext: &str) -> Result<(), AppError> {
        let url = action_url(&self.mail_config.public_base_url, VERIFY_EMAIL_PATH, plaintext)?;
        deliver_in_background(
            self.mailer.clone(),
            email_verification_message(&user.email, &user.username, &url),
        );
        Ok(())
    }
}
