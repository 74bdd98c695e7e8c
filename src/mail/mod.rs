//! Outbound mail for the authentication flows.
//!
//! Delivery is best-effort: callers dispatch messages with
//! [`deliver_in_background`] and only the log ever sees a failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

use crate::config::MailConfig;
use crate::error::AppError;

/// Structured mail content: recipient display name, an intro line, one
/// action link carrying the plaintext token, and an outro line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub name: String,
    pub intro: String,
    pub action_instructions: String,
    pub action_text: String,
    pub action_url: String,
    pub outro: String,
}

pub fn email_verification_message(email: &str, username: &str, verification_url: &str) -> EmailMessage {
    EmailMessage {
        to: email.to_string(),
        subject: "Please verify your email".to_string(),
        name: username.to_string(),
        intro: "Welcome to our app! We are excited to have you on board.".to_string(),
        action_instructions: "To verify your email please click on the button below".to_string(),
        action_text: "Verify your email".to_string(),
        action_url: verification_url.to_string(),
        outro: "Need help, or have questions? Just reply to this email.".to_string(),
    }
}

pub fn password_reset_message(email: &str, username: &str, reset_url: &str) -> EmailMessage {
    EmailMessage {
        to: email.to_string(),
        subject: "Password reset request".to_string(),
        name: username.to_string(),
        intro: "We got a request to reset the password of your account.".to_string(),
        action_instructions: "To reset your password click on the following button".to_string(),
        action_text: "Reset password".to_string(),
        action_url: reset_url.to_string(),
        outro: "Need help, or have questions? Just reply to this email.".to_string(),
    }
}

/// Build the fully-qualified action URL a one-time token is delivered in,
/// e.g. `{base}/api/v1/auth/verify-email/{token}`.
pub fn action_url(public_base_url: &str, path: &str, token: &str) -> Result<String, AppError> {
    let base = Url::parse(public_base_url)
        .map_err(|e| AppError::ConfigError(format!("Invalid public base URL: {}", e)))?;
    let joined = base
        .join(&format!("{}/{}", path.trim_end_matches('/'), token))
        .map_err(|e| AppError::InternalError(format!("Failed to build action URL: {}", e)))?;
    Ok(joined.to_string())
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError>;
}

/// Mailer backed by an HTTP mail API; messages go out as one JSON POST.
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    sender: String,
}

impl HttpMailer {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            sender: config.sender.clone(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
        let payload = serde_json::json!({
            "from": self.sender,
            "to": message.to,
            "subject": message.subject,
            "body": {
                "name": message.name,
                "intro": message.intro,
                "action": {
                    "instructions": message.action_instructions,
                    "button": {
                        "text": message.action_text,
                        "link": message.action_url,
                    },
                },
                "outro": message.outro,
            },
        });

        let response = self
            .client
            .post(&self.api_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::InternalError(format!("Mail API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::InternalError(format!(
                "Mail API returned status {}",
                response.status()
            )));
        }

        debug!("Mail delivered to {}", message.to);
        Ok(())
    }
}

/// Dispatch a message without tying its outcome to the calling request.
/// Delivery failure is logged and otherwise swallowed.
pub fn deliver_in_background(mailer: Arc<dyn Mailer>, message: EmailMessage) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&message).await {
            error!("Email delivery to {} failed: {}", message.to, e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mail_config(api_url: String) -> MailConfig {
        MailConfig {
            api_url,
            sender: "mail.authkit@example.com".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
        }
    }

    #[test]
    fn test_action_url_embeds_token() {
        let url = action_url("https://app.example.com", "/api/v1/auth/verify-email", "tok123").unwrap();
        assert_eq!(url, "https://app.example.com/api/v1/auth/verify-email/tok123");
    }

    #[test]
    fn test_action_url_rejects_bad_base() {
        assert!(action_url("not a url", "/verify", "tok").is_err());
    }

    #[test]
    fn test_verification_message_content() {
        let msg = email_verification_message("a@x.com", "alice", "https://x/verify/tok");
        assert_eq!(msg.to, "a@x.com");
        assert_eq!(msg.name, "alice");
        assert_eq!(msg.subject, "Please verify your email");
        assert_eq!(msg.action_url, "https://x/verify/tok");
    }

    #[tokio::test]
    async fn test_http_mailer_posts_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/send"))
            .and(body_partial_json(serde_json::json!({
                "to": "a@x.com",
                "subject": "Please verify your email",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(&mail_config(format!("{}/api/send", server.uri())));
        let msg = email_verification_message("a@x.com", "alice", "https://x/verify/tok");
        assert!(mailer.send(&msg).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_mailer_surfaces_api_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(&mail_config(format!("{}/api/send", server.uri())));
        let msg = password_reset_message("a@x.com", "alice", "https://x/reset/tok");
        assert!(matches!(
            mailer.send(&msg).await,
            Err(AppError::InternalError(_))
        ));
    }
}
