use actix_web::cookie::Cookie;
use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::service::TokenPair;
use crate::auth::tokens::verify_access_token;
use crate::db::models::UserSummary;
use crate::error::{AppError, AuthError};
use crate::AppState;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Caller identity resolved from the access token, read from the
/// `accessToken` cookie with an `Authorization: Bearer` fallback.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(resolve_authenticated_user(req))
    }
}

fn resolve_authenticated_user(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::InternalError("Application state missing".to_string()))?;

    let token = req
        .cookie(ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| {
            req.headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::to_string)
        })
        .ok_or(AppError::AuthError(AuthError::MissingToken))?;

    let claims = verify_access_token(&token, &state.config.auth)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::AuthError(AuthError::InvalidToken))?;

    Ok(AuthenticatedUser {
        user_id,
        role: claims.role,
    })
}

/// Session cookies are never readable by client script and only travel
/// over encrypted transport.
fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build(name, value)
        .http_only(true)
        .secure(true)
        .path("/")
        .finish()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build(name, "")
        .http_only(true)
        .secure(true)
        .path("/")
        .finish();
    cookie.make_removal();
    cookie
}

fn validate_register(req: &RegisterRequest) -> Result<(), AppError> {
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::ValidationError("Email is invalid".to_string()));
    }
    let username = req.username.trim();
    if username.len() < 3 {
        return Err(AppError::ValidationError(
            "Username must be at least 3 characters long".to_string(),
        ));
    }
    if username != username.to_lowercase() {
        return Err(AppError::ValidationError(
            "Username must be lowercase".to_string(),
        ));
    }
    if req.password.trim().is_empty() {
        return Err(AppError::ValidationError("Password is required".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: UserSummary,
    pub message: String,
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request for email: {}", req.email);
    validate_register(&req)?;

    let role = req.role.as_deref().unwrap_or("member");
    let user = state
        .auth_service
        .register(req.email.trim(), req.username.trim(), &req.password, role)
        .await?;

    Ok(HttpResponse::Created().json(RegisterResponse {
        user,
        message: "User registered successfully and verification mail has been sent".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserSummary,
    pub access_token: String,
    pub refresh_token: String,
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for email: {}", req.email);
    if req.email.trim().is_empty() {
        return Err(AppError::ValidationError("Email is required".to_string()));
    }
    if req.password.is_empty() {
        return Err(AppError::ValidationError("Password is required".to_string()));
    }

    match state.auth_service.login(req.email.trim(), &req.password).await {
        Ok((pair, user)) => {
            info!("Login successful for email: {}", req.email);
            Ok(session_response(pair, user))
        }
        Err(e) => {
            error!("Login failed for email: {}: {}", req.email, e);
            Err(e)
        }
    }
}

fn session_response(pair: TokenPair, user: UserSummary) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(session_cookie(ACCESS_TOKEN_COOKIE, pair.access_token.clone()))
        .cookie(session_cookie(REFRESH_TOKEN_COOKIE, pair.refresh_token.clone()))
        .json(SessionResponse {
            user,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        })
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    // Cookie first, body field as fallback
    let presented = req
        .cookie(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|b| b.into_inner().refresh_token))
        .ok_or(AppError::AuthError(AuthError::MissingToken))?;

    let pair = state.auth_service.refresh_session(&presented).await?;

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(ACCESS_TOKEN_COOKIE, pair.access_token.clone()))
        .cookie(session_cookie(REFRESH_TOKEN_COOKIE, pair.refresh_token.clone()))
        .json(RefreshResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }))
}

pub async fn logout(
    caller: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth_service.logout(caller.user_id).await?;

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(ACCESS_TOKEN_COOKIE))
        .cookie(removal_cookie(REFRESH_TOKEN_COOKIE))
        .json(serde_json::json!({
            "message": "User logged out"
        })))
}

pub async fn verify_email(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = path.into_inner();
    if token.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Email verification token is missing".to_string(),
        ));
    }

    state.auth_service.verify_email(&token).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "is_email_verified": true,
        "message": "Email is verified"
    })))
}

pub async fn resend_verification(
    caller: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth_service.resend_verification(caller.user_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Verification mail has been sent"
    })))
}

pub async fn current_user(
    caller: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = state.auth_service.current_user(caller.user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

pub async fn forgot_password(
    req: web::Json<ForgotPasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if req.email.trim().is_empty() {
        return Err(AppError::ValidationError("Email is required".to_string()));
    }

    state.auth_service.forgot_password(req.email.trim()).await?;

    // Same response whether or not the account exists
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "If that account exists, a password reset mail has been sent"
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

pub async fn reset_password(
    path: web::Path<String>,
    req: web::Json<ResetPasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = path.into_inner();
    if req.password.trim().is_empty() {
        return Err(AppError::ValidationError("Password is required".to_string()));
    }

    state.auth_service.reset_password(&token, &req.password).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Password has been reset"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie(ACCESS_TOKEN_COOKIE, "tok".to_string());
        assert_eq!(cookie.name(), "accessToken");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn test_removal_cookie_clears_value() {
        let cookie = removal_cookie(REFRESH_TOKEN_COOKIE);
        assert_eq!(cookie.name(), "refreshToken");
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
    }

    #[test]
    fn test_register_validation() {
        let valid = RegisterRequest {
            email: "a@x.com".to_string(),
            username: "alice".to_string(),
            password: "pw123".to_string(),
            role: None,
        };
        assert!(validate_register(&valid).is_ok());

        let bad_email = RegisterRequest {
            email: "not-an-email".to_string(),
            ..request_like(&valid)
        };
        assert!(matches!(
            validate_register(&bad_email),
            Err(AppError::ValidationError(_))
        ));

        let short_username = RegisterRequest {
            username: "al".to_string(),
            ..request_like(&valid)
        };
        assert!(validate_register(&short_username).is_err());

        let uppercase_username = RegisterRequest {
            username: "Alice".to_string(),
            ..request_like(&valid)
        };
        assert!(validate_register(&uppercase_username).is_err());

        let empty_password = RegisterRequest {
            password: "  ".to_string(),
            ..request_like(&valid)
        };
        assert!(validate_register(&empty_password).is_err());
    }

    fn request_like(base: &RegisterRequest) -> RegisterRequest {
        RegisterRequest {
            email: base.email.clone(),
            username: base.username.clone(),
            password: base.password.clone(),
            role: base.role.clone(),
        }
    }
}
