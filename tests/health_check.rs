use actix_web::{test, web, App};
use authkit_server::auth::handlers::{current_user, refresh, register};
use authkit_server::{health_check, AppState, AuthService, HttpMailer, PgUserStore, Settings};
use chrono::DateTime;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

/// App state over a lazy pool: nothing here touches the database, so no
/// live Postgres is needed.
fn test_state() -> web::Data<AppState> {
    let config = Settings::new().expect("Failed to load test config");
    let pool = Arc::new(
        PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .expect("Failed to create lazy pool"),
    );
    let store = Arc::new(PgUserStore::new(pool.clone()));
    let mailer = Arc::new(HttpMailer::new(&config.mail));
    let auth_service = Arc::new(AuthService::new(
        store,
        mailer,
        config.auth.clone(),
        config.mail.clone(),
    ));
    web::Data::new(AppState {
        config: Arc::new(config),
        db_pool: pool,
        auth_service,
    })
}

#[actix_web::test]
async fn test_health_check() {
    let app = test::init_service(
        App::new()
            .app_data(test_state())
            .route("/health", web::get().to(health_check)),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());

    let body = test::read_body(resp).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "healthy");
    assert!(DateTime::parse_from_rfc3339(json["timestamp"].as_str().unwrap()).is_ok());
}

#[actix_web::test]
async fn test_register_rejects_invalid_input_before_touching_store() {
    let app = test::init_service(
        App::new()
            .app_data(test_state())
            .route("/api/v1/auth/register", web::post().to(register)),
    )
    .await;

    let resp = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(json!({
            "email": "not-an-email",
            "username": "alice",
            "password": "pw123"
        }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 400);

    let resp = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(json!({
            "email": "a@x.com",
            "username": "Alice",
            "password": "pw123"
        }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_refresh_without_token_is_unauthorized() {
    let app = test::init_service(
        App::new()
            .app_data(test_state())
            .route("/api/v1/auth/refresh", web::post().to(refresh)),
    )
    .await;

    let resp = test::TestRequest::post()
        .uri("/api/v1/auth/refresh")
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_current_user_without_token_is_unauthorized() {
    let app = test::init_service(
        App::new()
            .app_data(test_state())
            .route("/api/v1/auth/me", web::get().to(current_user)),
    )
    .await;

    let resp = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 401);

    // A garbage bearer token is also rejected
    let resp = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", "Bearer not.a.token"))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 401);
}
