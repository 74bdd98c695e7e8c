use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use authkit_server::auth::handlers::{
    current_user, forgot_password, login, logout, refresh, register, resend_verification,
    reset_password, verify_email,
};
use authkit_server::{health_check, AppError, AppState, Settings};
use dotenv::dotenv;
use std::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[actix_web::main]
async fn main() -> authkit_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    info!("Starting server at {}:{}", config.server.host, config.server.port);

    // Initialize application state
    let state = AppState::new(config.clone()).await?;
    let state = web::Data::new(state);

    // Create and bind TCP listener
    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    let workers = config.server.workers as usize;

    // Start HTTP server
    HttpServer::new(move || {
        let cors = if config.cors.enabled {
            let cors_config = Cors::default();

            // Apply specific CORS rules based on configuration
            let cors_config = if config.cors.allow_any_origin {
                cors_config
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .expose_any_header()
            } else {
                // More restrictive CORS for production use
                cors_config
                    .allowed_origin("http://localhost:8080")
                    .allowed_origin("http://127.0.0.1:8080")
                    .allowed_methods(vec!["GET", "POST"])
                    .allowed_headers(vec!["Authorization", "Content-Type"])
                    .supports_credentials()
            };

            // Set max age
            cors_config.max_age(config.cors.max_age as usize)
        } else {
            // CORS disabled - use most restrictive settings
            Cors::default()
        };

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/api/v1/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    .route("/verify-email/{token}", web::get().to(verify_email))
                    .route("/resend-verification", web::post().to(resend_verification))
                    .route("/forgot-password", web::post().to(forgot_password))
                    .route("/reset-password/{token}", web::post().to(reset_password))
                    .route("/me", web::get().to(current_user)),
            )
    })
    .listen(listener)?
    .workers(workers)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(())
}
