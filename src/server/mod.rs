//! Web server for the check-in portal and the lecturer API

pub mod auth;
pub mod error;
pub mod http;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use chrono::{DateTime, FixedOffset, Local};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::checkin::CheckInService;
use crate::config::Config;
use crate::store::Database;
use crate::server::auth::AuthState;

/// Captures arrive as base64 data URLs
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Source of the current local time
pub type Clock = Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| Local::now().fixed_offset())
}

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub checkin: Arc<CheckInService>,
    pub auth: Arc<AuthState>,
    pub clock: Clock,
}

impl AppState {
    pub fn now(&self) -> DateTime<FixedOffset> {
        (self.clock)()
    }
}

/// TLS material for HTTPS mode
#[derive(Debug, Clone)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Build the full router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Lecturer routes (require a lecturer JWT)
    let protected = Router::new()
        .route("/api/students", post(http::register_student_handler))
        .route("/api/students/{id}", delete(http::delete_student_handler))
        .route("/api/students/{id}/photo", put(http::update_photo_handler))
        .route("/api/courses", post(http::create_course_handler))
        .route("/api/courses/{id}", delete(http::delete_course_handler))
        .route("/api/courses/{id}/absentees", post(http::absentees_handler))
        .route("/api/attendance", get(http::attendance_handler))
        .route("/api/dashboard", get(http::dashboard_handler))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::require_lecturer,
        ));

    let public = Router::new()
        .route("/api/status", get(http::status_handler))
        .route("/api/students", get(http::list_students_handler))
        .route("/api/students/{id}/history", get(http::history_handler))
        .route("/api/courses", get(http::list_courses_handler))
        .route("/api/courses/suggested", get(http::suggested_course_handler))
        .route("/api/checkin", post(http::checkin_handler))
        .route("/api/auth/login", post(http::login_handler))
        .route("/api/auth/logout", post(http::logout_handler));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server
pub async fn start(state: AppState, host: &str, port: u16, tls: Option<TlsFiles>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", host, port))?;

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Attendify Server Starting");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Server binding to: {}", addr);

    if tls.is_some() {
        println!("✓ HTTPS enabled");
    } else {
        println!("⚠ HTTPS disabled (cameras usually require a secure origin)");
    }

    if state.config.verification.demo_mode {
        println!("⚠ Demo mode: check-ins are accepted when verification is unavailable");
    } else {
        println!("✓ Verification model: {}", state.config.verification.model);
    }

    if state.auth.login_enabled() {
        println!("✓ Lecturer login enabled");
    } else {
        println!("⚠ Lecturer login disabled");
        println!("  Tip: run 'attendify config --set-password' to enable it");
    }
    println!();
    println!("🚀 Listening on http{}://{}", if tls.is_some() { "s" } else { "" }, addr);
    println!();

    let app = router(state);

    if let Some(tls) = tls {
        let cert_data = tokio::fs::read(&tls.cert)
            .await
            .context("Failed to read certificate file")?;
        let key_data = tokio::fs::read(&tls.key)
            .await
            .context("Failed to read key file")?;

        let config = axum_server::tls_rustls::RustlsConfig::from_pem(cert_data, key_data).await?;
        axum_server::bind_rustls(addr, config)
            .serve(app.into_make_service())
            .await?;
        return Ok(());
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
