//! Control server — Axum endpoints for liveness and operator arming.
//!
//! `GET /` and `GET /health` answer the deployment platform's keep-alive
//! probes. `POST /arm` accepts the operator's daily access token, arms the
//! session, and deliberately resets the alert ledger — a new trading
//! session warrants fresh detection. `POST /disarm` drops the credential.

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use secrecy::SecretString;
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::ledger::{lock, SharedLedger};
use crate::session::SessionManager;

/// State shared with the scanner task.
#[derive(Clone)]
pub struct AppState {
    pub session: SessionManager,
    pub ledger: SharedLedger,
}

/// Serve the control API until the shutdown signal fires.
pub async fn serve(
    state: AppState,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port, "Control server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().expect("static origin"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/arm", post(arm))
        .route("/disarm", post(disarm))
        .layer(cors)
        .with_state(state)
}

async fn home() -> &'static str {
    "ZENITH Scanner Active — Running 24/7"
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct ArmRequest {
    token: String,
}

/// Arm the session with a fresh credential.
///
/// Accepts either a JSON `{"token": "..."}` body or the raw token text,
/// so an operator can curl it without quoting gymnastics.
async fn arm(State(state): State<AppState>, body: String) -> (StatusCode, &'static str) {
    let token = match serde_json::from_str::<ArmRequest>(&body) {
        Ok(req) => req.token,
        Err(_) => body.trim().to_string(),
    };

    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "empty credential");
    }

    state.session.set(SecretString::new(token));
    if let Err(e) = lock(&state.ledger).reset() {
        // Armed anyway; stale dedup entries are the lesser failure.
        error!(error = %e, "Ledger reset on re-arm failed");
    }
    info!("Session armed — alert ledger reset");
    (StatusCode::OK, "armed")
}

async fn disarm(State(state): State<AppState>) -> (StatusCode, &'static str) {
    state.session.clear();
    info!("Session disarmed by operator");
    (StatusCode::OK, "disarmed")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
