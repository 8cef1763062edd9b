//!
//! orderdesk HTTP server
//! ---------------------
//! Axum-based HTTP API: session-cookie login/logout backed by the auth module,
//! an authenticated profile endpoint, and a health probe.
//!
//! Responsibilities:
//! - Apply pending schema migrations before the listener binds (this is the
//!   retry path when the standalone runner deferred on a transient failure).
//! - Session cookie handling; the browser only ever sees the opaque token.
//! - Background sweep of expired sessions.
//! - Handler failures log full detail server-side and return a generic 500;
//!   error detail is echoed in the body only outside production mode.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::auth::{LocalVerifier, PgAccounts, SessionStore, Verifier, VerifyOutcome};
use crate::config::Config;

const SESSION_COOKIE: &str = "orderdesk_session";
const SWEEP_INTERVAL_SECS: u64 = 60;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<LocalVerifier<PgAccounts>>,
    pub sessions: Arc<SessionStore>,
    pub dev_mode: bool,
}

/// Resolve configuration, connect, migrate, and serve.
pub async fn run() -> anyhow::Result<()> {
    let cfg = Config::from_env();
    if cfg.session_secret.is_empty() {
        warn!("SESSION_SECRET is unset; session digests are unkeyed");
    }
    let pool = crate::db::connect(&cfg.db).await?;
    let dir = Path::new(&cfg.migrations_dir);
    if dir.is_dir() {
        crate::migrate::run(&pool, dir).await?;
    }
    run_with_config(cfg, pool).await
}

pub async fn run_with_config(cfg: Config, pool: PgPool) -> anyhow::Result<()> {
    let sessions = Arc::new(SessionStore::new(pool.clone(), cfg.session_secret.clone()));
    let state = AppState {
        verifier: Arc::new(LocalVerifier::new(PgAccounts::new(pool))),
        sessions: sessions.clone(),
        dev_mode: cfg.dev_mode,
    };

    // Background expired-session sweeper
    tokio::spawn(async move {
        loop {
            match sessions.sweep_expired().await {
                Ok(removed) if removed > 0 => tracing::debug!(removed, "session_sweep"),
                Ok(_) => {}
                Err(e) => warn!("session sweep failed: {e}"),
            }
            tokio::time::sleep(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS)).await;
        }
    });

    let app = Router::new()
        .route("/", get(|| async { "orderdesk ok" }))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

fn set_session_cookie(token: &str, dev_mode: bool) -> HeaderValue {
    // Secure omitted in dev mode so plain-HTTP local logins keep the cookie
    let secure = if dev_mode { "" } else { " Secure;" };
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly;{} SameSite=Strict; Path=/",
        SESSION_COOKIE, token, secure
    ))
    .unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Strict; Path=/",
        SESSION_COOKIE
    ))
    .unwrap()
}

fn internal_error(
    dev_mode: bool,
    err: &dyn std::fmt::Display,
) -> (StatusCode, HeaderMap, Json<serde_json::Value>) {
    error!("request failed: {err}");
    let body = if dev_mode {
        json!({"status":"error","message": err.to_string()})
    } else {
        json!({"status":"error","message":"internal server error"})
    };
    (StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new(), Json(body))
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> impl IntoResponse {
    match state.verifier.verify(&payload.username, &payload.password).await {
        Ok(VerifyOutcome::Verified(who)) => match state.sessions.open(&who).await {
            Ok(token) => {
                let mut headers = HeaderMap::new();
                headers.insert("Set-Cookie", set_session_cookie(&token, state.dev_mode));
                info!(user = %who.username, "login");
                (StatusCode::OK, headers, Json(json!({"status":"ok"})))
            }
            Err(e) => internal_error(state.dev_mode, &e),
        },
        Ok(VerifyOutcome::Unauthenticated) => (
            StatusCode::UNAUTHORIZED,
            HeaderMap::new(),
            Json(json!({"status":"unauthorized"})),
        ),
        Err(e) => internal_error(state.dev_mode, &e),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = parse_cookie(&headers, SESSION_COOKIE) {
        if let Err(e) = state.sessions.close(&token).await {
            return internal_error(state.dev_mode, &e);
        }
    }
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", clear_session_cookie());
    (StatusCode::OK, h, Json(json!({"status":"ok"})))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(token) = parse_cookie(&headers, SESSION_COOKIE) else {
        return (
            StatusCode::UNAUTHORIZED,
            HeaderMap::new(),
            Json(json!({"status":"unauthorized"})),
        );
    };
    match state.sessions.resolve(&token).await {
        // A dangling identifier is the same as an expired session: re-authenticate.
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            HeaderMap::new(),
            Json(json!({"status":"unauthorized"})),
        ),
        Ok(Some(who)) => (StatusCode::OK, HeaderMap::new(), Json(json!({"status":"ok","user": who}))),
        Err(e) => internal_error(state.dev_mode, &e),
    }
}
