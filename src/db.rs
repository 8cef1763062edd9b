//! Connection bootstrap: build the shared PostgreSQL pool.
//!
//! Loopback and local-mode hosts connect without transport encryption; any
//! other host gets TLS with certificate validation relaxed, matching managed
//! cloud endpoints that present self-signed certificates. One liveness query
//! runs before the pool is handed to dependents.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::DbConfig;
use crate::error::ConnectError;

const MAX_CONNECTIONS: u32 = 20;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport-encryption rule: never for loopback or local mode, otherwise
/// required but with relaxed certificate validation.
pub fn ssl_mode_for(cfg: &DbConfig) -> PgSslMode {
    if cfg.use_local || cfg.is_loopback() {
        PgSslMode::Disable
    } else {
        PgSslMode::Require
    }
}

pub fn connect_options(cfg: &DbConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .database(&cfg.database)
        .username(&cfg.user)
        .password(&cfg.password)
        .ssl_mode(ssl_mode_for(cfg))
}

/// Establish the connection pool and verify liveness.
pub async fn connect(cfg: &DbConfig) -> Result<PgPool, ConnectError> {
    let ssl = ssl_mode_for(cfg);
    info!(
        host = %cfg.host,
        port = cfg.port,
        database = %cfg.database,
        ssl = matches!(ssl, PgSslMode::Require),
        "connecting to database"
    );
    if matches!(ssl, PgSslMode::Require) {
        warn!("remote host: TLS enabled without certificate verification");
    }

    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .test_before_acquire(true)
        .connect_with(connect_options(cfg))
        .await
        .map_err(ConnectError::from_sqlx)?;

    // Liveness check before signalling readiness to dependents.
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(ConnectError::from_sqlx)?;
    info!("database connection established");
    Ok(pool)
}
