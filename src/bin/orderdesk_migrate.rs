//! Standalone schema migration runner.
//!
//! Applies pending migrations from the configured directory and exits 0 on
//! success. A transient connectivity failure also exits 0 (the application
//! retries migrations at startup, so a build-time run must not fail the
//! build); any other error exits non-zero.

use std::path::Path;
use std::process::ExitCode;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use orderdesk::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let cfg = Config::from_env();
    if cfg.db.use_local {
        info!("using local database parameters");
    }

    let pool = match orderdesk::db::connect(&cfg.db).await {
        Ok(pool) => pool,
        Err(e) if e.is_transient() => {
            warn!("database unreachable during migration: {e}");
            warn!("migrations will be run at application startup");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("database connection failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    match orderdesk::migrate::run(&pool, Path::new(&cfg.migrations_dir)).await {
        Ok(_) => ExitCode::SUCCESS,
        // Connection lost mid-run: same deferral as an unreachable database.
        Err(e) if e.is_transient() => {
            warn!("database connection lost during migration: {e}");
            warn!("migrations will be run at application startup");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("migration error: {e}");
            ExitCode::FAILURE
        }
    }
}
