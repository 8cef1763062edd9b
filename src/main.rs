use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let pg_host = std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string());
    let pg_db = std::env::var("PGDATABASE").unwrap_or_else(|_| "develop".to_string());
    info!(
        target: "orderdesk",
        "orderdesk starting: RUST_LOG='{}', port={}, pg_host='{}', pg_database='{}'",
        rust_log, http_port, pg_host, pg_db
    );

    orderdesk::server::run().await
}
