//! Environment-driven configuration, read once at startup.
//!
//! The session secret and database parameters are plain values injected into
//! the components that need them; nothing here is consulted again after
//! construction.

use std::str::FromStr;

/// Database connection parameters.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Local-development mode: loopback host, no transport encryption.
    pub use_local: bool,
}

impl DbConfig {
    pub fn is_loopback(&self) -> bool {
        let host = self.host.trim();
        host == "localhost" || host == "127.0.0.1"
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub http_port: u16,
    pub session_secret: String,
    /// Relaxes the session cookie and echoes error detail in responses.
    pub dev_mode: bool,
    pub migrations_dir: String,
}

impl Config {
    /// Resolve configuration from the environment. `USE_LOCAL_DB=true` or a
    /// `--local` process argument selects the local-development parameter set.
    pub fn from_env() -> Config {
        let use_local = env_flag("USE_LOCAL_DB") || std::env::args().any(|a| a == "--local");
        Config {
            db: DbConfig {
                host: env_or("PGHOST", "localhost"),
                port: env_parse("PGPORT", 5432),
                database: env_or("PGDATABASE", "develop"),
                user: env_or("PGUSER", "admin"),
                password: env_or("PGPASSWORD", ""),
                use_local,
            },
            http_port: env_parse("PORT", 8080),
            session_secret: env_or("SESSION_SECRET", ""),
            dev_mode: env_or("APP_ENV", "development") != "production",
            migrations_dir: env_or("MIGRATIONS_DIR", "db/migrations"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str) -> bool {
    std::env::var(key).map(|v| v == "true" || v == "1").unwrap_or(false)
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
