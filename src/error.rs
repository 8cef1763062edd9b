//! Error taxonomy shared across the migration runner and the server.
//!
//! Connection failures are split into transient and fatal sub-kinds because
//! the migration runner exits successfully on a transient failure (the retry
//! happens at application startup) and non-zero on everything else.

use thiserror::Error;

/// Network/auth failure reaching the database.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Expected to resolve on retry: host unreachable, connection refused or
    /// reset, acquire timeout.
    #[error("transient database connection failure: {0}")]
    Transient(#[source] sqlx::Error),
    /// Authentication rejected, database missing, bad configuration.
    #[error("database connection failed: {0}")]
    Fatal(#[source] sqlx::Error),
}

impl ConnectError {
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if is_transient(&err) {
            ConnectError::Transient(err)
        } else {
            ConnectError::Fatal(err)
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ConnectError::Transient(_))
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        // SQLSTATE class 08 covers connection exceptions raised server-side.
        sqlx::Error::Database(db) => db.code().map(|c| c.starts_with("08")).unwrap_or(false),
        _ => false,
    }
}

/// A query failed; carries the offending statement for the server-side log.
#[derive(Debug, Error)]
#[error("query failed ({statement}): {source}")]
pub struct QueryError {
    pub statement: String,
    #[source]
    pub source: sqlx::Error,
}

impl QueryError {
    pub fn new(statement: impl Into<String>, source: sqlx::Error) -> Self {
        QueryError { statement: statement.into(), source }
    }
}

/// Failure while discovering or applying schema migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("unrecognized migration filename {name:?}: {reason}")]
    BadFilename { name: String, reason: &'static str },
    #[error("duplicate migration version {version}")]
    DuplicateVersion { version: i64 },
    #[error("failed to read migrations from {dir}: {source}")]
    Discover {
        dir: String,
        #[source]
        source: std::io::Error,
    },
    #[error("schema version ledger unavailable: {0}")]
    Ledger(#[source] QueryError),
    /// A migration script failed. `applied` lists the versions that fully
    /// committed before the failing one; the ledger reflects exactly those.
    #[error("migration {version} ({name}) failed; {} applied before failure: {source}", .applied.len())]
    Apply {
        version: i64,
        name: String,
        applied: Vec<i64>,
        #[source]
        source: QueryError,
    },
}

impl MigrationError {
    /// Versions successfully applied before the failure, if any.
    pub fn applied(&self) -> &[i64] {
        match self {
            MigrationError::Apply { applied, .. } => applied,
            _ => &[],
        }
    }

    /// True when the underlying failure is a transient connection loss, using
    /// the same classification as `ConnectError`. The standalone runner exits
    /// successfully on these; the application retries migrations at startup.
    pub fn is_transient(&self) -> bool {
        match self {
            MigrationError::Ledger(q) => is_transient(&q.source),
            MigrationError::Apply { source, .. } => is_transient(&source.source),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(ConnectError::from_sqlx(sqlx::Error::Io(io)).is_transient());
        assert!(ConnectError::from_sqlx(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn protocol_and_config_errors_are_fatal() {
        assert!(!ConnectError::from_sqlx(sqlx::Error::Protocol("bad".into())).is_transient());
        assert!(!ConnectError::from_sqlx(sqlx::Error::Configuration("bad".into())).is_transient());
    }

    #[test]
    fn migration_errors_classify_connection_loss_as_transient() {
        let reset = || {
            let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
            sqlx::Error::Io(io)
        };
        let mid_run = MigrationError::Apply {
            version: 2,
            name: "create-session".into(),
            applied: vec![1],
            source: QueryError::new("CREATE TABLE session", reset()),
        };
        assert!(mid_run.is_transient());
        assert!(MigrationError::Ledger(QueryError::new("SELECT version", reset())).is_transient());

        let bad_script = MigrationError::Apply {
            version: 2,
            name: "create-session".into(),
            applied: vec![1],
            source: QueryError::new("CREATE TABLE session", sqlx::Error::Protocol("boom".into())),
        };
        assert!(!bad_script.is_transient());
        assert!(!MigrationError::DuplicateVersion { version: 1 }.is_transient());
    }

    #[test]
    fn apply_error_reports_applied_prefix() {
        let err = MigrationError::Apply {
            version: 3,
            name: "add-orders".into(),
            applied: vec![1, 2],
            source: QueryError::new("CREATE TABLE orders", sqlx::Error::Protocol("boom".into())),
        };
        assert_eq!(err.applied(), &[1, 2]);
        let msg = err.to_string();
        assert!(msg.contains("migration 3"), "unexpected message: {msg}");
        assert!(msg.contains("2 applied"), "unexpected message: {msg}");
    }
}
