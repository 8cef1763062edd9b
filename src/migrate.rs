//! Schema migration ledger.
//!
//! Forward migrations are SQL files named `<version>.do.<name>.sql` (for
//! example `001.do.create-users.sql`); companion `.undo.` files are recognized
//! and skipped. Discovery sorts numerically by version, and `Ledger::migrate`
//! applies every version not yet recorded in the ledger table, strictly in
//! ascending order, wrapping each script plus its ledger insert in one
//! transaction. The set of recorded versions therefore always stays consistent
//! with the schema changes that actually committed.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::error::{MigrationError, QueryError};

pub const DEFAULT_LEDGER_TABLE: &str = "schemaversion";

/// A discovered forward migration.
#[derive(Debug, Clone)]
pub struct MigrationFile {
    pub version: i64,
    pub name: String,
    pub sql: String,
}

/// Parse a migration filename. Returns `None` for `.undo.` companions.
fn parse_filename(file: &str) -> Result<Option<(i64, String)>, MigrationError> {
    let bad = |reason| MigrationError::BadFilename { name: file.to_string(), reason };
    let parts: Vec<&str> = file.split('.').collect();
    if parts.len() < 3 || *parts.last().unwrap() != "sql" {
        return Err(bad("expected <version>.do.<name>.sql"));
    }
    match parts[1] {
        "undo" => return Ok(None),
        "do" => {}
        _ => return Err(bad("action must be 'do' or 'undo'")),
    }
    let version: i64 = parts[0].parse().map_err(|_| bad("version is not an integer"))?;
    if version < 0 {
        return Err(bad("version must be non-negative"));
    }
    let name = parts[2..parts.len() - 1].join(".");
    Ok(Some((version, name)))
}

/// Scan a directory for forward migrations, sorted by ascending version.
///
/// Non-SQL files and dotfiles are ignored; a `.sql` file that does not match
/// the naming pattern is an error, as is a duplicated version.
pub fn discover(dir: &Path) -> Result<Vec<MigrationFile>, MigrationError> {
    let read_err = |source| MigrationError::Discover { dir: dir.display().to_string(), source };
    let mut out: Vec<MigrationFile> = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)?.flatten() {
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let fname = entry.file_name().to_string_lossy().to_string();
        if fname.starts_with('.') || !fname.ends_with(".sql") {
            continue;
        }
        if let Some((version, name)) = parse_filename(&fname)? {
            let sql = std::fs::read_to_string(entry.path()).map_err(read_err)?;
            out.push(MigrationFile { version, name, sql });
        }
    }
    out.sort_by_key(|m| m.version);
    for pair in out.windows(2) {
        if pair[0].version == pair[1].version {
            return Err(MigrationError::DuplicateVersion { version: pair[0].version });
        }
    }
    Ok(out)
}

/// Query-execution seam for the ledger. Production runs against PostgreSQL;
/// tests substitute an in-memory store.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Create the ledger table if it does not exist.
    async fn ensure_ledger(&self) -> Result<(), QueryError>;
    /// Versions already recorded, in ascending order.
    async fn applied_versions(&self) -> Result<Vec<i64>, QueryError>;
    /// Run the migration script and record its version in one transaction.
    async fn apply(&self, migration: &MigrationFile) -> Result<(), QueryError>;
}

/// Ledger state persisted in PostgreSQL. The table name is configurable but
/// must be a plain identifier; it is owned by configuration, never by request
/// input.
pub struct PgMigrationStore {
    pool: PgPool,
    table: String,
}

impl PgMigrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_table(pool, DEFAULT_LEDGER_TABLE)
    }

    pub fn with_table(pool: PgPool, table: &str) -> Self {
        assert!(
            !table.is_empty()
                && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !table.starts_with(|c: char| c.is_ascii_digit()),
            "ledger table name must be a plain identifier"
        );
        PgMigrationStore { pool, table: table.to_string() }
    }

    // Plain async fn, not the trait method: the transaction borrow does not
    // infer as Send inside the trait object's boxed future.
    async fn apply_in_transaction(&self, migration: &MigrationFile) -> Result<(), QueryError> {
        use sqlx::Executor;
        let mut tx = self.pool.begin().await.map_err(|e| QueryError::new("BEGIN", e))?;
        // Scripts may hold several statements; raw_sql runs them all.
        tx.execute(sqlx::raw_sql(&migration.sql))
            .await
            .map_err(|e| QueryError::new(&migration.sql, e))?;
        let stmt = format!("INSERT INTO {} (version, name) VALUES ($1, $2)", self.table);
        sqlx::query(&stmt)
            .bind(migration.version)
            .bind(&migration.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| QueryError::new(&stmt, e))?;
        tx.commit().await.map_err(|e| QueryError::new("COMMIT", e))
    }
}

#[async_trait]
impl MigrationStore for PgMigrationStore {
    async fn ensure_ledger(&self) -> Result<(), QueryError> {
        let stmt = format!(
            "CREATE TABLE IF NOT EXISTS {} (version BIGINT PRIMARY KEY, name TEXT NOT NULL, applied_at TIMESTAMPTZ NOT NULL DEFAULT now())",
            self.table
        );
        sqlx::query(&stmt)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| QueryError::new(&stmt, e))
    }

    async fn applied_versions(&self) -> Result<Vec<i64>, QueryError> {
        let stmt = format!("SELECT version FROM {} ORDER BY version", self.table);
        sqlx::query_scalar::<_, i64>(&stmt)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueryError::new(&stmt, e))
    }

    async fn apply(&self, migration: &MigrationFile) -> Result<(), QueryError> {
        self.apply_in_transaction(migration).await
    }
}

pub struct Ledger<S: MigrationStore> {
    store: S,
}

impl<S: MigrationStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Ledger { store }
    }

    /// Apply every available migration not yet recorded, in ascending version
    /// order, and return the newly applied versions (possibly empty).
    ///
    /// The ledger's current version is the maximum recorded one; anything at
    /// or below it is skipped, never re-applied. A fresh ledger has no current
    /// version, so everything available (version 0 included) is pending. On a
    /// failure the error carries exactly the versions that committed before it.
    pub async fn migrate(&self, available: &[MigrationFile]) -> Result<Vec<i64>, MigrationError> {
        self.store.ensure_ledger().await.map_err(MigrationError::Ledger)?;
        let applied: BTreeSet<i64> = self
            .store
            .applied_versions()
            .await
            .map_err(MigrationError::Ledger)?
            .into_iter()
            .collect();
        let current: Option<i64> = applied.iter().next_back().copied();

        let mut pending: Vec<&MigrationFile> = available
            .iter()
            .filter(|m| current.map_or(true, |c| m.version > c) && !applied.contains(&m.version))
            .collect();
        pending.sort_by_key(|m| m.version);

        let mut newly: Vec<i64> = Vec::new();
        for migration in pending {
            if let Err(source) = self.store.apply(migration).await {
                return Err(MigrationError::Apply {
                    version: migration.version,
                    name: migration.name.clone(),
                    applied: newly,
                    source,
                });
            }
            info!(version = migration.version, name = %migration.name, "applied migration");
            newly.push(migration.version);
        }
        Ok(newly)
    }
}

/// Discover migrations under `dir` and apply the missing ones to `pool`.
pub async fn run(pool: &PgPool, dir: &Path) -> Result<Vec<i64>, MigrationError> {
    let available = discover(dir)?;
    let ledger = Ledger::new(PgMigrationStore::new(pool.clone()));
    let applied = ledger.migrate(&available).await?;
    if applied.is_empty() {
        info!("no new migration file detected");
    } else {
        info!(count = applied.len(), "applied {} migration(s)", applied.len());
    }
    Ok(applied)
}
