//! Session-backed identity store.
//!
//! Sessions live in the same PostgreSQL store as accounts. The client holds an
//! opaque token; only a secret-keyed digest of it is persisted, so a leaked
//! session table does not yield usable tokens. Serialization of an identity is
//! always its primary id; deserialization re-reads the account on every
//! request, and a dangling id (account deleted under a live session) resolves
//! to `None`, which callers must treat as an expired session.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use super::account::{AccountDirectory, IdentityView, PgAccounts};
use crate::error::QueryError;

pub type SessionToken = String;

const TOKEN_BYTES: usize = 32;
const DEFAULT_TTL_SECS: i64 = 60 * 60;

/// Serialize an authenticated identity into the stable identifier persisted
/// with its session. Pure: always the primary id.
pub fn serialize_account(view: &IdentityView) -> i32 {
    view.id
}

/// Resolve a serialized identifier back into an identity view. `None` means
/// the identifier no longer maps to an account; callers must force
/// re-authentication, exactly as for an expired session.
pub async fn deserialize_account<D: AccountDirectory>(
    accounts: &D,
    id: i32,
) -> Result<Option<IdentityView>, QueryError> {
    accounts.find_by_id(id).await
}

fn gen_token() -> SessionToken {
    // 256-bit random token, base64url without padding. An RNG failure must
    // never hand out the zeroed buffer as a token.
    let mut buf = [0u8; TOKEN_BYTES];
    getrandom::getrandom(&mut buf).expect("operating system RNG unavailable");
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

fn keyed_digest(secret: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(token.as_bytes());
    let out = hasher.finalize();
    let mut hex = String::with_capacity(out.len() * 2);
    use std::fmt::Write as _;
    for b in out {
        let _ = write!(&mut hex, "{:02x}", b);
    }
    hex
}

/// Persisted session lifecycle: open on login, resolve on every request,
/// close on logout, sweep on expiry. The integrity secret is injected at
/// construction, never read from ambient state.
pub struct SessionStore {
    pool: PgPool,
    accounts: PgAccounts,
    secret: String,
    ttl_secs: i64,
}

impl SessionStore {
    pub fn new(pool: PgPool, secret: impl Into<String>) -> Self {
        let accounts = PgAccounts::new(pool.clone());
        SessionStore { pool, accounts, secret: secret.into(), ttl_secs: DEFAULT_TTL_SECS }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Create a session for an authenticated identity; returns the opaque
    /// token handed to the client.
    pub async fn open(&self, who: &IdentityView) -> Result<SessionToken, QueryError> {
        const STMT: &str = "INSERT INTO session (sid, user_id, expires_at) VALUES ($1, $2, $3)";
        let token = gen_token();
        let expires_at: DateTime<Utc> = Utc::now() + Duration::seconds(self.ttl_secs);
        sqlx::query(STMT)
            .bind(keyed_digest(&self.secret, &token))
            .bind(serialize_account(who))
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| QueryError::new(STMT, e))?;
        Ok(token)
    }

    /// Look up the identity behind a client token. `None` covers unknown,
    /// expired, and dangling (account deleted) sessions alike.
    pub async fn resolve(&self, token: &str) -> Result<Option<IdentityView>, QueryError> {
        const STMT: &str = "SELECT user_id FROM session WHERE sid = $1 AND expires_at > now()";
        let user_id: Option<i32> = sqlx::query_scalar(STMT)
            .bind(keyed_digest(&self.secret, token))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueryError::new(STMT, e))?;
        match user_id {
            None => Ok(None),
            Some(id) => deserialize_account(&self.accounts, id).await,
        }
    }

    /// Destroy a session on logout. Returns whether one existed.
    pub async fn close(&self, token: &str) -> Result<bool, QueryError> {
        const STMT: &str = "DELETE FROM session WHERE sid = $1";
        let done = sqlx::query(STMT)
            .bind(keyed_digest(&self.secret, token))
            .execute(&self.pool)
            .await
            .map_err(|e| QueryError::new(STMT, e))?;
        Ok(done.rows_affected() > 0)
    }

    /// Remove expired rows. Driven by the background sweeper; resolve already
    /// filters on expiry, so this is purely housekeeping.
    pub async fn sweep_expired(&self) -> Result<u64, QueryError> {
        const STMT: &str = "DELETE FROM session WHERE expires_at <= now()";
        let done = sqlx::query(STMT)
            .execute(&self.pool)
            .await
            .map_err(|e| QueryError::new(STMT, e))?;
        Ok(done.rows_affected())
    }
}
