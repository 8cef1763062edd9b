use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::error::QueryError;

/// A row from the `users` table. The password column holds a PHC-format
/// one-way transform output, never plaintext.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: i32,
    pub username: String,
    pub password: String,
    pub is_admin: bool,
    pub fullname: String,
    pub tel: String,
}

/// Account minus its secret: the per-request authenticated identity
/// projection. Recomputed on every request, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct IdentityView {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
    pub fullname: String,
    pub tel: String,
}

impl From<Account> for IdentityView {
    fn from(a: Account) -> Self {
        IdentityView {
            id: a.id,
            username: a.username,
            is_admin: a.is_admin,
            fullname: a.fullname,
            tel: a.tel,
        }
    }
}

/// Read-only account lookup seam. The core never creates or mutates accounts.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, QueryError>;
    async fn find_by_id(&self, id: i32) -> Result<Option<IdentityView>, QueryError>;
}

const FIND_BY_USERNAME: &str =
    "SELECT id, username, password, is_admin, fullname, tel FROM users WHERE username = $1";
const FIND_BY_ID: &str =
    "SELECT id, username, is_admin, fullname, tel FROM users WHERE id = $1";

/// PostgreSQL-backed directory. All lookups are parameterized; user-supplied
/// values never reach statement text.
pub struct PgAccounts {
    pool: PgPool,
}

impl PgAccounts {
    pub fn new(pool: PgPool) -> Self {
        PgAccounts { pool }
    }
}

#[async_trait]
impl AccountDirectory for PgAccounts {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, QueryError> {
        sqlx::query_as::<_, Account>(FIND_BY_USERNAME)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueryError::new(FIND_BY_USERNAME, e))
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<IdentityView>, QueryError> {
        sqlx::query_as::<_, IdentityView>(FIND_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueryError::new(FIND_BY_ID, e))
    }
}
