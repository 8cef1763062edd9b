use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier as _};
use async_trait::async_trait;
use password_hash::{PasswordHash, SaltString};

use super::account::{AccountDirectory, IdentityView};
use crate::error::QueryError;

/// Result of a credential check. Unknown username and wrong password collapse
/// into the same `Unauthenticated` value; callers cannot tell them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified(IdentityView),
    Unauthenticated,
}

/// Credential verification strategy. One concrete implementation today;
/// the seam leaves room for future strategies without inheritance.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> Result<VerifyOutcome, QueryError>;
}

/// Password check against the account directory: one lookup by unique
/// username, then a one-way-transform comparison against the stored value.
pub struct LocalVerifier<D: AccountDirectory> {
    accounts: D,
}

impl<D: AccountDirectory> LocalVerifier<D> {
    pub fn new(accounts: D) -> Self {
        LocalVerifier { accounts }
    }
}

#[async_trait]
impl<D: AccountDirectory> Verifier for LocalVerifier<D> {
    async fn verify(&self, username: &str, password: &str) -> Result<VerifyOutcome, QueryError> {
        let Some(account) = self.accounts.find_by_username(username).await? else {
            return Ok(VerifyOutcome::Unauthenticated);
        };
        if verify_password(&account.password, password) {
            Ok(VerifyOutcome::Verified(account.into()))
        } else {
            Ok(VerifyOutcome::Unauthenticated)
        }
    }
}

/// Produce a PHC-format hash for storage. Account creation itself lives
/// outside the core; this is used by seeding scripts and tests.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!(e.to_string()))?
        .to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}
