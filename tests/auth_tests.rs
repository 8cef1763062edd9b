//! Credential verification and session identity round-trip properties,
//! exercised against an in-memory account directory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orderdesk::auth::{
    deserialize_account, hash_password, serialize_account, Account, AccountDirectory,
    IdentityView, LocalVerifier, Verifier, VerifyOutcome,
};
use orderdesk::error::QueryError;

#[derive(Default, Clone)]
struct MemAccounts {
    rows: Arc<Mutex<HashMap<i32, Account>>>,
}

impl MemAccounts {
    fn insert(&self, account: Account) {
        self.rows.lock().unwrap().insert(account.id, account);
    }

    fn remove(&self, id: i32) {
        self.rows.lock().unwrap().remove(&id);
    }
}

#[async_trait]
impl AccountDirectory for MemAccounts {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, QueryError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.values().find(|a| a.username == username).cloned())
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<IdentityView>, QueryError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.get(&id).cloned().map(IdentityView::from))
    }
}

fn account(id: i32, username: &str, password: &str, is_admin: bool) -> Account {
    Account {
        id,
        username: username.to_string(),
        password: hash_password(password).unwrap(),
        is_admin,
        fullname: format!("{username} Example"),
        tel: "000-0000".to_string(),
    }
}

#[tokio::test]
async fn verify_returns_the_account_minus_its_password() {
    let dir = MemAccounts::default();
    dir.insert(account(1, "alice", "s3cr3t!", true));
    let verifier = LocalVerifier::new(dir.clone());

    match verifier.verify("alice", "s3cr3t!").await.unwrap() {
        VerifyOutcome::Verified(who) => {
            assert_eq!(who.id, 1);
            assert_eq!(who.username, "alice");
            assert!(who.is_admin);
            assert_eq!(who.fullname, "alice Example");
            assert_eq!(who.tel, "000-0000");
        }
        VerifyOutcome::Unauthenticated => panic!("expected a verified account"),
    }
}

#[tokio::test]
async fn unknown_user_and_wrong_password_are_indistinguishable() {
    let dir = MemAccounts::default();
    dir.insert(account(1, "alice", "s3cr3t!", false));
    let verifier = LocalVerifier::new(dir.clone());

    let unknown = verifier.verify("mallory", "s3cr3t!").await.unwrap();
    let wrong = verifier.verify("alice", "guess").await.unwrap();
    assert_eq!(unknown, VerifyOutcome::Unauthenticated);
    assert_eq!(wrong, VerifyOutcome::Unauthenticated);
    // The two negative cases must be observably identical to the caller.
    assert_eq!(unknown, wrong);
}

#[tokio::test]
async fn identity_round_trips_through_its_serialized_id() {
    let dir = MemAccounts::default();
    dir.insert(account(7, "bob", "pw", false));

    let view = match LocalVerifier::new(dir.clone()).verify("bob", "pw").await.unwrap() {
        VerifyOutcome::Verified(v) => v,
        VerifyOutcome::Unauthenticated => panic!("seeded account must verify"),
    };

    let id = serialize_account(&view);
    let restored = deserialize_account(&dir, id).await.unwrap();
    assert_eq!(restored, Some(view));
}

#[tokio::test]
async fn deleted_account_deserializes_to_not_found() {
    let dir = MemAccounts::default();
    dir.insert(account(7, "bob", "pw", false));
    let id = {
        let found = dir.find_by_username("bob").await.unwrap().unwrap();
        serialize_account(&IdentityView::from(found))
    };

    dir.remove(7);
    // The session identifier now dangles; callers must force re-authentication.
    let restored = deserialize_account(&dir, id).await.unwrap();
    assert_eq!(restored, None);
}
