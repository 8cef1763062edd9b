//! Identity: credential verification and session-backed identity storage.
//! Keep the public surface thin and split implementation across sub-modules.

mod account;
mod session;
mod verifier;

pub use account::{Account, AccountDirectory, IdentityView, PgAccounts};
pub use session::{deserialize_account, serialize_account, SessionStore, SessionToken};
pub use verifier::{hash_password, verify_password, LocalVerifier, Verifier, VerifyOutcome};
