//! cryptdrop-auth: who is calling, and with which storage credentials
//!
//! - `IdentityProvider` turns a bearer credential into a verified `OwnerId`.
//! - `LocalAccounts` is a file-backed provider with email/password sign-up,
//!   sign-in, sign-out and session lookup.
//! - `S3Credentials` are read from the environment for the storage operator.

pub mod accounts;
pub mod identity;

pub use accounts::{AccountInfo, LocalAccounts, Session};
pub use identity::{Credential, IdentityProvider, StaticTokens};

use secrecy::SecretString;

/// S3 credentials sourced from the environment
#[derive(Debug)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub source: String,
}

impl S3Credentials {
    /// Read `AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY`, falling back to the
    /// `CRYPTDROP_`-prefixed names. Returns `None` when no access key is set.
    pub fn from_env() -> Option<Self> {
        let lookup = |primary: &str, fallback: &str| {
            std::env::var(primary)
                .or_else(|_| std::env::var(fallback))
                .ok()
                .filter(|v| !v.is_empty())
        };

        let access_key_id = lookup("AWS_ACCESS_KEY_ID", "CRYPTDROP_ACCESS_KEY_ID")?;
        let secret = lookup("AWS_SECRET_ACCESS_KEY", "CRYPTDROP_SECRET_ACCESS_KEY")
            .unwrap_or_default();

        Some(S3Credentials {
            access_key_id,
            secret_access_key: SecretString::from(secret),
            source: "env".into(),
        })
    }
}
