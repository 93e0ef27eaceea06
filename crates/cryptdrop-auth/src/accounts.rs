//! File-backed email/password accounts that issue bearer tokens.
//!
//! Passwords are stored as Argon2id PHC strings. Sessions are stored by the
//! SHA-256 digest of their token, so the accounts file never holds a usable
//! bearer token. The whole file is rewritten atomically (temp + rename) after
//! every mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cryptdrop_core::config::AuthConfig;
use cryptdrop_core::types::now_millis;
use cryptdrop_core::{OwnerId, VaultError, VaultResult};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::identity::{Credential, IdentityProvider};

/// Minimum accepted password length for new accounts
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    user_id: OwnerId,
    email: String,
    password_hash: String,
    created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionEntry {
    user_id: OwnerId,
    email: String,
    issued_at: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountsFile {
    /// email → account
    accounts: HashMap<String, Account>,
    /// token digest → session
    sessions: HashMap<String, SessionEntry>,
}

/// A freshly issued session. The token is only available here.
#[derive(Debug)]
pub struct Session {
    pub access_token: SecretString,
    pub user: AccountInfo,
}

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    pub user_id: OwnerId,
    pub email: String,
}

pub struct LocalAccounts {
    path: Option<PathBuf>,
    params: Params,
    inner: Mutex<AccountsFile>,
}

impl LocalAccounts {
    /// Load or create the accounts file at `path`.
    pub fn open(path: &Path, config: &AuthConfig) -> VaultResult<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading accounts: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing accounts: {}", path.display()))?
        } else {
            AccountsFile::default()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            params: argon2_params(config)?,
            inner: Mutex::new(data),
        })
    }

    /// Accounts that live only as long as this value.
    pub fn in_memory(config: &AuthConfig) -> VaultResult<Self> {
        Ok(Self {
            path: None,
            params: argon2_params(config)?,
            inner: Mutex::new(AccountsFile::default()),
        })
    }

    /// Create an account and sign it in.
    pub fn sign_up(&self, email: &str, password: &SecretString) -> VaultResult<Session> {
        let email = normalize_email(email)?;
        if password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
            return Err(VaultError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let mut data = self.lock()?;
        if data.accounts.contains_key(&email) {
            return Err(VaultError::Validation(format!(
                "an account already exists for {email}"
            )));
        }

        let account = Account {
            user_id: OwnerId::new(uuid::Uuid::new_v4().to_string()),
            email: email.clone(),
            password_hash: self.hash_password(password)?,
            created_at: now_millis(),
        };
        let user = AccountInfo {
            user_id: account.user_id.clone(),
            email: email.clone(),
        };
        data.accounts.insert(email.clone(), account);
        let session = issue_session(&mut data, user);
        if let Err(e) = self.flush(&data) {
            data.accounts.remove(&email);
            data.sessions.remove(&session_key(&session));
            return Err(e);
        }

        info!(user_id = %session.user.user_id, "account created");
        Ok(session)
    }

    /// Check a password and issue a new session.
    pub fn sign_in(&self, email: &str, password: &SecretString) -> VaultResult<Session> {
        let email = normalize_email(email)?;
        let mut data = self.lock()?;

        let account = data
            .accounts
            .get(&email)
            .ok_or_else(|| VaultError::Auth("invalid email or password".into()))?;
        if !self.verify_password(password, &account.password_hash) {
            warn!("sign-in rejected");
            return Err(VaultError::Auth("invalid email or password".into()));
        }

        let user = AccountInfo {
            user_id: account.user_id.clone(),
            email: account.email.clone(),
        };
        let session = issue_session(&mut data, user);
        if let Err(e) = self.flush(&data) {
            data.sessions.remove(&session_key(&session));
            return Err(e);
        }

        info!(user_id = %session.user.user_id, "signed in");
        Ok(session)
    }

    /// Revoke the session behind `credential`. Unknown tokens are ignored.
    pub fn sign_out(&self, credential: &Credential) -> VaultResult<()> {
        let mut data = self.lock()?;
        let key = token_digest(credential.token());
        if let Some(session) = data.sessions.remove(&key) {
            if let Err(e) = self.flush(&data) {
                data.sessions.insert(key, session);
                return Err(e);
            }
            info!(user_id = %session.user_id, "signed out");
        }
        Ok(())
    }

    /// Look up the account behind a session token.
    pub fn session(&self, credential: &Credential) -> VaultResult<Option<AccountInfo>> {
        let data = self.lock()?;
        Ok(data
            .sessions
            .get(&token_digest(credential.token()))
            .map(|s| AccountInfo {
                user_id: s.user_id.clone(),
                email: s.email.clone(),
            }))
    }

    fn lock(&self) -> VaultResult<MutexGuard<'_, AccountsFile>> {
        self.inner
            .lock()
            .map_err(|_| VaultError::Other(anyhow::anyhow!("accounts lock poisoned")))
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    fn hash_password(&self, password: &SecretString) -> VaultResult<String> {
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| anyhow::anyhow!("encoding password salt: {e}"))?;
        let hash = self
            .argon2()
            .hash_password(password.expose_secret().as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Argon2id hashing failed: {e}"))?;
        Ok(hash.to_string())
    }

    fn verify_password(&self, password: &SecretString, stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => self
                .argon2()
                .verify_password(password.expose_secret().as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                warn!("stored password hash is unreadable: {e}");
                false
            }
        }
    }

    fn flush(&self, data: &AccountsFile) -> VaultResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating accounts dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(data).context("serializing accounts")?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("writing accounts temp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("renaming accounts: {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for LocalAccounts {
    async fn verify(&self, credential: &Credential) -> VaultResult<OwnerId> {
        self.session(credential)?
            .map(|info| info.user_id)
            .ok_or_else(|| VaultError::Auth("invalid or expired token".into()))
    }
}

fn argon2_params(config: &AuthConfig) -> VaultResult<Params> {
    Params::new(
        config.argon2_mem_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| VaultError::Validation(format!("invalid Argon2id params: {e}")))
}

fn normalize_email(email: &str) -> VaultResult<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(VaultError::Validation("a valid email address is required".into()));
    }
    Ok(email)
}

fn token_digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

fn session_key(session: &Session) -> String {
    token_digest(session.access_token.expose_secret())
}

fn issue_session(data: &mut AccountsFile, user: AccountInfo) -> Session {
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    let token = URL_SAFE_NO_PAD.encode(raw);

    data.sessions.insert(
        token_digest(&token),
        SessionEntry {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            issued_at: now_millis(),
        },
    );

    Session {
        access_token: SecretString::from(token),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> AuthConfig {
        AuthConfig {
            argon2_mem_cost_kib: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            ..Default::default()
        }
    }

    fn pw(s: &str) -> SecretString {
        SecretString::from(s)
    }

    fn bearer(session: &Session) -> Credential {
        Credential::bearer(session.access_token.expose_secret())
    }

    #[tokio::test]
    async fn test_sign_up_issues_verifiable_token() {
        let accounts = LocalAccounts::in_memory(&fast_config()).unwrap();
        let session = accounts.sign_up("Ada@Example.com", &pw("hunter22")).unwrap();

        assert_eq!(session.user.email, "ada@example.com");
        let owner = accounts.verify(&bearer(&session)).await.unwrap();
        assert_eq!(owner, session.user.user_id);
    }

    #[test]
    fn test_duplicate_sign_up_rejected() {
        let accounts = LocalAccounts::in_memory(&fast_config()).unwrap();
        accounts.sign_up("a@b.c", &pw("hunter22")).unwrap();
        let again = accounts.sign_up("A@B.C", &pw("other-pass"));
        assert!(matches!(again, Err(VaultError::Validation(_))));
    }

    #[test]
    fn test_sign_up_validation() {
        let accounts = LocalAccounts::in_memory(&fast_config()).unwrap();
        assert!(accounts.sign_up("not-an-email", &pw("hunter22")).is_err());
        assert!(accounts.sign_up("a@b.c", &pw("short")).is_err());
    }

    #[test]
    fn test_sign_in_checks_password() {
        let accounts = LocalAccounts::in_memory(&fast_config()).unwrap();
        let created = accounts.sign_up("a@b.c", &pw("hunter22")).unwrap();

        let session = accounts.sign_in("a@b.c", &pw("hunter22")).unwrap();
        assert_eq!(session.user.user_id, created.user.user_id);

        let wrong = accounts.sign_in("a@b.c", &pw("hunter23"));
        assert!(matches!(wrong, Err(VaultError::Auth(_))));
        let unknown = accounts.sign_in("x@y.z", &pw("hunter22"));
        assert!(matches!(unknown, Err(VaultError::Auth(_))));
    }

    #[tokio::test]
    async fn test_sign_out_revokes_token() {
        let accounts = LocalAccounts::in_memory(&fast_config()).unwrap();
        let session = accounts.sign_up("a@b.c", &pw("hunter22")).unwrap();
        let cred = bearer(&session);

        accounts.sign_out(&cred).unwrap();

        assert!(accounts.session(&cred).unwrap().is_none());
        assert!(matches!(accounts.verify(&cred).await, Err(VaultError::Auth(_))));
        // Signing out twice is harmless
        accounts.sign_out(&cred).unwrap();
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_no_account_or_session() {
        let dir = tempfile::tempdir().unwrap();
        // Parent "directory" is a regular file, so every flush fails
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let accounts = LocalAccounts::open(&blocker.join("accounts.json"), &fast_config()).unwrap();

        assert!(accounts.sign_up("a@b.c", &pw("hunter22")).is_err());
        assert!(accounts.lock().unwrap().accounts.is_empty());
        assert!(accounts.lock().unwrap().sessions.is_empty());

        // A retry hits the same flush failure, not a duplicate-account error
        let again = accounts.sign_up("a@b.c", &pw("hunter22"));
        assert!(!matches!(again, Err(VaultError::Validation(_))));
        let sign_in = accounts.sign_in("a@b.c", &pw("hunter22"));
        assert!(matches!(sign_in, Err(VaultError::Auth(_))));
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_session_on_sign_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let accounts = LocalAccounts::open(&path, &fast_config()).unwrap();
        let session = accounts.sign_up("a@b.c", &pw("hunter22")).unwrap();
        let cred = bearer(&session);

        // A directory where the temp file goes makes the next flush fail
        std::fs::create_dir(path.with_extension("tmp")).unwrap();

        assert!(accounts.sign_out(&cred).is_err());
        assert!(accounts.verify(&cred).await.is_ok());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/accounts.json");
        let config = fast_config();

        let session = {
            let accounts = LocalAccounts::open(&path, &config).unwrap();
            accounts.sign_up("a@b.c", &pw("hunter22")).unwrap()
        };

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(
            !content.contains(session.access_token.expose_secret()),
            "raw tokens must not be persisted"
        );
        assert!(!content.contains("hunter22"));

        let reopened = LocalAccounts::open(&path, &config).unwrap();
        let owner = reopened.verify(&bearer(&session)).await.unwrap();
        assert_eq!(owner, session.user.user_id);
        assert!(reopened.sign_in("a@b.c", &pw("hunter22")).is_ok());
    }
}
