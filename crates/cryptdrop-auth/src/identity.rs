//! Bearer credentials and the identity-provider seam

use std::collections::HashMap;

use async_trait::async_trait;
use cryptdrop_core::{OwnerId, VaultError, VaultResult};
use secrecy::{ExposeSecret, SecretString};

/// A caller-supplied bearer token. Never logged.
#[derive(Debug)]
pub struct Credential {
    token: SecretString,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }

    /// Parse an `Authorization` header value (`Bearer <token>`).
    pub fn from_header(value: &str) -> VaultResult<Self> {
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VaultError::Auth("malformed authorization header".into()))?;
        Ok(Self::bearer(token))
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

/// Verifies bearer credentials and yields the owner they belong to.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, credential: &Credential) -> VaultResult<OwnerId>;
}

/// Fixed token → owner table, for service accounts and tests
#[derive(Default)]
pub struct StaticTokens {
    tokens: HashMap<String, OwnerId>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, owner: &str) -> Self {
        self.tokens.insert(token.to_string(), OwnerId::new(owner));
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticTokens {
    async fn verify(&self, credential: &Credential) -> VaultResult<OwnerId> {
        self.tokens
            .get(credential.token())
            .cloned()
            .ok_or_else(|| VaultError::Auth("invalid or expired token".into()))
    }
}
