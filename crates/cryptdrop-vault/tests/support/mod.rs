//! Test doubles: an in-memory store and catalog with switchable failures

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cryptdrop_auth::{Credential, StaticTokens};
use cryptdrop_core::config::{AuthConfig, ShareConfig};
use cryptdrop_core::{OwnerId, StoredObjectRecord, VaultError, VaultResult};
use cryptdrop_crypto::{LocalFile, ENCRYPTED_MIME};
use cryptdrop_storage::{ObjectStore, OpendalStore};
use cryptdrop_vault::{JsonCatalog, MetadataCatalog, NewRecord, StorageOrchestrator};
use opendal::Operator;
use tokio::sync::Notify;

/// Memory-backed store. Signed URLs are fake but carry the path and TTL.
pub struct FlakyStore {
    inner: OpendalStore,
    pub fail_put: AtomicBool,
    pub fail_remove: AtomicBool,
    pub puts: AtomicUsize,
    /// While set, `put` signals `entered` and parks until `release`
    pub hold_puts: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl FlakyStore {
    pub fn new() -> Self {
        let op = Operator::new(opendal::services::Memory::default())
            .expect("memory operator")
            .finish();
        Self {
            inner: OpendalStore::new(op),
            fail_put: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            puts: AtomicUsize::new(0),
            hold_puts: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.inner.operator().exists(path).await.expect("stat")
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> VaultResult<String> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(VaultError::Backend(format!("injected put failure: {path}")));
        }
        if self.hold_puts.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(path, bytes, content_type).await
    }

    async fn get(&self, path: &str) -> VaultResult<Vec<u8>> {
        self.inner.get(path).await
    }

    async fn remove(&self, path: &str) -> VaultResult<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(VaultError::Backend(format!("injected remove failure: {path}")));
        }
        self.inner.remove(path).await
    }

    async fn sign_url(&self, path: &str, ttl: Duration) -> VaultResult<String> {
        if !self.contains(path).await {
            return Err(VaultError::NotFound(format!("object {path}")));
        }
        Ok(format!("memory://{path}?expires_in={}", ttl.as_secs()))
    }
}

/// In-memory catalog with switchable insert/delete failures
pub struct FlakyCatalog {
    inner: JsonCatalog,
    pub fail_insert: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FlakyCatalog {
    pub fn new() -> Self {
        Self {
            inner: JsonCatalog::in_memory(),
            fail_insert: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }

    pub async fn all(&self) -> Vec<StoredObjectRecord> {
        self.inner.query(None).await.expect("query")
    }
}

#[async_trait]
impl MetadataCatalog for FlakyCatalog {
    async fn insert(&self, record: NewRecord) -> VaultResult<StoredObjectRecord> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(VaultError::Backend("injected insert failure".into()));
        }
        self.inner.insert(record).await
    }

    async fn query(&self, owner: Option<&OwnerId>) -> VaultResult<Vec<StoredObjectRecord>> {
        self.inner.query(owner).await
    }

    async fn get(&self, id: &str) -> VaultResult<StoredObjectRecord> {
        self.inner.get(id).await
    }

    async fn delete(&self, id: &str) -> VaultResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(VaultError::Backend("injected delete failure".into()));
        }
        self.inner.delete(id).await
    }
}

pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub catalog: Arc<FlakyCatalog>,
    pub vault: StorageOrchestrator,
}

/// Tokens `t1` → `u1` and `t2` → `u2`.
pub fn harness() -> Harness {
    harness_with(&ShareConfig::default(), &AuthConfig::default())
}

pub fn harness_with(share: &ShareConfig, auth: &AuthConfig) -> Harness {
    let store = Arc::new(FlakyStore::new());
    let catalog = Arc::new(FlakyCatalog::new());
    let identity = StaticTokens::new()
        .with_token("t1", "u1")
        .with_token("t2", "u2");
    let vault = StorageOrchestrator::new(
        store.clone(),
        catalog.clone(),
        Arc::new(identity),
        share,
        auth,
    );
    Harness {
        store,
        catalog,
        vault,
    }
}

pub fn u1() -> Credential {
    Credential::bearer("t1")
}

pub fn u2() -> Credential {
    Credential::bearer("t2")
}

pub fn encrypted(name: &str, len: usize) -> LocalFile {
    LocalFile::new(name, ENCRYPTED_MIME, vec![0xA5; len])
}
