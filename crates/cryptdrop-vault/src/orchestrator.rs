//! Storage orchestrator: keeps blobs and catalog records in step.
//!
//! Every operation resolves the owner from a verified credential first and
//! scopes catalog lookups to that owner. Blob and record changes are ordered
//! so that a failure never leaves a record pointing at a missing blob:
//!
//!   - upload: put blob, then insert record. A failed insert removes the blob
//!     once; if that removal also fails the blob is queued as an orphan.
//!   - delete: remove blob, then delete record. A failed blob removal leaves
//!     the record untouched; a failed record delete is queued.
//!
//! Concurrent mutations of the same storage path within this process are
//! refused rather than serialized.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cryptdrop_auth::{Credential, IdentityProvider};
use cryptdrop_core::config::{AuthConfig, CryptoConfig, ShareConfig};
use cryptdrop_core::types::{now_millis, storage_path, ObjectState};
use cryptdrop_core::{OwnerId, StoredObjectRecord, VaultError, VaultResult};
use cryptdrop_crypto::{LocalFile, ENCRYPTED_MIME, NONCE_SIZE, TAG_SIZE};

// Nonce, tag and an optional version byte around the sealed plaintext
const CONTAINER_OVERHEAD: u64 = (NONCE_SIZE + TAG_SIZE + 1) as u64;
use cryptdrop_storage::ObjectStore;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::catalog::{MetadataCatalog, NewRecord};
use crate::reconcile::{ReconcileQueue, ReconcileReport, ReconcileTask};

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub success: bool,
    pub record_id: String,
    pub file_path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReceipt {
    pub success: bool,
    pub record_id: String,
    pub message: String,
}

/// A signed, time-limited read URL for a stored blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadLink {
    pub url: String,
    pub file_name: String,
    pub expires_in_secs: u64,
    /// Minted without verifying the caller
    pub public: bool,
}

pub struct StorageOrchestrator {
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn MetadataCatalog>,
    identity: Arc<dyn IdentityProvider>,
    share: ShareConfig,
    anonymous_owner: Option<OwnerId>,
    max_upload_bytes: u64,
    inflight: Mutex<HashMap<String, ObjectState>>,
    pending: ReconcileQueue,
}

impl StorageOrchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn MetadataCatalog>,
        identity: Arc<dyn IdentityProvider>,
        share: &ShareConfig,
        auth: &AuthConfig,
    ) -> Self {
        let anonymous_owner = auth.anonymous_upload_owner.as_deref().map(OwnerId::new);
        if let Some(owner) = &anonymous_owner {
            warn!(owner = %owner, "uploads without a credential are accepted");
        }
        Self {
            store,
            catalog,
            identity,
            share: share.clone(),
            anonymous_owner,
            max_upload_bytes: CryptoConfig::default().max_file_bytes,
            inflight: Mutex::new(HashMap::new()),
            pending: ReconcileQueue::in_memory(),
        }
    }

    /// Use a persistent queue for cleanup tasks instead of the in-memory one.
    pub fn with_reconcile_queue(mut self, queue: ReconcileQueue) -> Self {
        self.pending = queue;
        self
    }

    /// Largest plaintext an uploaded container may hold, normally
    /// `crypto.max_file_bytes`.
    pub fn with_max_upload_bytes(mut self, limit: u64) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    pub fn reconcile_queue(&self) -> &ReconcileQueue {
        &self.pending
    }

    /// Store an encrypted file under the caller's namespace and record it.
    ///
    /// `credential` may be `None` only when an anonymous upload owner is
    /// configured.
    pub async fn upload(
        &self,
        credential: Option<&Credential>,
        file: &LocalFile,
    ) -> VaultResult<UploadReceipt> {
        let owner = match credential {
            Some(c) => self.identity.verify(c).await?,
            None => self
                .anonymous_owner
                .clone()
                .ok_or_else(|| VaultError::Auth("missing bearer token".into()))?,
        };
        validate_upload_name(file)?;
        let allowed = self.max_upload_bytes.saturating_add(CONTAINER_OVERHEAD);
        if file.len() as u64 > allowed {
            return Err(VaultError::Validation(format!(
                "file too large: {} bytes (maximum {allowed})",
                file.len()
            )));
        }

        let existing = self.catalog.query(Some(&owner)).await?;
        if existing.iter().any(|r| r.file_name == file.name) {
            return Err(VaultError::Validation(format!(
                "{} is already stored; delete it first",
                file.name
            )));
        }

        let path = storage_path(&owner, &file.name);
        let _guard = self.begin(&path, ObjectState::Uploading)?;
        let size = file.len() as u64;

        self.store
            .put(&path, file.data.clone(), ENCRYPTED_MIME)
            .await?;

        let inserted = self
            .catalog
            .insert(NewRecord {
                owner_id: owner.clone(),
                file_name: file.name.clone(),
                file_path: path.clone(),
                file_size: size,
                uploaded_at: now_millis(),
            })
            .await;

        let record = match inserted {
            Ok(record) => record,
            Err(insert_err) => return Err(self.compensate_upload(&owner, &path, insert_err).await),
        };

        info!(
            owner = %owner,
            path = %path,
            record = %record.id,
            bytes = size,
            state = %ObjectState::Present,
            "uploaded"
        );

        Ok(UploadReceipt {
            success: true,
            record_id: record.id,
            file_path: path,
            message: "file uploaded".into(),
        })
    }

    async fn compensate_upload(
        &self,
        owner: &OwnerId,
        path: &str,
        insert_err: VaultError,
    ) -> VaultError {
        warn!(path = %path, error = %insert_err, "record insert failed, removing blob");
        match self.store.remove(path).await {
            Ok(()) => VaultError::Backend(format!("failed to record {path}: {insert_err}")),
            Err(remove_err) => {
                error!(
                    path = %path,
                    error = %remove_err,
                    "blob removal after failed insert also failed, queued for reconciliation"
                );
                self.pending.push(ReconcileTask::OrphanBlob {
                    path: path.to_string(),
                    owner_id: owner.clone(),
                    reason: insert_err.to_string(),
                    queued_at: now_millis(),
                });
                VaultError::Consistency(format!(
                    "{path} was stored but not recorded, and removing it failed: {remove_err}"
                ))
            }
        }
    }

    /// The caller's records, newest upload first.
    pub async fn list(&self, credential: &Credential) -> VaultResult<Vec<StoredObjectRecord>> {
        let owner = self.identity.verify(credential).await?;
        let records = self.catalog.query(Some(&owner)).await?;
        debug!(owner = %owner, count = records.len(), "listed records");
        Ok(records)
    }

    /// Signed URL for one of the caller's own files.
    pub async fn download_link(
        &self,
        record_id: &str,
        credential: &Credential,
    ) -> VaultResult<DownloadLink> {
        self.get_download_link(record_id, Some(credential), false)
            .await
    }

    /// Signed URL minted from the record id alone, for sharing.
    pub async fn share_link(&self, record_id: &str) -> VaultResult<DownloadLink> {
        self.get_download_link(record_id, None, true).await
    }

    /// Mint a signed read URL.
    ///
    /// With `public` unset the record is resolved within the caller's
    /// namespace, so another owner's record reads as not found. With `public`
    /// set no credential is checked and anyone holding the record id gets a
    /// link; this path can be switched off with `share.public_links`.
    pub async fn get_download_link(
        &self,
        record_id: &str,
        credential: Option<&Credential>,
        public: bool,
    ) -> VaultResult<DownloadLink> {
        let (record, ttl) = if public {
            if !self.share.public_links {
                return Err(VaultError::Forbidden("public share links are disabled".into()));
            }
            let record = self.catalog.get(record_id).await?;
            warn!(
                record = %record.id,
                path = %record.file_path,
                "public share link minted without authentication"
            );
            (record, self.share.share_link_ttl_secs)
        } else {
            let credential =
                credential.ok_or_else(|| VaultError::Auth("missing bearer token".into()))?;
            let owner = self.identity.verify(credential).await?;
            let record = self.owned_record(record_id, &owner).await?;
            (record, self.share.download_link_ttl_secs)
        };

        let url = self
            .store
            .sign_url(&record.file_path, Duration::from_secs(ttl))
            .await?;
        debug!(record = %record.id, ttl_secs = ttl, public, "signed link");

        Ok(DownloadLink {
            url,
            file_name: record.file_name,
            expires_in_secs: ttl,
            public,
        })
    }

    /// Read back one of the caller's blobs.
    pub async fn fetch(
        &self,
        record_id: &str,
        credential: &Credential,
    ) -> VaultResult<(StoredObjectRecord, Vec<u8>)> {
        let owner = self.identity.verify(credential).await?;
        let record = self.owned_record(record_id, &owner).await?;
        let bytes = self.store.get(&record.file_path).await?;
        info!(record = %record.id, bytes = bytes.len(), "fetched");
        Ok((record, bytes))
    }

    /// Remove a blob and then its record.
    ///
    /// Fails with `Forbidden` when the record belongs to someone else.
    pub async fn delete(
        &self,
        record_id: &str,
        credential: &Credential,
    ) -> VaultResult<DeleteReceipt> {
        let owner = self.identity.verify(credential).await?;
        let record = self.catalog.get(record_id).await?;
        if record.owner_id != owner {
            return Err(VaultError::Forbidden(format!(
                "record {record_id} belongs to another owner"
            )));
        }

        let _guard = self.begin(&record.file_path, ObjectState::Deleting)?;

        // Record stays in place when the blob cannot be removed
        self.store.remove(&record.file_path).await?;

        if let Err(e) = self.catalog.delete(&record.id).await {
            error!(
                record = %record.id,
                path = %record.file_path,
                error = %e,
                "blob removed but record delete failed, queued for reconciliation"
            );
            self.pending.push(ReconcileTask::OrphanRecord {
                record_id: record.id.clone(),
                path: record.file_path.clone(),
                reason: e.to_string(),
                queued_at: now_millis(),
            });
            return Err(VaultError::Backend(format!(
                "blob {} removed but its record could not be deleted: {e}",
                record.file_path
            )));
        }

        info!(owner = %owner, record = %record.id, path = %record.file_path, "deleted");
        Ok(DeleteReceipt {
            success: true,
            record_id: record.id,
            message: "file deleted".into(),
        })
    }

    /// Attempt each queued cleanup task once. A task stays queued until it
    /// resolves, so an interrupted pass loses nothing.
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for task in self.pending.list() {
            match self.reconcile_one(&task).await {
                Ok(()) => {
                    info!(path = %task.path(), "reconciled");
                    self.pending.remove(&task);
                    report.resolved += 1;
                }
                Err(e) => {
                    warn!(path = %task.path(), error = %e, "reconcile attempt failed");
                    report.remaining += 1;
                }
            }
        }
        report
    }

    async fn reconcile_one(&self, task: &ReconcileTask) -> VaultResult<()> {
        match task {
            ReconcileTask::OrphanBlob { path, owner_id, .. } => {
                let _guard = self.begin(path, ObjectState::Deleting)?;
                // The path may have been uploaded again since the task was queued
                let owned = self.catalog.query(Some(owner_id)).await?;
                if owned.iter().any(|r| &r.file_path == path) {
                    debug!(path = %path, "orphan blob now backs a live record, leaving it");
                    return Ok(());
                }
                match self.store.remove(path).await {
                    Err(VaultError::NotFound(_)) => Ok(()),
                    other => other,
                }
            }
            ReconcileTask::OrphanRecord { record_id, .. } => {
                match self.catalog.delete(record_id).await {
                    Err(VaultError::NotFound(_)) => Ok(()),
                    other => other,
                }
            }
        }
    }

    async fn owned_record(&self, record_id: &str, owner: &OwnerId) -> VaultResult<StoredObjectRecord> {
        match self.catalog.get(record_id).await {
            Ok(record) if &record.owner_id == owner => Ok(record),
            Ok(_) | Err(VaultError::NotFound(_)) => {
                Err(VaultError::NotFound(format!("record {record_id}")))
            }
            Err(e) => Err(e),
        }
    }

    fn begin(&self, path: &str, state: ObjectState) -> VaultResult<InflightGuard<'_>> {
        let mut inflight = self
            .inflight
            .lock()
            .map_err(|_| VaultError::Backend("in-flight table lock poisoned".into()))?;
        if let Some(current) = inflight.get(path) {
            return Err(VaultError::Validation(format!(
                "{path} is busy ({current}), try again"
            )));
        }
        inflight.insert(path.to_string(), state);
        debug!(path = %path, state = %state, "begin");
        Ok(InflightGuard {
            table: &self.inflight,
            path: path.to_string(),
        })
    }
}

/// Clears a path's in-flight entry when the operation finishes, whichever
/// way it ends.
struct InflightGuard<'a> {
    table: &'a Mutex<HashMap<String, ObjectState>>,
    path: String,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut table) = self.table.lock() {
            table.remove(&self.path);
        }
    }
}

fn validate_upload_name(file: &LocalFile) -> VaultResult<()> {
    let name = file.name.as_str();
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\')
    {
        return Err(VaultError::Validation(format!("invalid file name: {name:?}")));
    }
    if !file.is_encrypted() {
        return Err(VaultError::Validation(format!(
            "{name} is not encrypted; only encrypted files can be stored"
        )));
    }
    Ok(())
}
