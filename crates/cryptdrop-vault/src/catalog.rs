//! Metadata catalog: one record per stored blob, queryable by owner.
//!
//! `JsonCatalog` keeps every record in memory and rewrites its backing file
//! atomically (write temp, then rename) on each mutation. A mutation whose
//! flush fails is rolled back in memory, so the file and the in-memory view
//! never disagree.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use async_trait::async_trait;
use cryptdrop_core::{OwnerId, StoredObjectRecord, VaultError, VaultResult};

/// Record fields supplied by the caller; the catalog assigns the id.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub owner_id: OwnerId,
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub uploaded_at: u64,
}

#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    async fn insert(&self, record: NewRecord) -> VaultResult<StoredObjectRecord>;

    /// Records for `owner` (all records when `None`), newest upload first.
    async fn query(&self, owner: Option<&OwnerId>) -> VaultResult<Vec<StoredObjectRecord>>;

    /// Fails with `VaultError::NotFound` when no record has this id.
    async fn get(&self, id: &str) -> VaultResult<StoredObjectRecord>;

    async fn delete(&self, id: &str) -> VaultResult<()>;
}

pub struct JsonCatalog {
    path: Option<PathBuf>,
    /// Insertion order
    records: Mutex<Vec<StoredObjectRecord>>,
}

impl JsonCatalog {
    /// Load or create a catalog at the given path.
    pub fn open(path: &Path) -> VaultResult<Self> {
        let records = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading catalog: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing catalog: {}", path.display()))?
        } else {
            Vec::new()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            records: Mutex::new(records),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> VaultResult<MutexGuard<'_, Vec<StoredObjectRecord>>> {
        self.records
            .lock()
            .map_err(|_| VaultError::Backend("catalog lock poisoned".into()))
    }

    fn flush(&self, records: &[StoredObjectRecord]) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating catalog dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(records).context("serializing catalog")?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("writing catalog temp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("renaming catalog: {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl MetadataCatalog for JsonCatalog {
    async fn insert(&self, record: NewRecord) -> VaultResult<StoredObjectRecord> {
        let stored = StoredObjectRecord {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: record.owner_id,
            file_name: record.file_name,
            file_path: record.file_path,
            file_size: record.file_size,
            uploaded_at: record.uploaded_at,
        };

        let mut records = self.lock()?;
        records.push(stored.clone());
        if let Err(e) = self.flush(&records) {
            records.pop();
            return Err(VaultError::backend("inserting record", format!("{e:#}")));
        }
        Ok(stored)
    }

    async fn query(&self, owner: Option<&OwnerId>) -> VaultResult<Vec<StoredObjectRecord>> {
        let records = self.lock()?;
        // Reverse first so the stable sort keeps later inserts ahead on ties
        let mut out: Vec<StoredObjectRecord> = records
            .iter()
            .rev()
            .filter(|r| owner.is_none_or(|o| &r.owner_id == o))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(out)
    }

    async fn get(&self, id: &str) -> VaultResult<StoredObjectRecord> {
        self.lock()?
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("record {id}")))
    }

    async fn delete(&self, id: &str) -> VaultResult<()> {
        let mut records = self.lock()?;
        let idx = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| VaultError::NotFound(format!("record {id}")))?;
        let removed = records.remove(idx);
        if let Err(e) = self.flush(&records) {
            records.insert(idx, removed);
            return Err(VaultError::backend("deleting record", format!("{e:#}")));
        }
        Ok(())
    }
}
