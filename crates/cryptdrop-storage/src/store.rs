//! Blob store seam used by the orchestrator

use std::time::Duration;

use async_trait::async_trait;
use cryptdrop_core::{VaultError, VaultResult};
use opendal::{ErrorKind, Operator};
use tracing::debug;

/// Opaque blob storage keyed by path, with signed-URL capability
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path`. Fails if a blob already exists there.
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> VaultResult<String>;

    async fn get(&self, path: &str) -> VaultResult<Vec<u8>>;

    async fn remove(&self, path: &str) -> VaultResult<()>;

    /// Mint a time-limited URL for reading the blob at `path`.
    async fn sign_url(&self, path: &str, ttl: Duration) -> VaultResult<String>;
}

/// `ObjectStore` over an OpenDAL operator
#[derive(Clone)]
pub struct OpendalStore {
    op: Operator,
}

impl OpendalStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }
}

fn map_err(action: &str, path: &str, err: opendal::Error) -> VaultError {
    match err.kind() {
        ErrorKind::NotFound => VaultError::NotFound(format!("object {path}")),
        ErrorKind::ConditionNotMatch | ErrorKind::AlreadyExists => {
            VaultError::Backend(format!("object already exists: {path}"))
        }
        _ => VaultError::Backend(format!("{action} {path}: {err}")),
    }
}

#[async_trait]
impl ObjectStore for OpendalStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> VaultResult<String> {
        // Backends without conditional writes still get the existence check;
        // a concurrent writer can slip between it and the write.
        if self
            .op
            .exists(path)
            .await
            .map_err(|e| map_err("stat", path, e))?
        {
            return Err(VaultError::Backend(format!("object already exists: {path}")));
        }

        let cap = self.op.info().full_capability();
        let mut write = self.op.write_with(path, bytes);
        if cap.write_with_if_not_exists {
            write = write.if_not_exists(true);
        }
        if cap.write_with_content_type {
            write = write.content_type(content_type);
        }
        write.await.map_err(|e| map_err("write", path, e))?;

        debug!(path = %path, "blob written");
        Ok(path.to_string())
    }

    async fn get(&self, path: &str) -> VaultResult<Vec<u8>> {
        let buf = self
            .op
            .read(path)
            .await
            .map_err(|e| map_err("read", path, e))?;
        Ok(buf.to_vec())
    }

    async fn remove(&self, path: &str) -> VaultResult<()> {
        self.op
            .delete(path)
            .await
            .map_err(|e| map_err("delete", path, e))?;
        debug!(path = %path, "blob removed");
        Ok(())
    }

    async fn sign_url(&self, path: &str, ttl: Duration) -> VaultResult<String> {
        let req = self
            .op
            .presign_read(path, ttl)
            .await
            .map_err(|e| map_err("presign", path, e))?;
        Ok(req.uri().to_string())
    }
}
