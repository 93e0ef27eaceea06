//! Queue of cleanup work left behind by partial failures.
//!
//! The orchestrator never retries. When a compensating step fails it records
//! what is left over here, and `StorageOrchestrator::reconcile` makes a single
//! attempt at each queued task when asked to. A task leaves the queue only
//! after it resolves.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use cryptdrop_core::{OwnerId, VaultResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileTask {
    /// A blob with no catalog record: its insert failed and removing it did too
    OrphanBlob {
        path: String,
        owner_id: OwnerId,
        reason: String,
        queued_at: u64,
    },
    /// A record whose blob is already gone: the record delete failed
    OrphanRecord {
        record_id: String,
        path: String,
        reason: String,
        queued_at: u64,
    },
}

impl ReconcileTask {
    pub fn path(&self) -> &str {
        match self {
            ReconcileTask::OrphanBlob { path, .. } | ReconcileTask::OrphanRecord { path, .. } => {
                path
            }
        }
    }
}

/// Outcome of one `reconcile` pass
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub resolved: usize,
    pub remaining: usize,
}

pub struct ReconcileQueue {
    path: Option<PathBuf>,
    tasks: Mutex<Vec<ReconcileTask>>,
}

impl ReconcileQueue {
    pub fn open(path: &Path) -> VaultResult<Self> {
        let tasks = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading reconcile queue: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing reconcile queue: {}", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            tasks: Mutex::new(tasks),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, task: ReconcileTask) {
        let Ok(mut tasks) = self.tasks.lock() else {
            warn!(path = %task.path(), "reconcile queue lock poisoned, task dropped");
            return;
        };
        tasks.push(task);
        self.persist(&tasks);
    }

    /// Snapshot of queued tasks, oldest first.
    pub fn list(&self) -> Vec<ReconcileTask> {
        self.tasks.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove one queued task once it has been dealt with.
    pub fn remove(&self, task: &ReconcileTask) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        if let Some(idx) = tasks.iter().position(|t| t == task) {
            tasks.remove(idx);
            self.persist(&tasks);
        }
    }

    // A queue that cannot be written still holds its tasks in memory
    fn persist(&self, tasks: &[ReconcileTask]) {
        if let Err(e) = self.flush(tasks) {
            warn!(error = %format!("{e:#}"), "failed to persist reconcile queue");
        }
    }

    fn flush(&self, tasks: &[ReconcileTask]) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating reconcile dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(tasks).context("serializing reconcile queue")?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("writing reconcile temp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("renaming reconcile queue: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orphan_blob(path: &str) -> ReconcileTask {
        ReconcileTask::OrphanBlob {
            path: path.into(),
            owner_id: OwnerId::new("u1"),
            reason: "insert failed".into(),
            queued_at: 1,
        }
    }

    #[test]
    fn test_push_list_remove() {
        let queue = ReconcileQueue::in_memory();
        assert!(queue.is_empty());

        queue.push(orphan_blob("u1/a"));
        queue.push(ReconcileTask::OrphanRecord {
            record_id: "r1".into(),
            path: "u1/b".into(),
            reason: "delete failed".into(),
            queued_at: 2,
        });
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.list()[0].path(), "u1/a");

        for task in queue.list() {
            queue.remove(&task);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconcile.json");

        ReconcileQueue::open(&path).unwrap().push(orphan_blob("u1/a"));

        let reopened = ReconcileQueue::open(&path).unwrap();
        assert_eq!(reopened.list(), vec![orphan_blob("u1/a")]);
    }

    #[test]
    fn test_remove_persists_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconcile.json");

        let queue = ReconcileQueue::open(&path).unwrap();
        queue.push(orphan_blob("u1/a"));
        queue.push(orphan_blob("u1/b"));
        queue.remove(&orphan_blob("u1/a"));
        queue.remove(&orphan_blob("u1/missing"));

        let reopened = ReconcileQueue::open(&path).unwrap();
        assert_eq!(reopened.list(), vec![orphan_blob("u1/b")]);
    }

    #[test]
    fn test_serialized_kind_tag() {
        let json = serde_json::to_value(orphan_blob("u1/a")).unwrap();
        assert_eq!(json["kind"], "orphan_blob");
        assert_eq!(json["owner_id"], "u1");
    }
}
