use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque owner identity issued by the identity provider.
///
/// Scopes every catalog query and storage path. It is an equality filter,
/// not a cryptographic boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Metadata persisted in the catalog for one stored blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObjectRecord {
    /// Catalog-assigned unique id
    pub id: String,
    pub owner_id: OwnerId,
    /// Display name (the encrypted file name, e.g. `report.pdf.encrypted`)
    pub file_name: String,
    /// Storage path: `<owner_id>/<file_name>`
    pub file_path: String,
    /// Byte length of the encrypted payload
    pub file_size: u64,
    /// Upload time, Unix milliseconds
    pub uploaded_at: u64,
}

/// Lifecycle of a stored object, keyed by storage path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectState {
    Absent,
    /// Blob write or record insert in progress
    Uploading,
    /// Blob and record both exist
    Present,
    /// Blob or record removal in progress
    Deleting,
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectState::Absent => "absent",
            ObjectState::Uploading => "uploading",
            ObjectState::Present => "present",
            ObjectState::Deleting => "deleting",
        };
        f.write_str(s)
    }
}

/// Build the storage path for an owner's file.
pub fn storage_path(owner: &OwnerId, file_name: &str) -> String {
    format!("{owner}/{file_name}")
}

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_path_is_owner_scoped() {
        let owner = OwnerId::new("u1");
        assert_eq!(storage_path(&owner, "a.txt.encrypted"), "u1/a.txt.encrypted");
    }

    #[test]
    fn test_owner_id_serializes_as_plain_string() {
        let record = StoredObjectRecord {
            id: "r1".into(),
            owner_id: OwnerId::new("u1"),
            file_name: "a.encrypted".into(),
            file_path: "u1/a.encrypted".into(),
            file_size: 38,
            uploaded_at: 1,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["owner_id"], "u1");
        let back: StoredObjectRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
