//! cryptdrop-vault: the encrypted-object lifecycle
//!
//! ```text
//! upload:  verify credential → duplicate-name check → put blob → insert record
//!                                                       └─ insert fails → remove blob (once)
//! delete:  verify credential → resolve record (owner-scoped) → remove blob → delete record
//! links:   resolve record (owner-scoped, or by id alone for public shares) → sign URL
//! ```
//!
//! Cleanup steps that fail are queued in a `ReconcileQueue` instead of being
//! retried.

pub mod catalog;
pub mod orchestrator;
pub mod reconcile;

pub use catalog::{JsonCatalog, MetadataCatalog, NewRecord};
pub use orchestrator::{DeleteReceipt, DownloadLink, StorageOrchestrator, UploadReceipt};
pub use reconcile::{ReconcileQueue, ReconcileReport, ReconcileTask};
