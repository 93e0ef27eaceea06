pub mod config;
pub mod error;
pub mod types;

pub use error::{ErrorBody, VaultError, VaultResult};
pub use types::{OwnerId, StoredObjectRecord};
