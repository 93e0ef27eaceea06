//! cryptdrop-storage: OpenDAL-backed blob storage for encrypted files

pub mod health;
pub mod operator;
pub mod store;

pub use health::check_health;
pub use operator::{ensure_signed_links, open_bucket, open_from_config, BucketSettings};
pub use store::{ObjectStore, OpendalStore};
