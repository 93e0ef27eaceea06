//! cryptdrop-crypto: client-side file encryption
//!
//! Pipeline: password → SHA-256 key → AES-256-GCM (random 96-bit nonce) → container
//!
//! Container layout (unversioned, the default):
//! ```text
//! [12 bytes: nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! Encrypted files are named `<original>.encrypted`; the suffix is the only
//! marker of encryption state.

pub mod cipher;
pub mod file;
pub mod kdf;
pub mod workflow;

pub use cipher::{decrypt, encrypt, ContainerFormat};
pub use file::{decrypted_name, FileCodec, LocalFile};
pub use kdf::{derive_key, EncryptionKey, KdfParams};
pub use workflow::{ProgressFn, Workflow, WorkflowState};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Suffix marking an encrypted file
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";

/// MIME type declared for encrypted files
pub const ENCRYPTED_MIME: &str = "application/encrypted";

/// MIME type declared for decrypted output
pub const DECRYPTED_MIME: &str = "application/octet-stream";
