//! Encrypt/decrypt session: the selected file, the last result, and the
//! state they put the session in.
//!
//! ```text
//! Idle ──select──▶ FileSelected ──encrypt──▶ Encrypted
//!                        │   ▲                   │
//!                        │   └──────select───────┤
//!                        └──decrypt──▶ Decrypted ◀┘ (decrypt needs an .encrypted selection)
//! ```
//!
//! Failed operations leave the state and any previous result untouched.

use cryptdrop_core::config::CryptoConfig;
use cryptdrop_core::{VaultError, VaultResult};
use secrecy::{ExposeSecret, SecretString};

use crate::file::{FileCodec, LocalFile};

/// Progress callback type (done, total, message). `total` is always 100.
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    FileSelected,
    Encrypted,
    Decrypted,
}

pub struct Workflow {
    codec: FileCodec,
    max_file_bytes: u64,
    state: WorkflowState,
    selected: Option<LocalFile>,
    output: Option<LocalFile>,
    progress: Option<ProgressFn>,
}

impl Workflow {
    pub fn new(codec: FileCodec, max_file_bytes: u64) -> Self {
        Self {
            codec,
            max_file_bytes,
            state: WorkflowState::Idle,
            selected: None,
            output: None,
            progress: None,
        }
    }

    pub fn from_config(config: &CryptoConfig) -> VaultResult<Self> {
        Ok(Self::new(FileCodec::from_config(config)?, config.max_file_bytes))
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn selected(&self) -> Option<&LocalFile> {
        self.selected.as_ref()
    }

    /// Output of the last successful encrypt or decrypt.
    pub fn output(&self) -> Option<&LocalFile> {
        self.output.as_ref()
    }

    /// The encrypted output, if the last operation was an encryption.
    pub fn encrypted_output(&self) -> Option<&LocalFile> {
        match self.state {
            WorkflowState::Encrypted => self.output.as_ref(),
            _ => None,
        }
    }

    /// Select a file, discarding any previous result.
    pub fn select(&mut self, file: LocalFile) -> VaultResult<()> {
        if file.data.len() as u64 > self.max_file_bytes {
            return Err(VaultError::Validation(format!(
                "file too large: {} bytes (maximum {})",
                file.data.len(),
                self.max_file_bytes
            )));
        }
        self.selected = Some(file);
        self.output = None;
        self.state = WorkflowState::FileSelected;
        Ok(())
    }

    /// Encrypt the selected file. Both password fields must be non-empty
    /// and equal.
    pub fn encrypt(
        &mut self,
        password: &SecretString,
        confirm: &SecretString,
    ) -> VaultResult<&LocalFile> {
        let file = self.selected.as_ref().ok_or_else(|| {
            VaultError::Validation("select a file and fill in both password fields".into())
        })?;
        if password.expose_secret().is_empty() || confirm.expose_secret().is_empty() {
            return Err(VaultError::Validation(
                "select a file and fill in both password fields".into(),
            ));
        }
        if password.expose_secret() != confirm.expose_secret() {
            return Err(VaultError::Validation("passwords do not match".into()));
        }

        self.report(0, "encrypting");
        self.report(30, "encrypting");
        let encrypted = self.codec.encrypt_file(file, password)?;
        self.report(80, "encrypting");

        self.state = WorkflowState::Encrypted;
        self.report(100, "encrypted");
        Ok(self.output.insert(encrypted))
    }

    /// Decrypt the selected `.encrypted` file.
    pub fn decrypt(&mut self, password: &SecretString) -> VaultResult<&LocalFile> {
        let file = self.selected.as_ref().ok_or_else(|| {
            VaultError::Validation("select an encrypted file and enter the password".into())
        })?;
        if password.expose_secret().is_empty() {
            return Err(VaultError::Validation(
                "select an encrypted file and enter the password".into(),
            ));
        }

        self.report(0, "decrypting");
        self.report(30, "decrypting");
        let decrypted = self.codec.decrypt_file(file, password)?;
        self.report(80, "decrypting");

        self.state = WorkflowState::Decrypted;
        self.report(100, "decrypted");
        Ok(self.output.insert(decrypted))
    }

    /// Drop the selection and result.
    pub fn clear(&mut self) {
        self.selected = None;
        self.output = None;
        self.state = WorkflowState::Idle;
    }

    fn report(&self, done: u64, msg: &str) {
        if let Some(cb) = &self.progress {
            cb(done, 100, msg);
        }
    }
}
