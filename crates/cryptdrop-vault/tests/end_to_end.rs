//! Encrypt locally, store, read back and decrypt, with real accounts

mod support;

use std::sync::Arc;

use cryptdrop_auth::{Credential, LocalAccounts};
use cryptdrop_core::config::{AuthConfig, CryptoConfig, ShareConfig};
use cryptdrop_core::VaultError;
use cryptdrop_crypto::{FileCodec, LocalFile, Workflow, WorkflowState};
use cryptdrop_vault::{JsonCatalog, StorageOrchestrator};
use secrecy::{ExposeSecret, SecretString};
use support::FlakyStore;

fn fast_auth() -> AuthConfig {
    AuthConfig {
        argon2_mem_cost_kib: 1024,
        argon2_time_cost: 1,
        argon2_parallelism: 1,
        ..Default::default()
    }
}

#[tokio::test]
async fn encrypt_upload_fetch_decrypt() {
    let auth = fast_auth();
    let accounts = Arc::new(LocalAccounts::in_memory(&auth).unwrap());
    let session = accounts
        .sign_up("alice@example.com", &SecretString::from("hunter22"))
        .unwrap();
    let credential = Credential::bearer(session.access_token.expose_secret());

    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(JsonCatalog::open(&dir.path().join("catalog.json")).unwrap());
    let vault = StorageOrchestrator::new(
        Arc::new(FlakyStore::new()),
        catalog,
        accounts.clone(),
        &ShareConfig::default(),
        &auth,
    );

    let password = SecretString::from("pw");
    let mut workflow = Workflow::from_config(&CryptoConfig::default()).unwrap();
    workflow
        .select(LocalFile::new("notes.txt", "text/plain", b"0123456789".to_vec()))
        .unwrap();
    workflow.encrypt(&password, &password).unwrap();
    assert_eq!(workflow.state(), WorkflowState::Encrypted);
    let sealed = workflow.encrypted_output().unwrap().clone();
    assert_eq!(sealed.name, "notes.txt.encrypted");
    assert_eq!(sealed.len(), 38);

    let receipt = vault.upload(Some(&credential), &sealed).await.unwrap();
    assert_eq!(
        receipt.file_path,
        format!("{}/notes.txt.encrypted", session.user.user_id)
    );

    let (record, bytes) = vault.fetch(&receipt.record_id, &credential).await.unwrap();
    let fetched = LocalFile::new(record.file_name, cryptdrop_crypto::ENCRYPTED_MIME, bytes);
    let codec = FileCodec::from_config(&CryptoConfig::default()).unwrap();

    let opened = codec.decrypt_file(&fetched, &password).unwrap();
    assert_eq!(opened.name, "notes.txt");
    assert_eq!(opened.data, b"0123456789");

    let wrong = codec.decrypt_file(&fetched, &SecretString::from("nope"));
    assert!(matches!(wrong, Err(VaultError::AuthenticationTag)));

    accounts.sign_out(&credential).unwrap();
    let after = vault.list(&credential).await;
    assert!(matches!(after, Err(VaultError::Auth(_))));
}
