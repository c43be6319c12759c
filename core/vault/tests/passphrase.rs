//! End-to-end tests that run the full key derivation.

mod common;

use framevault_vault::{VaultConfig, VaultManager};
use tempfile::TempDir;

#[test]
fn test_open_save_reopen_with_passphrase() {
    common::init_tracing();
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("vault.fv");

    let mut vault = VaultManager::open(b"change_me", None, VaultConfig::default()).unwrap();
    let id = vault.put(b"derived keys", "k.txt").unwrap();
    vault.save(&archive).unwrap();
    drop(vault);

    let reopened = VaultManager::open(b"change_me", Some(&archive), VaultConfig::default()).unwrap();
    assert_eq!(reopened.resolve("k.txt").unwrap(), id);
    assert_eq!(reopened.read("k.txt").unwrap(), b"derived keys");

    let mut stranger = VaultManager::open(b"not_me", None, VaultConfig::default()).unwrap();
    let report = stranger.load(&archive).unwrap();
    assert_eq!(report.frames_accepted, 0);
    assert!(stranger.object_ids().is_empty());
}

#[test]
fn test_empty_passphrase_rejected() {
    assert!(VaultManager::open(b"", None, VaultConfig::default()).is_err());
}
