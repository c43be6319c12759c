#![allow(dead_code)]

use std::path::Path;
use std::sync::Once;

use framevault_crypto::{expand_master_key, MasterKey, VaultKeys, MASTER_KEY_LENGTH};
use framevault_vault::{VaultConfig, VaultManager};
use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A fixed key bundle that skips the slow passphrase stages.
pub fn test_keys() -> VaultKeys {
    expand_master_key(&MasterKey::from_bytes([0x5a; MASTER_KEY_LENGTH]))
}

pub fn vault_with(config: VaultConfig) -> VaultManager {
    init_tracing();
    VaultManager::with_keys(test_keys(), config).unwrap()
}

pub fn vault() -> VaultManager {
    vault_with(VaultConfig::default())
}

/// Non-blank lines of an archive file.
pub fn frame_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Flip one character in the middle of a line to another base64 character.
pub fn corrupt(line: &str) -> String {
    let mut bytes = line.as_bytes().to_vec();
    let middle = bytes.len() / 2;
    bytes[middle] = if bytes[middle] == b'A' { b'B' } else { b'A' };
    String::from_utf8(bytes).unwrap()
}
