//! Key derivation cascade.
//!
//! One passphrase becomes an immutable [`VaultKeys`] bundle in four stages:
//!
//! 1. scrypt (N=2^14, r=8, p=1) stretches the passphrase into 160 bytes.
//! 2. PBKDF2-HMAC-SHA3-512 with 420042 rounds turns that into the 64-byte
//!    master vault key.
//! 3. A cheap PBKDF2 pass lengthens the master key into a 2048-byte pool.
//! 4. Each purpose-bound key runs one more cheap PBKDF2 pass over its own
//!    fixed 60-byte window of the pool, salted with a per-purpose literal.
//!
//! Every constant in this file is part of the vault format. Changing any of
//! them makes existing archives unreadable and requires a format version bump.
//! New keys may only claim pool bytes that no existing window touches.

use sha3::Sha3_512;
use std::time::Instant;
use tracing::debug;
use zeroize::Zeroizing;

use crate::keys::{
    FingerprintKey, FrameAuthKey, MasterKey, Salt, StreamSegmentKey, TokenSegmentKey, VaultKeys,
    KEY_LENGTH, MASTER_KEY_LENGTH, TOKEN_KEY_LENGTH,
};
use framevault_common::{Error, Result};

/// scrypt CPU/memory cost as log2(N). 2^14 with r=8 needs a 16 MiB buffer.
pub const SCRYPT_LOG_N: u8 = 14;
/// scrypt block size.
pub const SCRYPT_R: u32 = 8;
/// scrypt parallelization.
pub const SCRYPT_P: u32 = 1;
/// Output length of the memory-hard stage.
pub const MEMORY_STAGE_LENGTH: usize = 160;

/// Salt of the CPU-hardening stage.
pub const CPU_STAGE_SALT: &[u8] = b"r3dv1t_cpustep";
/// Rounds of the CPU-hardening stage.
pub const CPU_STAGE_ROUNDS: u32 = 420_042;

/// Salt of the lengthening stage.
pub const LENGTHEN_SALT: &[u8] = b"__vk__long__";
/// Size of the long key material pool.
pub const LONG_KEY_LENGTH: usize = 2048;

/// Rounds used by the lengthening and per-purpose stages.
pub const EXPANSION_ROUNDS: u32 = 42;

/// Size of each per-purpose window in the pool.
pub const WINDOW_LENGTH: usize = 60;

/// A fixed slice of the long key material bound to one key purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyWindow {
    /// Offset of the window in the pool.
    pub start: usize,
    /// Domain separation salt.
    pub domain_salt: &'static [u8],
}

impl KeyWindow {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + WINDOW_LENGTH
    }
}

pub const OBJECT_FINGERPRINT_WINDOW: KeyWindow = KeyWindow {
    start: 100,
    domain_salt: b"osfp",
};

pub const FRAME_AUTHENTICATION_WINDOW: KeyWindow = KeyWindow {
    start: 200,
    domain_salt: b"fl_hmac",
};

pub const STREAM_SEGMENT_WINDOW: KeyWindow = KeyWindow {
    start: 300,
    domain_salt: b"sgk_cha20",
};

pub const TOKEN_SEGMENT_WINDOW: KeyWindow = KeyWindow {
    start: 400,
    domain_salt: b"sgk_fernet",
};

/// Every window claimed so far, in assignment order.
pub const KEY_WINDOWS: [KeyWindow; 4] = [
    OBJECT_FINGERPRINT_WINDOW,
    FRAME_AUTHENTICATION_WINDOW,
    STREAM_SEGMENT_WINDOW,
    TOKEN_SEGMENT_WINDOW,
];

/// Derive the master vault key from a passphrase (stages 1 and 2).
///
/// # Errors
/// - Returns error if the passphrase is empty
/// - Returns error if scrypt rejects its parameters or cannot allocate
///
/// # Security
/// - Intermediate stage output is zeroized before returning
pub fn derive_master_key(passphrase: &[u8], salt: &Salt) -> Result<MasterKey> {
    if passphrase.is_empty() {
        return Err(Error::InvalidInput("Passphrase cannot be empty".to_string()));
    }
    if salt.is_empty() {
        return Err(Error::InvalidInput("KDF salt cannot be empty".to_string()));
    }

    // Params::new validates the PHC output length even though scrypt() below
    // writes into a buffer of its own size.
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LENGTH)
        .map_err(|e| Error::KeyDerivation(format!("Invalid scrypt parameters: {}", e)))?;

    let mut stretched = Zeroizing::new([0u8; MEMORY_STAGE_LENGTH]);
    scrypt::scrypt(passphrase, salt.as_bytes(), &params, stretched.as_mut_slice())
        .map_err(|e| Error::KeyDerivation(format!("scrypt failed: {}", e)))?;

    let mut master = [0u8; MASTER_KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha3_512>(
        stretched.as_slice(),
        CPU_STAGE_SALT,
        CPU_STAGE_ROUNDS,
        &mut master,
    );

    let key = MasterKey::from_bytes(master);
    zeroize::Zeroize::zeroize(&mut master);
    Ok(key)
}

/// Expand a master vault key into the purpose-bound bundle (stages 3 and 4).
///
/// This part of the cascade is cheap and infallible.
pub fn expand_master_key(master: &MasterKey) -> VaultKeys {
    let mut pool = Zeroizing::new(vec![0u8; LONG_KEY_LENGTH]);
    pbkdf2::pbkdf2_hmac::<Sha3_512>(
        master.as_bytes(),
        LENGTHEN_SALT,
        EXPANSION_ROUNDS,
        pool.as_mut_slice(),
    );

    let fingerprint = derive_window::<KEY_LENGTH>(&pool, OBJECT_FINGERPRINT_WINDOW);
    let frame = derive_window::<KEY_LENGTH>(&pool, FRAME_AUTHENTICATION_WINDOW);
    let stream = derive_window::<KEY_LENGTH>(&pool, STREAM_SEGMENT_WINDOW);
    let token = derive_window::<TOKEN_KEY_LENGTH>(&pool, TOKEN_SEGMENT_WINDOW);

    VaultKeys::from_parts(
        FingerprintKey::from_bytes(*fingerprint),
        FrameAuthKey::from_bytes(*frame),
        StreamSegmentKey::from_bytes(*stream),
        TokenSegmentKey::from_bytes(*token),
    )
}

fn derive_window<const N: usize>(pool: &[u8], window: KeyWindow) -> Zeroizing<[u8; N]> {
    let mut out = Zeroizing::new([0u8; N]);
    pbkdf2::pbkdf2_hmac::<Sha3_512>(
        &pool[window.range()],
        window.domain_salt,
        EXPANSION_ROUNDS,
        out.as_mut_slice(),
    );
    out
}

/// Derive the full key bundle from a passphrase.
///
/// Deliberately slow (tens to hundreds of milliseconds in release builds) and
/// never retried: any failure is fatal to the caller's open operation.
///
/// # Postconditions
/// - Identical passphrase and salt always yield byte-identical keys
pub fn derive_vault_keys(passphrase: &[u8], salt: &Salt) -> Result<VaultKeys> {
    let started = Instant::now();
    let master = derive_master_key(passphrase, salt)?;
    let keys = expand_master_key(&master);
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Vault keys derived");
    Ok(keys)
}
