//! Nonce generation.
//!
//! Nonces mix 640 bits from the OS generator with a hashed high-resolution
//! clock sample, then stretch the mix through a low-round PBKDF2 pass so any
//! length from MIN_NONCE_SIZE upward can be produced.

use chrono::Utc;
use rand::RngCore;
use sha3::{Digest, Sha3_384, Sha3_512};
use zeroize::Zeroizing;

use framevault_common::{Error, Result};

/// Shortest nonce the generator will produce.
pub const MIN_NONCE_SIZE: usize = 16;

const KERNEL_ENTROPY_SIZE: usize = 80;
const STRETCH_SALT: &[u8] = b"xcf__dont_care__qwk";
const STRETCH_ROUNDS: u32 = 8;

/// Generate a fresh nonce of `size` bytes.
///
/// # Errors
/// - Returns error if `size` is below MIN_NONCE_SIZE
pub fn make_nonce(size: usize) -> Result<Vec<u8>> {
    if size < MIN_NONCE_SIZE {
        return Err(Error::Crypto(format!(
            "Nonce of {} bytes is below the {} byte minimum",
            size, MIN_NONCE_SIZE
        )));
    }

    let mut kernel = Zeroizing::new([0u8; KERNEL_ENTROPY_SIZE]);
    rand::rng().fill_bytes(kernel.as_mut_slice());

    let now = Utc::now();
    let nanos = now
        .timestamp_nanos_opt()
        .map(i128::from)
        .unwrap_or_else(|| i128::from(now.timestamp_micros()));
    let clock = Sha3_384::digest((nanos * nanos).to_string().as_bytes());

    let mut mixer = Sha3_384::new();
    mixer.update(kernel.as_slice());
    mixer.update(clock);
    let mut combined = Zeroizing::new([0u8; 48]);
    combined.copy_from_slice(&mixer.finalize());

    let mut nonce = vec![0u8; size];
    pbkdf2::pbkdf2_hmac::<Sha3_512>(combined.as_slice(), STRETCH_SALT, STRETCH_ROUNDS, &mut nonce);
    Ok(nonce)
}
