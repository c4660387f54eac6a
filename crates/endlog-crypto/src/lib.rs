//! Key derivation and the offset-addressed AES-256-CTR keystream.
//!
//! This crate provides PBKDF2 key derivation, CSPRNG salt generation, and
//! an AES-256-CTR codec whose keystream is addressed purely by absolute
//! file offset. Because the keystream is a pure function of `(key,
//! offset)`, two callers encrypting disjoint byte ranges never interfere
//! with each other, even without any coordination between them.

#![deny(unsafe_code)]

use aes::Aes256;
use cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use ctr::Ctr128BE;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;
use zeroize::Zeroizing;

/// Length in bytes of the per-volume salt.
pub const SALT_LEN: usize = 16;
/// Length in bytes of the derived AES-256 key.
pub const KEY_LEN: usize = 32;

const PBKDF2_ROUNDS: u32 = 10_000;

type Aes256Ctr = Ctr128BE<Aes256>;

/// Errors raised by key derivation or salt generation.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The platform CSPRNG refused to produce randomness.
    #[error("CSPRNG refused to produce a salt")]
    Rng,
}

impl CryptoError {
    /// Stable integer matching the core error taxonomy (`CryptoInit = -17`).
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            CryptoError::Rng => -17,
        }
    }
}

/// An AES-256 key, derived from a password and salt. Zeroized on drop.
pub struct Key(Zeroizing<[u8; KEY_LEN]>);

impl Key {
    /// Derive a key from `password` and a 16-byte `salt` via
    /// PBKDF2-HMAC-SHA256 with exactly 10 000 iterations.
    #[must_use]
    pub fn derive(password: &str, salt: &[u8; SALT_LEN]) -> Self {
        let mut out = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, out.as_mut());
        Key(out)
    }

    fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Draw a fresh 16-byte salt from the platform CSPRNG.
pub fn random_salt() -> Result<[u8; SALT_LEN], CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.try_fill_bytes(&mut salt).map_err(|err| {
        warn!(error = %err, "CSPRNG refused to produce a salt");
        CryptoError::Rng
    })?;
    Ok(salt)
}

/// XOR `data` in place with the AES-256-CTR keystream for the byte range
/// starting at absolute file offset `offset`.
///
/// The IV is 16 zero bytes with the counter advanced to `offset / 16`,
/// skipping `offset % 16` bytes of keystream before the first output byte.
/// This makes the keystream addressable purely by absolute file offset, so
/// any byte range can be encrypted or decrypted independently of every
/// other range.
pub fn process(key: &Key, offset: u64, data: &mut [u8]) {
    let iv = [0u8; 16];
    let mut cipher = Aes256Ctr::new(key.bytes().into(), &iv.into());
    cipher.seek(offset);
    cipher.apply_keystream(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic_per_salt() {
        let salt = [7u8; SALT_LEN];
        let a = Key::derive("hunter2", &salt);
        let b = Key::derive("hunter2", &salt);
        assert_eq!(a.bytes(), b.bytes());
    }

    #[test]
    fn derive_differs_across_salts() {
        let a = Key::derive("hunter2", &[1u8; SALT_LEN]);
        let b = Key::derive("hunter2", &[2u8; SALT_LEN]);
        assert_ne!(a.bytes(), b.bytes());
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let key = Key::derive("hunter2", &[9u8; SALT_LEN]);
        let mut data = b"hello log world!".to_vec();
        let original = data.clone();
        process(&key, 128, &mut data);
        assert_ne!(data, original);
        process(&key, 128, &mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn disjoint_offsets_compose_like_one_contiguous_stream() {
        let key = Key::derive("hunter2", &[3u8; SALT_LEN]);
        let mut whole = vec![0xABu8; 64];
        let mut piecewise = whole.clone();

        process(&key, 0, &mut whole);

        let (first, second) = piecewise.split_at_mut(20);
        process(&key, 0, first);
        process(&key, 20, second);

        assert_eq!(whole, piecewise);
    }

    #[test]
    fn mid_block_offset_skips_correctly() {
        let key = Key::derive("hunter2", &[5u8; SALT_LEN]);
        let mut whole = vec![0x11u8; 40];
        process(&key, 0, &mut whole);

        let mut tail = vec![0x11u8; 40 - 5];
        process(&key, 5, &mut tail);

        assert_eq!(&whole[5..], &tail[..]);
    }

    #[test]
    fn random_salt_is_not_all_zero() {
        let salt = random_salt().expect("csprng available in test environment");
        assert_ne!(salt, [0u8; SALT_LEN]);
    }
}
