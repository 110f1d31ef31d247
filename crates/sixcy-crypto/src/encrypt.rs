//! AES-256-GCM authenticated encryption
//!
//! On-disk layout of a sealed payload: `nonce (12 B) || ciphertext || tag (16 B)`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::Zeroize;

use crate::{Error, Result};

/// Byte length of the AES-GCM nonce prepended to every sealed payload
pub const NONCE_LEN: usize = 12;

/// Byte length of the GCM authentication tag appended to the ciphertext
pub const TAG_LEN: usize = 16;

/// Encryption key (32 bytes), wiped on drop
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Key([u8; 32]);

impl Key {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random key
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Seal `plaintext` with AES-256-GCM under a fresh random nonce.
///
/// Returns `nonce (12 B) || ciphertext || tag (16 B)`.
pub fn seal(key: &Key, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.0.as_ref().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher.encrypt(&nonce, plaintext).map_err(|_| Error::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a payload produced by [`seal`].
///
/// Input must start with the 12-byte nonce followed by ciphertext and tag.
/// Tag verification failure returns [`Error::AuthFailed`] and no plaintext.
pub fn open(key: &Key, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(Error::TooShort);
    }

    let cipher = Aes256Gcm::new(key.0.as_ref().into());
    let nonce = Nonce::from_slice(&data[..NONCE_LEN]);

    cipher
        .decrypt(nonce, &data[NONCE_LEN..])
        .map_err(|_| Error::AuthFailed)
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: seal then open recovers the original plaintext
        #[test]
        fn roundtrip_any_data(plaintext in prop::collection::vec(any::<u8>(), 0..4096)) {
            let key = Key::generate();

            let sealed = seal(&key, &plaintext).unwrap();
            let opened = open(&key, &sealed).unwrap();

            prop_assert_eq!(plaintext, opened);
        }

        /// Property: overhead is exactly nonce + tag
        #[test]
        fn sealed_has_fixed_overhead(plaintext in prop::collection::vec(any::<u8>(), 0..1024)) {
            let key = Key::generate();

            let sealed = seal(&key, &plaintext).unwrap();

            prop_assert_eq!(sealed.len(), plaintext.len() + NONCE_LEN + TAG_LEN);
        }

        /// Property: the wrong key never yields plaintext
        #[test]
        fn wrong_key_fails(plaintext in prop::collection::vec(any::<u8>(), 1..256)) {
            let key1 = Key::generate();
            let key2 = Key::generate();

            let sealed = seal(&key1, &plaintext).unwrap();
            let result = open(&key2, &sealed);

            prop_assert!(matches!(result, Err(Error::AuthFailed)));
        }

        /// Property: flipping any ciphertext bit fails authentication
        #[test]
        fn bit_flip_fails(
            plaintext in prop::collection::vec(any::<u8>(), 1..256),
            flip in any::<u16>(),
        ) {
            let key = Key::generate();

            let mut sealed = seal(&key, &plaintext).unwrap();
            let pos = (flip as usize / 8) % sealed.len();
            sealed[pos] ^= 1 << (flip % 8);

            prop_assert!(open(&key, &sealed).is_err());
        }
    }
}
