//! sixcy-crypto: key derivation and per-block authenticated encryption
//!
//! Keys are derived with Argon2id from a password and the 16-byte archive
//! UUID (used as the salt, so the same password yields a different key on
//! every archive). Blocks are sealed with AES-256-GCM; the 12-byte nonce is
//! drawn from the OS entropy pool per block and prepended to the
//! ciphertext, followed by the 16-byte GCM tag.

#![warn(missing_docs)]

pub mod encrypt;
pub mod kdf;

pub use encrypt::{open, seal, Key, NONCE_LEN, TAG_LEN};
pub use kdf::derive_key;

/// Error type for cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Argon2id key derivation failed
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// AES-GCM encryption failed
    #[error("encryption failed")]
    Encrypt,

    /// GCM tag verification failed: wrong key or corrupted ciphertext
    #[error("authentication failed: wrong key or corrupted ciphertext")]
    AuthFailed,

    /// Encrypted payload shorter than nonce + tag
    #[error("encrypted payload too short")]
    TooShort,
}

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, Error>;
