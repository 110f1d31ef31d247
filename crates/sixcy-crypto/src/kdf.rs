//! Key derivation using Argon2id
//!
//! Parameters are fixed for the format: m = 64 MiB, t = 3, p = 1,
//! 32-byte output. The salt is the archive UUID, so reusing a password
//! across archives still produces distinct keys.

use argon2::{Algorithm, Argon2, Params, Version};

use crate::encrypt::Key;
use crate::{Error, Result};

/// Argon2id memory cost in KiB (64 MiB)
const M_COST_KIB: u32 = 64 * 1024;
/// Argon2id iteration count
const T_COST: u32 = 3;
/// Argon2id lane count
const P_COST: u32 = 1;

/// Derive a 256-bit encryption key from a password and a salt.
///
/// `salt` is expected to be the 16-byte archive UUID.
pub fn derive_key(password: &str, salt: &[u8]) -> Result<Key> {
    let params = Params::new(M_COST_KIB, T_COST, P_COST, Some(32))
        .map_err(|e| Error::Kdf(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| Error::Kdf(e.to_string()))?;
    Ok(Key::from_bytes(key))
}
