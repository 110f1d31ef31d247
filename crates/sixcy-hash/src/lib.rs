//! sixcy-hash: BLAKE3 content hashing
//!
//! Every payload in a `.6cy` archive is identified by the BLAKE3 hash of its
//! uncompressed, unencrypted plaintext. That hash doubles as the
//! content-addressed-storage key for chunk deduplication and as the leaf
//! value of the archive root hash.

#![warn(missing_docs)]

/// Hash output (32 bytes)
pub type Hash = [u8; 32];

/// Hash a single buffer
pub fn hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Incremental hasher for data that arrives in pieces
pub struct Hasher {
    inner: blake3::Hasher,
}

impl Hasher {
    /// Create a new hasher
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    /// Update with data
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the hash
    pub fn finalize(&self) -> Hash {
        *self.inner.finalize().as_bytes()
    }

    /// Reset the hasher for reuse
    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: incremental hashing matches direct hashing
        #[test]
        fn incremental_matches_direct(
            parts in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..256), 1..10)
        ) {
            let combined: Vec<u8> = parts.iter().flatten().copied().collect();
            let direct = hash(&combined);

            let mut hasher = Hasher::new();
            for part in &parts {
                hasher.update(part);
            }

            prop_assert_eq!(direct, hasher.finalize());
        }

        /// Property: hash output is always 32 bytes
        #[test]
        fn hash_output_is_32_bytes(data in prop::collection::vec(any::<u8>(), 0..4096)) {
            prop_assert_eq!(hash(&data).len(), 32);
        }
    }
}
