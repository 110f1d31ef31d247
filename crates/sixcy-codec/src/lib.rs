//! sixcy-codec: codec identity, dispatch, and the plugin ABI
//!
//! A codec is a pair of pure byte-transforming functions plus an output-size
//! upper bound, keyed by a frozen 16-byte UUID. The UUID is written verbatim
//! into every block header and declared in the superblock; it is never
//! negotiated and never reused. In-process short aliases exist for dispatch
//! convenience and never reach disk.
//!
//! The process-global [`registry`] is seeded with the five built-in codecs
//! and may be extended with [`plugin`] descriptors before any archive I/O.
//! It is treated as read-only after initialization.

#![warn(missing_docs)]

pub mod builtin;
pub mod id;
pub mod plugin;
pub mod registry;

pub use id::{uuid_to_string, CodecId, UUID_BROTLI, UUID_LZ4, UUID_LZMA, UUID_NONE, UUID_ZSTD};
pub use plugin::{CodecPluginDesc, PluginCodec, PLUGIN_ABI_VERSION};
pub use registry::{is_available, lookup, register_plugin};

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The UUID does not resolve to any registered codec
    #[error("unknown codec UUID {uuid}")]
    UnknownCodec {
        /// Hyphenated UUID for diagnostics
        uuid: String,
    },

    /// Codec-internal compression failure
    #[error("compression failed: {0}")]
    Compress(String),

    /// Codec-internal decompression failure
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// Output buffer too small; retry with a `compress_bound`-sized buffer
    #[error("output buffer overflow")]
    Overflow,

    /// Plugin registration collided with an existing UUID
    #[error("codec UUID {uuid} is already registered")]
    DuplicateCodec {
        /// Hyphenated UUID for diagnostics
        uuid: String,
    },

    /// Plugin ABI version is newer than this host supports
    #[error("plugin ABI version {found} is newer than supported version {supported}")]
    AbiVersion {
        /// Version declared by the plugin
        found: u32,
        /// Highest version this host accepts
        supported: u32,
    },

    /// Plugin descriptor is missing one of the three required functions
    #[error("plugin descriptor is missing required function pointers")]
    IncompletePlugin,
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// A byte-transforming codec, identified by a frozen UUID.
///
/// Implementations hold no mutable state: both directions must be safe to
/// invoke concurrently on disjoint buffer pairs.
pub trait Codec: Send + Sync + std::fmt::Debug {
    /// The frozen 16-byte identity written into block headers
    fn uuid(&self) -> [u8; 16];

    /// Compress `data` at the codec-defined `level`
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>>;

    /// Decompress `data`; `out_capacity` is the exact expected output size
    fn decompress(&self, data: &[u8], out_capacity: usize) -> Result<Vec<u8>>;

    /// Guaranteed upper bound on compressed output size for `in_len` input bytes
    fn compress_bound(&self, in_len: usize) -> usize;
}
