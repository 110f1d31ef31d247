//! sixcy-format: the `.6cy` self-describing archive container
//!
//! An archive is a flat byte sequence: a 256-byte superblock at offset 0, a
//! run of self-describing DATA/SOLID blocks, an INDEX block holding the
//! serialized file catalog, and a length-prefixed recovery map tail.
//!
//! Format guarantees, frozen in version 3:
//! - every numeric field is little-endian, never negotiated;
//! - every block is parseable in isolation (magic, version, codec UUID,
//!   sizes, BLAKE3 content hash in an 84-byte header);
//! - every block is integrity-checked twice: CRC32 over the header, BLAKE3
//!   over the decoded plaintext;
//! - codec identity is a frozen 16-byte UUID written verbatim; a decoder
//!   either has every codec the superblock declares or refuses to read any
//!   block;
//! - the full block list is reconstructible by scanning forward from offset
//!   256 without the INDEX block.
//!
//! ```no_run
//! use sixcy_format::{Archive, WriterConfig};
//!
//! let mut ar = Archive::create("out.6cy", WriterConfig::default())?;
//! ar.add_file("readme.txt", b"Hello, world!")?;
//! ar.finalize()?;
//!
//! let mut ar = Archive::open("out.6cy")?;
//! assert_eq!(ar.read_file("readme.txt")?, b"Hello, world!");
//! # Ok::<(), sixcy_format::Error>(())
//! ```

#![warn(missing_docs)]

pub mod archive;
pub mod block;
pub mod index;
pub mod reader;
pub mod recovery;
pub mod superblock;
pub mod writer;

pub use archive::{Archive, FileInfo};
pub use block::{
    decode_block, encode_block, BlockHeader, BlockType, BLOCK_HEADER_SIZE, BLOCK_MAGIC,
    FILE_ID_SHARED, FLAG_ENCRYPTED,
};
pub use index::{BlockRef, FileIndex, FileRecord};
pub use reader::{ArchiveReader, ReaderOptions};
pub use recovery::{
    extract_recoverable, scan, scan_file, BlockHealth, RecoveryCheckpoint, RecoveryMap,
    RecoveryQuality, RecoveryReport, ScanOptions, ScannedBlock,
};
pub use superblock::{Superblock, FORMAT_VERSION, SUPERBLOCK_SIZE};
pub use writer::{ArchiveWriter, WriterConfig, DEFAULT_CHUNK_SIZE, DEFAULT_COMPRESSION_LEVEL};

/// Error type for archive operations.
///
/// Every local failure is fatal for the operation in progress and
/// propagates unchanged; the engine never substitutes data. The recovery
/// scanner is the one component that tolerates per-block errors, and it
/// encodes them as [`BlockHealth`] verdicts instead of returning them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying device error, short read or write
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `format_version` does not match exactly
    #[error("unsupported format version {0} (this build reads version {FORMAT_VERSION})")]
    FormatVersion(u32),

    /// Wrong magic bytes in the superblock or a block header
    #[error("invalid magic bytes")]
    Magic,

    /// Header CRC32 mismatch
    #[error("header CRC32 mismatch: computed {computed:#010x}, stored {stored:#010x}")]
    HeaderCrc {
        /// CRC computed over the header bytes
        computed: u32,
        /// CRC stored on disk
        stored: u32,
    },

    /// BLAKE3 mismatch (or wrong length) after decoding a block payload
    #[error("content hash mismatch after decode")]
    ContentHash,

    /// Codec UUID absent from the registry
    #[error("required codec not available (UUID {uuid})")]
    UnknownCodec {
        /// Hyphenated UUID for diagnostics
        uuid: String,
    },

    /// Compressor or decompressor internal error
    #[error("codec failure: {0}")]
    Codec(sixcy_codec::Error),

    /// GCM tag verification failed
    #[error("authentication failed: wrong password or corrupted block")]
    AuthFailed,

    /// Block is encrypted but no key was supplied
    #[error("block is encrypted but no decryption key was provided")]
    MissingKey,

    /// Encryption failed while sealing a block
    #[error("encryption failed")]
    Encrypt,

    /// Argon2id key derivation error
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// Invalid JSON or missing fields in the INDEX block
    #[error("index parse error: {0}")]
    IndexParse(String),

    /// A field value violates a format invariant
    #[error("field out of range: {0}")]
    OutOfRange(String),

    /// Fewer bytes on disk than a size field declares
    #[error("truncated input: {declared} bytes declared, {available} available")]
    Truncated {
        /// Bytes the header declared
        declared: u64,
        /// Bytes actually present
        available: u64,
    },

    /// Named file is not in the archive index
    #[error("file not found: {0}")]
    NotFound(String),

    /// Operation not valid for the archive's current mode or state
    #[error("invalid archive state: {0}")]
    State(&'static str),
}

impl From<sixcy_codec::Error> for Error {
    fn from(e: sixcy_codec::Error) -> Self {
        match e {
            sixcy_codec::Error::UnknownCodec { uuid } => Error::UnknownCodec { uuid },
            other => Error::Codec(other),
        }
    }
}

impl From<sixcy_crypto::Error> for Error {
    fn from(e: sixcy_crypto::Error) -> Self {
        match e {
            sixcy_crypto::Error::Kdf(msg) => Error::Kdf(msg),
            sixcy_crypto::Error::AuthFailed | sixcy_crypto::Error::TooShort => Error::AuthFailed,
            sixcy_crypto::Error::Encrypt => Error::Encrypt,
        }
    }
}

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, Error>;
