//! Frozen codec identities
//!
//! Each UUID below is permanent and never reused, even for a deprecated
//! codec. On disk the identity is the raw 16 bytes in RFC 4122
//! little-endian field order; comparison is byte-for-byte, no swapping.

/// No compression, payload stored verbatim
pub const UUID_NONE: [u8; 16] = [0u8; 16];

/// Zstandard, the default codec
/// UUID: b28a9d4f-5e3c-4a1b-8f2e-7c6d9b0e1a2f
pub const UUID_ZSTD: [u8; 16] = [
    0x4f, 0x9d, 0x8a, 0xb2, 0x3c, 0x5e, 0x1b, 0x4a, 0x8f, 0x2e, 0x7c, 0x6d, 0x9b, 0x0e, 0x1a,
    0x2f,
];

/// LZ4, maximum throughput
/// UUID: 3f7b2c8e-1a4d-4e9f-b6c3-5d8a2f7e0b1c
pub const UUID_LZ4: [u8; 16] = [
    0x8e, 0x2c, 0x7b, 0x3f, 0x4d, 0x1a, 0x9f, 0x4e, 0xb6, 0xc3, 0x5d, 0x8a, 0x2f, 0x7e, 0x0b,
    0x1c,
];

/// Brotli, high ratio for text content
/// UUID: 9c1e5f3a-7b2d-4c8e-a5f1-2e6b9d0c3a7f
pub const UUID_BROTLI: [u8; 16] = [
    0x3a, 0x5f, 0x1e, 0x9c, 0x2d, 0x7b, 0x8e, 0x4c, 0xa5, 0xf1, 0x2e, 0x6b, 0x9d, 0x0c, 0x3a,
    0x7f,
];

/// LZMA, highest ratio, slowest
/// UUID: 4a8f2e1c-9b3d-4f7a-c2e8-6d5b1a0f3c9e
pub const UUID_LZMA: [u8; 16] = [
    0x1c, 0x2e, 0x8f, 0x4a, 0x3d, 0x9b, 0x7a, 0x4f, 0xc2, 0xe8, 0x6d, 0x5b, 0x1a, 0x0f, 0x3c,
    0x9e,
];

/// Built-in codec discriminant.
///
/// Carries the frozen UUID plus an in-process short alias. The alias is
/// advisory and never written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// Stored verbatim
    None,
    /// Zstandard
    Zstd,
    /// LZ4
    Lz4,
    /// Brotli
    Brotli,
    /// LZMA
    Lzma,
}

impl CodecId {
    /// The frozen 16-byte UUID written to disk for this codec
    #[inline]
    pub fn uuid(self) -> [u8; 16] {
        match self {
            CodecId::None => UUID_NONE,
            CodecId::Zstd => UUID_ZSTD,
            CodecId::Lz4 => UUID_LZ4,
            CodecId::Brotli => UUID_BROTLI,
            CodecId::Lzma => UUID_LZMA,
        }
    }

    /// In-process short alias (advisory, never written to disk)
    #[inline]
    pub fn short_id(self) -> u32 {
        match self {
            CodecId::None => 0,
            CodecId::Zstd => 1,
            CodecId::Lz4 => 2,
            CodecId::Brotli => 3,
            CodecId::Lzma => 4,
        }
    }

    /// Resolve a raw UUID to a built-in codec, if it is one
    pub fn from_uuid(uuid: &[u8; 16]) -> Option<Self> {
        match uuid {
            u if u == &UUID_NONE => Some(CodecId::None),
            u if u == &UUID_ZSTD => Some(CodecId::Zstd),
            u if u == &UUID_LZ4 => Some(CodecId::Lz4),
            u if u == &UUID_BROTLI => Some(CodecId::Brotli),
            u if u == &UUID_LZMA => Some(CodecId::Lzma),
            _ => None,
        }
    }

    /// Human-readable name, for diagnostics only
    pub fn name(self) -> &'static str {
        match self {
            CodecId::None => "none",
            CodecId::Zstd => "zstd",
            CodecId::Lz4 => "lz4",
            CodecId::Brotli => "brotli",
            CodecId::Lzma => "lzma",
        }
    }

    /// Parse a codec name
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(CodecId::None),
            "zstd" => Some(CodecId::Zstd),
            "lz4" => Some(CodecId::Lz4),
            "brotli" => Some(CodecId::Brotli),
            "lzma" => Some(CodecId::Lzma),
            _ => None,
        }
    }
}

/// Render a raw 16-byte UUID (LE field order) in canonical hyphenated form.
///
/// The first three fields are stored little-endian on disk, so their bytes
/// are reversed for display; the last two fields are big-endian already.
pub fn uuid_to_string(bytes: &[u8; 16]) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[3], bytes[2], bytes[1], bytes[0],
        bytes[5], bytes[4],
        bytes[7], bytes[6],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}
