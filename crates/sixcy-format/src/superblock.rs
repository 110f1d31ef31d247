//! Superblock: the format anchor at offset 0 (256 bytes, fixed)
//!
//! On-disk layout, all numeric fields little-endian:
//!
//! ```text
//! Offset    Size  Field
//!    0        4   magic                ".6cy" (ASCII, not LE)
//!    4        4   format_version       = 3, exact match required
//!    8       16   archive_uuid         unique per archive, also the KDF salt
//!   24        4   flags                bit 0 = any block encrypted
//!   28        8   index_offset         byte offset of the INDEX block header
//!   36        8   index_size           INDEX payload bytes on disk
//!   44        2   required_codec_count N, at most 13
//!   46     N*16   required_codec_uuids raw 16-byte UUIDs, LE field order
//!   46+N*16   4   header_crc32         CRC32 of all preceding bytes
//!   ...           zero padding to exactly 256 bytes
//! ```
//!
//! `required_codec_uuids` is exactly the set of codec UUIDs appearing in
//! DATA and SOLID blocks, minus the all-zero None UUID. A decoder that
//! cannot supply every listed UUID refuses to read any block; there is no
//! negotiation and no partial decode.

use std::io::{Read, Write};

use crc32fast::Hasher as Crc32;
use sixcy_codec::{is_available, uuid_to_string, UUID_NONE};
use uuid::Uuid;

use crate::{Error, Result};

/// Archive magic bytes
pub const MAGIC: &[u8; 4] = b".6cy";

/// The one format version this build reads and writes
pub const FORMAT_VERSION: u32 = 3;

/// Superblock size on disk
pub const SUPERBLOCK_SIZE: usize = 256;

/// Archive-level flag: at least one block is encrypted
pub const SB_FLAG_ENCRYPTED: u32 = 0x0001;

/// Maximum number of required codec UUIDs that fit the fixed 256 bytes
pub const MAX_REQUIRED_CODECS: usize = 13;

/// Fixed byte count before the variable-length codec list
const FIXED_PREFIX: usize = 46;

/// Parsed superblock
#[derive(Debug, Clone)]
pub struct Superblock {
    /// Format version (always [`FORMAT_VERSION`] for a valid archive)
    pub format_version: u32,
    /// Archive identity; doubles as the Argon2id salt
    pub archive_uuid: Uuid,
    /// Flag bits (bit 0 = any block encrypted)
    pub flags: u32,
    /// Byte offset of the INDEX block header
    pub index_offset: u64,
    /// INDEX payload size on disk
    pub index_size: u64,
    /// Raw 16-byte UUIDs of every codec used by DATA/SOLID blocks
    pub required_codec_uuids: Vec<[u8; 16]>,
}

impl Superblock {
    /// Create a superblock for a new archive with a fresh UUID
    pub fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            archive_uuid: Uuid::new_v4(),
            flags: 0,
            index_offset: 0,
            index_size: 0,
            required_codec_uuids: Vec::new(),
        }
    }

    /// Record a codec as required.
    ///
    /// The None UUID is never listed; duplicates are collapsed. Called by
    /// the writer at block write time, so the final list matches the blocks
    /// actually on disk.
    pub fn add_required_codec(&mut self, uuid: [u8; 16]) {
        if uuid == UUID_NONE {
            return;
        }
        if !self.required_codec_uuids.iter().any(|u| u == &uuid) {
            self.required_codec_uuids.push(uuid);
        }
    }

    /// Verify that every required codec resolves in the registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCodec`] naming the first missing UUID. The
    /// caller must not decode any block in that case.
    pub fn check_codecs(&self) -> Result<()> {
        for uuid in &self.required_codec_uuids {
            if !is_available(uuid) {
                return Err(Error::UnknownCodec {
                    uuid: uuid_to_string(uuid),
                });
            }
        }
        Ok(())
    }

    /// Serialize to the fixed 256-byte wire form
    pub fn to_bytes(&self) -> Result<[u8; SUPERBLOCK_SIZE]> {
        if self.required_codec_uuids.len() > MAX_REQUIRED_CODECS
            || FIXED_PREFIX + self.required_codec_uuids.len() * 16 + 4 > SUPERBLOCK_SIZE
        {
            return Err(Error::OutOfRange(format!(
                "{} required codecs do not fit the {SUPERBLOCK_SIZE}-byte superblock",
                self.required_codec_uuids.len()
            )));
        }

        let mut buf = [0u8; SUPERBLOCK_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        buf[8..24].copy_from_slice(self.archive_uuid.as_bytes());
        buf[24..28].copy_from_slice(&self.flags.to_le_bytes());
        buf[28..36].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[36..44].copy_from_slice(&self.index_size.to_le_bytes());
        buf[44..46].copy_from_slice(&(self.required_codec_uuids.len() as u16).to_le_bytes());

        let mut pos = FIXED_PREFIX;
        for uuid in &self.required_codec_uuids {
            buf[pos..pos + 16].copy_from_slice(uuid);
            pos += 16;
        }

        let mut crc = Crc32::new();
        crc.update(&buf[..pos]);
        buf[pos..pos + 4].copy_from_slice(&crc.finalize().to_le_bytes());

        Ok(buf)
    }

    /// Write the superblock, padded to exactly 256 bytes
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    /// Parse and validate the 256-byte wire form.
    ///
    /// Magic and version are checked before anything past byte 8 is
    /// touched, so a foreign or placeholder file is rejected without
    /// further parsing. Then bounds, CRC, and finally codec availability
    /// against the registry.
    pub fn from_bytes(buf: &[u8; SUPERBLOCK_SIZE]) -> Result<Self> {
        if &buf[0..4] != MAGIC {
            return Err(Error::Magic);
        }

        let format_version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if format_version != FORMAT_VERSION {
            return Err(Error::FormatVersion(format_version));
        }

        let archive_uuid = Uuid::from_bytes(buf[8..24].try_into().unwrap());
        let flags = u32::from_le_bytes(buf[24..28].try_into().unwrap());
        let index_offset = u64::from_le_bytes(buf[28..36].try_into().unwrap());
        let index_size = u64::from_le_bytes(buf[36..44].try_into().unwrap());
        let codec_count = u16::from_le_bytes(buf[44..46].try_into().unwrap()) as usize;

        if codec_count > MAX_REQUIRED_CODECS
            || FIXED_PREFIX + codec_count * 16 + 4 > SUPERBLOCK_SIZE
        {
            return Err(Error::OutOfRange(format!(
                "required_codec_count {codec_count} overflows the superblock"
            )));
        }

        let mut required_codec_uuids = Vec::with_capacity(codec_count);
        for i in 0..codec_count {
            let start = FIXED_PREFIX + i * 16;
            let uuid: [u8; 16] = buf[start..start + 16].try_into().unwrap();
            if required_codec_uuids.contains(&uuid) {
                return Err(Error::OutOfRange(format!(
                    "duplicate required codec UUID {}",
                    uuid_to_string(&uuid)
                )));
            }
            required_codec_uuids.push(uuid);
        }

        let crc_end = FIXED_PREFIX + codec_count * 16;
        let stored = u32::from_le_bytes(buf[crc_end..crc_end + 4].try_into().unwrap());
        let mut crc = Crc32::new();
        crc.update(&buf[..crc_end]);
        let computed = crc.finalize();
        if stored != computed {
            return Err(Error::HeaderCrc { computed, stored });
        }

        let sb = Self {
            format_version,
            archive_uuid,
            flags,
            index_offset,
            index_size,
            required_codec_uuids,
        };

        sb.check_codecs()?;
        Ok(sb)
    }

    /// Read and validate a superblock from a stream
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        r.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }

    /// Whether any block in the archive is encrypted
    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.flags & SB_FLAG_ENCRYPTED != 0
    }
}

impl Default for Superblock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sixcy_codec::CodecId;

    #[test]
    fn test_roundtrip() {
        let mut sb = Superblock::new();
        sb.flags = SB_FLAG_ENCRYPTED;
        sb.index_offset = 4096;
        sb.index_size = 512;
        sb.add_required_codec(CodecId::Zstd.uuid());
        sb.add_required_codec(CodecId::Lz4.uuid());

        let bytes = sb.to_bytes().unwrap();
        let parsed = Superblock::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.archive_uuid, sb.archive_uuid);
        assert_eq!(parsed.flags, SB_FLAG_ENCRYPTED);
        assert_eq!(parsed.index_offset, 4096);
        assert_eq!(parsed.index_size, 512);
        assert_eq!(parsed.required_codec_uuids.len(), 2);
        assert!(parsed.is_encrypted());
    }

    #[test]
    fn test_none_codec_never_listed() {
        let mut sb = Superblock::new();
        sb.add_required_codec(CodecId::None.uuid());
        assert!(sb.required_codec_uuids.is_empty());

        sb.add_required_codec(CodecId::Zstd.uuid());
        sb.add_required_codec(CodecId::Zstd.uuid());
        assert_eq!(sb.required_codec_uuids.len(), 1);
    }

    #[test]
    fn test_placeholder_rejected() {
        // A zeroed superblock is what a reader sees before finalize.
        let buf = [0u8; SUPERBLOCK_SIZE];
        assert!(matches!(Superblock::from_bytes(&buf), Err(Error::Magic)));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let sb = Superblock::new();
        let mut bytes = sb.to_bytes().unwrap();
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());

        // Version is checked before the CRC, so this fails as FormatVersion.
        assert!(matches!(
            Superblock::from_bytes(&bytes),
            Err(Error::FormatVersion(2))
        ));
    }

    #[test]
    fn test_crc_flip_rejected() {
        let mut sb = Superblock::new();
        sb.add_required_codec(CodecId::Zstd.uuid());
        let mut bytes = sb.to_bytes().unwrap();
        bytes[30] ^= 0x40;

        assert!(matches!(
            Superblock::from_bytes(&bytes),
            Err(Error::HeaderCrc { .. })
        ));
    }

    #[test]
    fn test_codec_count_overflow_rejected() {
        let sb = Superblock::new();
        let mut bytes = sb.to_bytes().unwrap();
        bytes[44..46].copy_from_slice(&14u16.to_le_bytes());

        assert!(matches!(
            Superblock::from_bytes(&bytes),
            Err(Error::OutOfRange(_))
        ));
    }

    #[test]
    fn test_duplicate_codec_rejected() {
        let mut sb = Superblock::new();
        sb.add_required_codec(CodecId::Zstd.uuid());
        sb.required_codec_uuids.push(CodecId::Zstd.uuid());

        let bytes = sb.to_bytes().unwrap();
        assert!(matches!(
            Superblock::from_bytes(&bytes),
            Err(Error::OutOfRange(_))
        ));
    }

    #[test]
    fn test_unavailable_codec_rejected() {
        let mut sb = Superblock::new();
        sb.required_codec_uuids.push([0x99; 16]);

        let bytes = sb.to_bytes().unwrap();
        assert!(matches!(
            Superblock::from_bytes(&bytes),
            Err(Error::UnknownCodec { .. })
        ));
    }

    #[test]
    fn test_codec_list_capacity() {
        // 12 entries fit (46 + 192 + 4 = 242); a 13th would place the CRC
        // past byte 256, so serialization refuses it.
        let mut sb = Superblock::new();
        for i in 0..12u8 {
            let mut uuid = [0u8; 16];
            uuid[0] = i + 1;
            sb.required_codec_uuids.push(uuid);
        }
        assert!(sb.to_bytes().is_ok());

        sb.required_codec_uuids.push([0xFF; 16]);
        assert!(matches!(sb.to_bytes(), Err(Error::OutOfRange(_))));
    }
}
