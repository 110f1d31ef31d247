//! Block header and payload codec (84-byte header, fixed)
//!
//! On-disk layout, all fields little-endian:
//!
//! ```text
//! Offset  Size  Field
//!    0      4   magic          = 0x424C434B ("BLCK")
//!    4      2   header_version = 1
//!    6      2   header_size    = 84 (readers honour larger values and skip)
//!    8      2   block_type     0=DATA 1=INDEX 2=SOLID
//!   10      2   flags          bit 0 = encrypted
//!   12     16   codec_uuid     frozen identity, LE field order
//!   28      4   file_id        0xFFFF_FFFF for INDEX/SOLID
//!   32      8   file_offset    offset within the decompressed file
//!   40      4   orig_size      plaintext bytes
//!   44      4   comp_size      on-disk payload bytes
//!   48     32   content_hash   BLAKE3 of the plaintext
//!   80      4   header_crc32   CRC32-IEEE of bytes [0..80)
//! ```
//!
//! The CRC detects header corruption before any seek or allocation;
//! payload integrity is verified separately via `content_hash` after
//! decoding. Both checks are mandatory.

use std::io::{Read, Write};

use crc32fast::Hasher as Crc32;
use sixcy_codec::uuid_to_string;
use sixcy_crypto::Key;
use sixcy_hash::hash;

use crate::{Error, Result};

/// On-disk magic for every block header ("BLCK" as LE u32)
pub const BLOCK_MAGIC: u32 = 0x424C_434B;

/// Current block header layout version
pub const BLOCK_HEADER_VERSION: u16 = 1;

/// Byte size of the v1 block header, including the trailing CRC
pub const BLOCK_HEADER_SIZE: usize = 84;

/// Span of header bytes covered by `header_crc32`
const CRC_SPAN: usize = 80;

/// `file_id` sentinel for blocks that do not belong to a single file
pub const FILE_ID_SHARED: u32 = 0xFFFF_FFFF;

/// Flag bit: payload is AES-256-GCM encrypted (nonce prepended)
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Role of a block within the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BlockType {
    /// One contiguous range of one file
    Data = 0,
    /// The serialized file catalog
    Index = 1,
    /// Multiple files' concatenated plaintext
    Solid = 2,
}

impl BlockType {
    /// Parse the on-disk discriminant; values >= 3 are rejected
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(BlockType::Data),
            1 => Some(BlockType::Index),
            2 => Some(BlockType::Solid),
            _ => None,
        }
    }
}

/// Parsed block header
#[derive(Debug, Clone)]
pub struct BlockHeader {
    /// Header layout version (1)
    pub header_version: u16,
    /// Total header size; payload starts `header_size` bytes after the header start
    pub header_size: u16,
    /// Role of this block
    pub block_type: BlockType,
    /// Flag bits (bit 0 = encrypted)
    pub flags: u16,
    /// Frozen codec identity, written verbatim
    pub codec_uuid: [u8; 16],
    /// Owning file, or [`FILE_ID_SHARED`]
    pub file_id: u32,
    /// Offset of this block's plaintext within the file
    pub file_offset: u64,
    /// Plaintext size in bytes
    pub orig_size: u32,
    /// On-disk payload size in bytes (after compression and encryption)
    pub comp_size: u32,
    /// BLAKE3 of the plaintext
    pub content_hash: [u8; 32],
}

impl BlockHeader {
    /// Whether the payload is encrypted
    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Serialize to the 84-byte wire form; the CRC is computed here
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];

        buf[0..4].copy_from_slice(&BLOCK_MAGIC.to_le_bytes());
        buf[4..6].copy_from_slice(&self.header_version.to_le_bytes());
        buf[6..8].copy_from_slice(&self.header_size.to_le_bytes());
        buf[8..10].copy_from_slice(&(self.block_type as u16).to_le_bytes());
        buf[10..12].copy_from_slice(&self.flags.to_le_bytes());
        buf[12..28].copy_from_slice(&self.codec_uuid);
        buf[28..32].copy_from_slice(&self.file_id.to_le_bytes());
        buf[32..40].copy_from_slice(&self.file_offset.to_le_bytes());
        buf[40..44].copy_from_slice(&self.orig_size.to_le_bytes());
        buf[44..48].copy_from_slice(&self.comp_size.to_le_bytes());
        buf[48..80].copy_from_slice(&self.content_hash);

        let mut crc = Crc32::new();
        crc.update(&buf[..CRC_SPAN]);
        buf[80..84].copy_from_slice(&crc.finalize().to_le_bytes());

        buf
    }

    /// Parse and validate the 84-byte wire form.
    ///
    /// Check order: CRC32 first (cheapest, catches any corruption), then
    /// magic, version, `header_size` bound, block type. The caller must not
    /// touch the payload if this fails.
    pub fn from_bytes(buf: &[u8; BLOCK_HEADER_SIZE]) -> Result<Self> {
        let mut crc = Crc32::new();
        crc.update(&buf[..CRC_SPAN]);
        let computed = crc.finalize();
        let stored = u32::from_le_bytes(buf[80..84].try_into().unwrap());
        if stored != computed {
            return Err(Error::HeaderCrc { computed, stored });
        }

        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != BLOCK_MAGIC {
            return Err(Error::Magic);
        }

        let header_version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        if header_version != BLOCK_HEADER_VERSION {
            return Err(Error::FormatVersion(header_version as u32));
        }

        let header_size = u16::from_le_bytes(buf[6..8].try_into().unwrap());
        if (header_size as usize) < BLOCK_HEADER_SIZE {
            return Err(Error::OutOfRange(format!(
                "header_size {header_size} below minimum {BLOCK_HEADER_SIZE}"
            )));
        }

        let block_type_raw = u16::from_le_bytes(buf[8..10].try_into().unwrap());
        let block_type = BlockType::from_u16(block_type_raw)
            .ok_or_else(|| Error::OutOfRange(format!("unknown block_type {block_type_raw}")))?;

        Ok(Self {
            header_version,
            header_size,
            block_type,
            flags: u16::from_le_bytes(buf[10..12].try_into().unwrap()),
            codec_uuid: buf[12..28].try_into().unwrap(),
            file_id: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
            file_offset: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            orig_size: u32::from_le_bytes(buf[40..44].try_into().unwrap()),
            comp_size: u32::from_le_bytes(buf[44..48].try_into().unwrap()),
            content_hash: buf[48..80].try_into().unwrap(),
        })
    }

    /// Write the header to a stream
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Read and validate a header from a stream
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        r.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }
}

/// Run a chunk of plaintext through the encode pipeline.
///
/// Strict order: BLAKE3 the plaintext, compress via the codec named by
/// `codec_uuid`, optionally seal the compressed bytes (setting
/// [`FLAG_ENCRYPTED`]), then fill the header. The content hash always
/// covers the original plaintext, independent of compression and
/// encryption, so it doubles as the content-addressed-storage key.
///
/// Dedup consultation happens in the writer before this is called; a dedup
/// hit never reaches the encoder.
pub fn encode_block(
    block_type: BlockType,
    file_id: u32,
    file_offset: u64,
    data: &[u8],
    codec_uuid: [u8; 16],
    level: i32,
    encryption_key: Option<&Key>,
) -> Result<(BlockHeader, Vec<u8>)> {
    let orig_size = u32::try_from(data.len())
        .map_err(|_| Error::OutOfRange("block plaintext exceeds 4 GiB".into()))?;

    let content_hash = hash(data);

    let codec = sixcy_codec::lookup(&codec_uuid)?;
    let mut payload = codec.compress(data, level)?;

    let mut flags = 0u16;
    if let Some(key) = encryption_key {
        payload = sixcy_crypto::seal(key, &payload)?;
        flags |= FLAG_ENCRYPTED;
    }

    let comp_size = u32::try_from(payload.len())
        .map_err(|_| Error::OutOfRange("block payload exceeds 4 GiB".into()))?;

    let header = BlockHeader {
        header_version: BLOCK_HEADER_VERSION,
        header_size: BLOCK_HEADER_SIZE as u16,
        block_type,
        flags,
        codec_uuid,
        file_id,
        file_offset,
        orig_size,
        comp_size,
        content_hash,
    };

    Ok((header, payload))
}

/// Verify, decrypt, and decompress a block payload.
///
/// Strict order, any mismatch fatal for the block:
/// 1. resolve the codec UUID (guards recovery scans that bypass the
///    open-time gate);
/// 2. open the AEAD envelope if [`FLAG_ENCRYPTED`] is set; tag failure is
///    [`Error::AuthFailed`] and no plaintext escapes;
/// 3. decompress with `orig_size` as the capacity hint;
/// 4. check decoded length and BLAKE3 against the header.
pub fn decode_block(
    header: &BlockHeader,
    payload: &[u8],
    decryption_key: Option<&Key>,
) -> Result<Vec<u8>> {
    if !sixcy_codec::is_available(&header.codec_uuid) {
        return Err(Error::UnknownCodec {
            uuid: uuid_to_string(&header.codec_uuid),
        });
    }

    let opened;
    let compressed: &[u8] = if header.is_encrypted() {
        let key = decryption_key.ok_or(Error::MissingKey)?;
        opened = sixcy_crypto::open(key, payload)?;
        &opened
    } else {
        payload
    };

    let codec = sixcy_codec::lookup(&header.codec_uuid)?;
    let decoded = codec.decompress(compressed, header.orig_size as usize)?;

    if decoded.len() != header.orig_size as usize || hash(&decoded) != header.content_hash {
        return Err(Error::ContentHash);
    }

    Ok(decoded)
}
