//! Streaming archive writer
//!
//! The writer reserves a zeroed superblock at offset 0, appends
//! self-describing blocks, and patches the real superblock in place during
//! finalize. Every write is append-only except that final patch, so an
//! abort at any point leaves a prefix that the recovery scanner can walk.
//!
//! Chunks are deduplicated by content hash before compression: a chunk
//! whose BLAKE3 already appears in the dedup table produces only a
//! [`BlockRef`] to the existing block, never a second copy on disk.

use std::collections::HashMap;
use std::io::{Seek, SeekFrom, Write};

use chrono::Utc;
use sixcy_codec::CodecId;
use sixcy_crypto::Key;
use sixcy_hash::hash;
use tracing::{debug, info};

use crate::block::{encode_block, BlockType, FILE_ID_SHARED};
use crate::index::{BlockRef, FileIndex, FileRecord};
use crate::recovery::{RecoveryCheckpoint, RecoveryMap};
use crate::superblock::{Superblock, SB_FLAG_ENCRYPTED, SUPERBLOCK_SIZE};
use crate::{Error, Result};

/// Default chunk size: 4 MiB
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Default compression level (Zstd)
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Configuration for [`ArchiveWriter`]
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Chunk size for splitting files into DATA blocks
    pub chunk_size: usize,
    /// Default codec for [`ArchiveWriter::add_file`]
    pub codec: CodecId,
    /// Default compression level
    pub level: i32,
    /// When set, every DATA and SOLID block is encrypted with a key derived
    /// from this password and the archive UUID
    pub password: Option<String>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            codec: CodecId::Zstd,
            level: DEFAULT_COMPRESSION_LEVEL,
            password: None,
        }
    }
}

impl WriterConfig {
    /// Set the chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the default codec
    pub fn with_codec(mut self, codec: CodecId) -> Self {
        self.codec = codec;
        self
    }

    /// Set the default compression level
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Enable encryption with a password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Writer lifecycle. `Finalized` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Fresh,
    WritingBlocks,
    Solid,
    Finalized,
}

/// Dedup table entry: where an identical chunk already lives
#[derive(Debug, Clone, Copy)]
struct DedupEntry {
    archive_offset: u64,
    orig_size: u32,
    comp_size: u32,
}

/// Open solid-mode accumulation
struct SolidSession {
    codec: CodecId,
    buffer: Vec<u8>,
    /// (file_id, intra_offset, intra_length, content_hash)
    ranges: Vec<(u32, u64, u64, [u8; 32])>,
}

/// Streaming writer for `.6cy` archives
pub struct ArchiveWriter<W: Write + Seek> {
    writer: W,
    superblock: Superblock,
    index: FileIndex,
    recovery_map: RecoveryMap,
    dedup: HashMap<[u8; 32], DedupEntry>,
    solid: Option<SolidSession>,
    state: WriterState,
    chunk_size: usize,
    default_codec: CodecId,
    default_level: i32,
    key: Option<Key>,
    wrote_encrypted: bool,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    /// Create a writer with default configuration
    pub fn new(writer: W) -> Result<Self> {
        Self::with_config(writer, WriterConfig::default())
    }

    /// Create a writer, reserving the superblock region.
    ///
    /// If a password is configured the encryption key is derived here, with
    /// the freshly allocated archive UUID as the salt.
    pub fn with_config(mut writer: W, config: WriterConfig) -> Result<Self> {
        let superblock = Superblock::new();

        let key = match &config.password {
            Some(password) => Some(sixcy_crypto::derive_key(
                password,
                superblock.archive_uuid.as_bytes(),
            )?),
            None => None,
        };

        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&[0u8; SUPERBLOCK_SIZE])?;

        debug!(uuid = %superblock.archive_uuid, encrypted = key.is_some(), "created archive");

        Ok(Self {
            writer,
            superblock,
            index: FileIndex::default(),
            recovery_map: RecoveryMap::default(),
            dedup: HashMap::new(),
            solid: None,
            state: WriterState::Fresh,
            chunk_size: config.chunk_size.max(1),
            default_codec: config.codec,
            default_level: config.level,
            key,
            wrote_encrypted: false,
        })
    }

    /// The archive UUID allocated at creation
    pub fn uuid(&self) -> uuid::Uuid {
        self.superblock.archive_uuid
    }

    /// The in-memory file index (root hash is valid only after finalize)
    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    /// The superblock as it will be patched on finalize
    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == WriterState::Finalized {
            return Err(Error::State("archive is already finalized"));
        }
        Ok(())
    }

    /// Add a file using the configured default codec and level
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.add_file_with(name, data, self.default_codec, self.default_level)
    }

    /// Add a file with an explicit codec and level.
    ///
    /// Outside solid mode the file is split into `chunk_size` chunks, each
    /// run through the encode pipeline: hash, dedup probe, compress,
    /// optional encrypt, write. A dedup hit emits only a [`BlockRef`] to
    /// the existing block. Inside solid mode the bytes accumulate in the
    /// session buffer; block refs are filled in when the session flushes.
    pub fn add_file_with(
        &mut self,
        name: &str,
        data: &[u8],
        codec: CodecId,
        level: i32,
    ) -> Result<()> {
        self.ensure_open()?;

        let file_id = self.index.records.len() as u32;

        if let Some(session) = &mut self.solid {
            let intra_offset = session.buffer.len() as u64;
            session
                .ranges
                .push((file_id, intra_offset, data.len() as u64, hash(data)));
            session.buffer.extend_from_slice(data);

            self.index.records.push(FileRecord {
                id: file_id,
                parent_id: 0,
                name: name.to_owned(),
                block_refs: Vec::new(),
                offsets: Vec::new(),
                original_size: data.len() as u64,
                compressed_size: 0,
                metadata: HashMap::new(),
                degraded: false,
            });
            return Ok(());
        }

        self.state = WriterState::WritingBlocks;

        let mut record = FileRecord {
            id: file_id,
            parent_id: 0,
            name: name.to_owned(),
            block_refs: Vec::new(),
            offsets: Vec::new(),
            original_size: data.len() as u64,
            compressed_size: 0,
            metadata: HashMap::new(),
            degraded: false,
        };

        for (chunk_idx, chunk) in data.chunks(self.chunk_size).enumerate() {
            let file_offset = (chunk_idx * self.chunk_size) as u64;
            let content_hash = hash(chunk);

            if let Some(entry) = self.dedup.get(&content_hash) {
                record.block_refs.push(BlockRef {
                    content_hash,
                    archive_offset: entry.archive_offset,
                    intra_offset: 0,
                    intra_length: 0,
                });
                record.compressed_size += entry.comp_size as u64;
                debug!(
                    file_id,
                    file_offset,
                    archive_offset = entry.archive_offset,
                    "dedup hit, reusing existing block"
                );
                continue;
            }

            let (header, payload) = encode_block(
                BlockType::Data,
                file_id,
                file_offset,
                chunk,
                codec.uuid(),
                level,
                self.key.as_ref(),
            )?;

            let archive_offset = self.writer.stream_position()?;
            header.write_to(&mut self.writer)?;
            self.writer.write_all(&payload)?;
            self.superblock.add_required_codec(codec.uuid());
            self.wrote_encrypted |= header.is_encrypted();

            debug!(
                file_id,
                file_offset,
                archive_offset,
                orig_size = header.orig_size,
                comp_size = header.comp_size,
                codec = codec.name(),
                "wrote DATA block"
            );

            self.dedup.insert(
                content_hash,
                DedupEntry {
                    archive_offset,
                    orig_size: header.orig_size,
                    comp_size: header.comp_size,
                },
            );
            record.compressed_size += header.comp_size as u64;
            record.block_refs.push(BlockRef {
                content_hash,
                archive_offset,
                intra_offset: 0,
                intra_length: 0,
            });
        }

        self.checkpoint(file_id)?;
        self.index.records.push(record);
        Ok(())
    }

    /// Begin accumulating files into one SOLID block.
    ///
    /// Any open solid session is flushed first.
    pub fn begin_solid(&mut self, codec: CodecId) -> Result<()> {
        self.ensure_open()?;
        self.flush_solid()?;
        self.solid = Some(SolidSession {
            codec,
            buffer: Vec::new(),
            ranges: Vec::new(),
        });
        self.state = WriterState::Solid;
        Ok(())
    }

    /// Close the solid session, emitting exactly one SOLID block
    pub fn end_solid(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.flush_solid()?;
        self.state = WriterState::WritingBlocks;
        Ok(())
    }

    /// Compress the accumulated solid buffer as one SOLID block and patch
    /// every member file's refs with its intra-block range.
    ///
    /// SOLID blocks bypass the dedup table: they are one-off concatenations
    /// and their members are addressed by range, not by content hash.
    fn flush_solid(&mut self) -> Result<()> {
        let Some(session) = self.solid.take() else {
            return Ok(());
        };
        if session.buffer.is_empty() {
            return Ok(());
        }

        let (header, payload) = encode_block(
            BlockType::Solid,
            FILE_ID_SHARED,
            0,
            &session.buffer,
            session.codec.uuid(),
            self.default_level,
            self.key.as_ref(),
        )?;

        let archive_offset = self.writer.stream_position()?;
        let payload_len = payload.len() as u64;
        header.write_to(&mut self.writer)?;
        self.writer.write_all(&payload)?;
        self.superblock.add_required_codec(session.codec.uuid());
        self.wrote_encrypted |= header.is_encrypted();

        debug!(
            archive_offset,
            members = session.ranges.len(),
            orig_size = header.orig_size,
            comp_size = header.comp_size,
            codec = session.codec.name(),
            "wrote SOLID block"
        );

        let mut last_file_id = 0;
        for (file_id, intra_offset, intra_length, content_hash) in session.ranges {
            if let Some(record) = self.index.records.iter_mut().find(|r| r.id == file_id) {
                record.block_refs.push(BlockRef {
                    content_hash,
                    archive_offset,
                    intra_offset,
                    intra_length,
                });
                record.compressed_size = payload_len;
            }
            last_file_id = file_id;
        }

        self.checkpoint(last_file_id)?;
        Ok(())
    }

    /// Append a recovery checkpoint for a completed file
    fn checkpoint(&mut self, last_file_id: u32) -> Result<()> {
        self.recovery_map.checkpoints.push(RecoveryCheckpoint {
            archive_offset: self.writer.stream_position()?,
            last_file_id,
            timestamp: Utc::now().timestamp(),
        });
        Ok(())
    }

    /// Flush any open solid session, write the INDEX block and recovery
    /// map, then patch the superblock at offset 0.
    ///
    /// Idempotent after success. On I/O failure the archive stays
    /// recoverable by forward scan up to the last completed block.
    pub fn finalize(&mut self) -> Result<()> {
        if self.state == WriterState::Finalized {
            return Ok(());
        }
        self.flush_solid()?;

        self.index.compute_root_hash();
        let index_payload = self.index.to_bytes()?;

        // The INDEX block is always Zstd-compressed and never encrypted:
        // listing an archive must not require the password.
        let (header, on_disk) = encode_block(
            BlockType::Index,
            FILE_ID_SHARED,
            0,
            &index_payload,
            CodecId::Zstd.uuid(),
            DEFAULT_COMPRESSION_LEVEL,
            None,
        )?;

        let index_offset = self.writer.stream_position()?;
        header.write_to(&mut self.writer)?;
        self.writer.write_all(&on_disk)?;

        let recovery_bytes = self.recovery_map.to_bytes()?;
        self.writer
            .write_all(&(recovery_bytes.len() as u64).to_le_bytes())?;
        self.writer.write_all(&recovery_bytes)?;

        self.superblock.index_offset = index_offset;
        self.superblock.index_size = on_disk.len() as u64;
        // Flag bit 0 means "some block on disk is encrypted", not "a
        // password was configured".
        if self.wrote_encrypted {
            self.superblock.flags |= SB_FLAG_ENCRYPTED;
        }

        self.writer.seek(SeekFrom::Start(0))?;
        self.superblock.write_to(&mut self.writer)?;
        self.writer.flush()?;

        // The dedup table only serves the write path.
        self.dedup = HashMap::new();
        self.state = WriterState::Finalized;

        info!(
            uuid = %self.superblock.archive_uuid,
            files = self.index.records.len(),
            index_offset,
            root_hash = %hex::encode(self.index.root_hash),
            "finalized archive"
        );
        Ok(())
    }
}
