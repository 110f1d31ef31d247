//! Index-bypass recovery: forward scan, health classification, extraction
//!
//! The scanner walks forward from offset 256 inspecting each 84-byte block
//! header on its own. It needs neither the INDEX block nor the recovery
//! map: every block is self-describing, and a block is usable whenever its
//! header CRC holds. On a corrupt header the scanner counts one bad block
//! and resynchronizes by searching for the next header magic.
//!
//! Two modes share the loop:
//! - header-only scan reconstructs the file list without touching payloads;
//! - full recovery ([`extract_recoverable`]) also decodes every block, so
//!   payload corruption (hash or tag failures) is detected and the healthy
//!   remainder is re-emitted into a fresh archive.
//!
//! This is the one component that tolerates per-block errors: they are
//! encoded as [`BlockHealth`] verdicts, never returned as `Err`. Only
//! genuine I/O failures propagate.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sixcy_codec::{is_available, uuid_to_string, CodecId};
use sixcy_crypto::Key;
use tracing::{info, warn};

use crate::block::{decode_block, BlockHeader, BlockType, BLOCK_HEADER_SIZE, BLOCK_MAGIC};
use crate::index::{BlockRef, FileIndex, FileRecord};
use crate::superblock::SUPERBLOCK_SIZE;
use crate::writer::ArchiveWriter;
use crate::{Error, Result};

/// One checkpoint in the recovery map, appended after each completed file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryCheckpoint {
    /// Archive write position when the file completed
    pub archive_offset: u64,
    /// Id of the last completed file
    pub last_file_id: u32,
    /// Unix timestamp of the checkpoint
    pub timestamp: i64,
}

/// The length-prefixed JSON tail written after the INDEX block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryMap {
    /// Checkpoints in file-completion order
    pub checkpoints: Vec<RecoveryCheckpoint>,
}

impl RecoveryMap {
    /// Serialize to the JSON wire form (without the length prefix)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::IndexParse(e.to_string()))
    }

    /// Parse the JSON wire form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::IndexParse(e.to_string()))
    }

    /// Read a `u64 LE length || JSON` tail from a stream
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut len_buf = [0u8; 8];
        r.read_exact(&mut len_buf)?;
        let len = u64::from_le_bytes(len_buf);

        let mut payload = vec![0u8; len as usize];
        r.read_exact(&mut payload)?;
        Self::from_bytes(&payload)
    }
}

/// Health verdict for one scanned block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockHealth {
    /// Header CRC valid; payload present (and decoded, in full recovery)
    Healthy,
    /// Header CRC or magic failed; the block cannot be trusted
    HeaderCorrupt,
    /// Header valid but fewer payload bytes follow than declared
    TruncatedPayload {
        /// Bytes the header declared
        declared: u32,
        /// Bytes actually present
        available: u64,
    },
    /// Header valid but the codec UUID is not in the registry
    UnknownCodec {
        /// Hyphenated UUID for diagnostics
        uuid: String,
    },
    /// Payload failed to decode: hash mismatch, tag failure, or codec error.
    /// Only produced when payloads are verified (full recovery).
    PayloadCorrupt,
}

impl BlockHealth {
    /// Whether the block's payload can be used for recovery
    pub fn is_usable(&self) -> bool {
        matches!(self, BlockHealth::Healthy)
    }
}

/// Diagnostic record for one scanned block position
#[derive(Debug, Clone)]
pub struct ScannedBlock {
    /// Absolute byte offset of the block header in the archive
    pub archive_offset: u64,
    /// Parsed header, absent when the header itself was corrupt
    pub header: Option<BlockHeader>,
    /// Health verdict
    pub health: BlockHealth,
}

impl ScannedBlock {
    /// Whether this block can contribute recovered data
    pub fn is_usable(&self) -> bool {
        self.health.is_usable() && self.header.is_some()
    }
}

/// Overall quality of a recovery result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryQuality {
    /// At least 95% of scanned blocks healthy
    Full,
    /// Healthy share between 50% and 95%
    Partial,
    /// Blocks were scanned but no healthy DATA block was recovered
    HeaderOnly,
    /// Healthy share below 50%, or nothing scanned at all
    Catastrophic,
}

/// Complete report produced by [`scan`]
#[derive(Debug)]
pub struct RecoveryReport {
    /// Blocks scanned, healthy or not
    pub total_scanned: usize,
    /// Blocks whose header CRC held (and payload decoded, when verified)
    pub healthy_blocks: usize,
    /// Blocks with a corrupt header
    pub corrupt_blocks: usize,
    /// Blocks with a valid header but truncated payload
    pub truncated_blocks: usize,
    /// Blocks naming a codec UUID absent from the registry
    pub unknown_codec_blocks: usize,
    /// Blocks whose payload failed to decode (full recovery only)
    pub payload_corrupt_blocks: usize,
    /// Bytes of the archive covered by the scan
    pub bytes_scanned: u64,
    /// Per-block diagnostic log in scan order
    pub block_log: Vec<ScannedBlock>,
    /// Reconstructed file index (names are synthesized)
    pub index: FileIndex,
    /// Sum of `orig_size` over healthy DATA and SOLID blocks
    pub recoverable_bytes: u64,
    /// Overall quality rating
    pub quality: RecoveryQuality,
}

impl RecoveryReport {
    /// Percentage of scanned blocks that are healthy (0.0 to 100.0)
    pub fn health_pct(&self) -> f64 {
        if self.total_scanned == 0 {
            return 100.0;
        }
        self.healthy_blocks as f64 / self.total_scanned as f64 * 100.0
    }

    /// One-line summary for display
    pub fn summary(&self) -> String {
        format!(
            "{:?} recovery: {}/{} blocks healthy ({:.1}%), {} file(s) reconstructed, {:.2} MiB recoverable",
            self.quality,
            self.healthy_blocks,
            self.total_scanned,
            self.health_pct(),
            self.index.records.len(),
            self.recoverable_bytes as f64 / 1024.0 / 1024.0,
        )
    }
}

/// Options for [`scan`]
#[derive(Default)]
pub struct ScanOptions {
    /// Decode every block payload instead of trusting header CRCs alone
    pub verify_payloads: bool,
    /// Decryption key for verifying encrypted payloads
    pub key: Option<Key>,
    /// Per-block plaintext cap during verification; zero means the format
    /// ceiling (4 GiB)
    pub max_orig_size: u32,
}

impl ScanOptions {
    fn orig_size_cap(&self) -> u32 {
        if self.max_orig_size == 0 {
            u32::MAX
        } else {
            self.max_orig_size
        }
    }
}

/// Progress callback: `(bytes_scanned, total_bytes_estimate)`
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64, u64);

/// Fill `buf` from the stream, returning how many bytes arrived before EOF
fn read_fill<R: Read>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Search forward from `from` for the next plausible header magic.
///
/// Returns the absolute offset of the first magic match, or `None` at EOF.
/// A false positive costs one extra HeaderCorrupt entry in the log; a
/// four-byte collision inside payload data is rare enough not to matter.
fn resync<R: Read + Seek>(reader: &mut R, from: u64, file_size: u64) -> Result<Option<u64>> {
    const WINDOW: usize = 64 * 1024;
    let magic = BLOCK_MAGIC.to_le_bytes();

    let mut base = from;
    let mut carry: Vec<u8> = Vec::new();

    while base < file_size {
        reader.seek(SeekFrom::Start(base))?;
        let mut window = vec![0u8; WINDOW];
        let got = read_fill(reader, &mut window)?;
        if got == 0 {
            return Ok(None);
        }
        window.truncate(got);

        // Prepend up to 3 carry bytes so matches across window edges are seen.
        let carry_len = carry.len();
        let mut haystack = carry;
        haystack.extend_from_slice(&window);

        for i in 0..haystack.len().saturating_sub(3) {
            if haystack[i..i + 4] == magic {
                return Ok(Some(base - carry_len as u64 + i as u64));
            }
        }

        carry = haystack[haystack.len().saturating_sub(3)..].to_vec();
        base += got as u64;
    }
    Ok(None)
}

/// Scan an archive stream for recoverable blocks, bypassing the INDEX.
///
/// Returns a [`RecoveryReport`] no matter how damaged the input is; corrupt
/// data never aborts the scan. Only genuine I/O errors (permission loss,
/// device failure) propagate as `Err`.
pub fn scan<R: Read + Seek>(
    reader: &mut R,
    opts: &ScanOptions,
    mut progress: Option<ProgressFn<'_>>,
) -> Result<RecoveryReport> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(SUPERBLOCK_SIZE as u64))?;

    // file_id -> [(file_offset, ref)] for usable DATA blocks
    let mut chunks: HashMap<u32, Vec<(u64, BlockRef)>> = HashMap::new();
    let mut extents: HashMap<u32, u64> = HashMap::new();
    let mut block_log: Vec<ScannedBlock> = Vec::new();

    let mut total_scanned = 0usize;
    let mut healthy_blocks = 0usize;
    let mut healthy_data_blocks = 0usize;
    let mut corrupt_blocks = 0usize;
    let mut truncated_blocks = 0usize;
    let mut unknown_codec_blocks = 0usize;
    let mut payload_corrupt_blocks = 0usize;
    let mut recoverable_bytes = 0u64;
    let mut bytes_scanned = SUPERBLOCK_SIZE as u64;

    let mut pos = SUPERBLOCK_SIZE as u64;
    'scan: while pos < file_size {
        reader.seek(SeekFrom::Start(pos))?;

        let mut header_buf = [0u8; BLOCK_HEADER_SIZE];
        let got = read_fill(reader, &mut header_buf)?;
        if got < BLOCK_HEADER_SIZE {
            // A partial header at EOF is a truncated trailing block.
            if got > 0 {
                total_scanned += 1;
                truncated_blocks += 1;
                block_log.push(ScannedBlock {
                    archive_offset: pos,
                    header: None,
                    health: BlockHealth::TruncatedPayload {
                        declared: BLOCK_HEADER_SIZE as u32,
                        available: got as u64,
                    },
                });
            }
            break;
        }
        total_scanned += 1;
        bytes_scanned = pos + BLOCK_HEADER_SIZE as u64;

        let header = match BlockHeader::from_bytes(&header_buf) {
            Ok(h) => h,
            Err(_) => {
                corrupt_blocks += 1;
                warn!(archive_offset = pos, "corrupt block header, resyncing");
                block_log.push(ScannedBlock {
                    archive_offset: pos,
                    header: None,
                    health: BlockHealth::HeaderCorrupt,
                });

                match resync(reader, pos + 1, file_size)? {
                    Some(next) => {
                        bytes_scanned = next;
                        pos = next;
                        continue 'scan;
                    }
                    None => break 'scan,
                }
            }
        };

        let payload_start = pos + header.header_size as u64;
        let payload_end = payload_start + header.comp_size as u64;
        let block_type = header.block_type;

        let health = if !is_available(&header.codec_uuid) {
            unknown_codec_blocks += 1;
            BlockHealth::UnknownCodec {
                uuid: uuid_to_string(&header.codec_uuid),
            }
        } else if payload_end > file_size {
            truncated_blocks += 1;
            BlockHealth::TruncatedPayload {
                declared: header.comp_size,
                available: file_size.saturating_sub(payload_start),
            }
        } else if opts.verify_payloads {
            if header.orig_size > opts.orig_size_cap() {
                payload_corrupt_blocks += 1;
                BlockHealth::PayloadCorrupt
            } else {
                reader.seek(SeekFrom::Start(payload_start))?;
                let mut payload = vec![0u8; header.comp_size as usize];
                read_fill(reader, &mut payload)?;
                match decode_block(&header, &payload, opts.key.as_ref()) {
                    Ok(_) => {
                        healthy_blocks += 1;
                        if block_type != BlockType::Index {
                            recoverable_bytes += header.orig_size as u64;
                        }
                        BlockHealth::Healthy
                    }
                    Err(e) => {
                        payload_corrupt_blocks += 1;
                        warn!(archive_offset = pos, error = %e, "block payload failed to decode");
                        BlockHealth::PayloadCorrupt
                    }
                }
            }
        } else {
            healthy_blocks += 1;
            if block_type != BlockType::Index {
                recoverable_bytes += header.orig_size as u64;
            }
            BlockHealth::Healthy
        };

        if health.is_usable() && block_type == BlockType::Data {
            healthy_data_blocks += 1;
            let end = header.file_offset + header.orig_size as u64;
            let extent = extents.entry(header.file_id).or_insert(0);
            if end > *extent {
                *extent = end;
            }
            chunks.entry(header.file_id).or_default().push((
                header.file_offset,
                BlockRef {
                    content_hash: header.content_hash,
                    archive_offset: pos,
                    intra_offset: 0,
                    intra_length: 0,
                },
            ));
        }

        block_log.push(ScannedBlock {
            archive_offset: pos,
            header: Some(header),
            health: health.clone(),
        });

        if let Some(cb) = progress.as_mut() {
            cb(bytes_scanned, file_size);
        }

        match health {
            // Nothing can follow a truncated payload.
            BlockHealth::TruncatedPayload { .. } => break,
            _ if block_type == BlockType::Index => break,
            _ => {
                bytes_scanned = payload_end;
                pos = payload_end;
            }
        }
    }

    // Group usable DATA blocks by file, sorted by file offset.
    let mut records: Vec<FileRecord> = chunks
        .into_iter()
        .map(|(file_id, mut blocks)| {
            blocks.sort_by_key(|(file_offset, _)| *file_offset);
            let refs = blocks.into_iter().map(|(_, r)| r).collect();
            let size = extents.get(&file_id).copied().unwrap_or(0);
            FileRecord::from_scan(file_id, size, refs)
        })
        .collect();
    records.sort_by_key(|r| r.id);

    let mut index = FileIndex {
        records,
        root_hash: [0u8; 32],
    };
    index.compute_root_hash();

    let quality = if total_scanned == 0 {
        RecoveryQuality::Catastrophic
    } else if healthy_data_blocks == 0 {
        RecoveryQuality::HeaderOnly
    } else {
        let share = healthy_blocks as f64 / total_scanned as f64;
        if share >= 0.95 {
            RecoveryQuality::Full
        } else if share >= 0.50 {
            RecoveryQuality::Partial
        } else {
            RecoveryQuality::Catastrophic
        }
    };

    let report = RecoveryReport {
        total_scanned,
        healthy_blocks,
        corrupt_blocks,
        truncated_blocks,
        unknown_codec_blocks,
        payload_corrupt_blocks,
        bytes_scanned,
        block_log,
        index,
        recoverable_bytes,
        quality,
    };

    info!(
        quality = ?report.quality,
        healthy = report.healthy_blocks,
        total = report.total_scanned,
        files = report.index.records.len(),
        "recovery scan complete"
    );
    Ok(report)
}

/// Scan the archive at `path` (headers only) and return the report
pub fn scan_file(path: &Path) -> Result<RecoveryReport> {
    let mut file = std::fs::File::open(path)?;
    scan(&mut file, &ScanOptions::default(), None)
}

/// Extract every recoverable DATA block from `src` into a fresh archive.
///
/// Runs a full (payload-verifying) scan, then re-encodes the healthy DATA
/// blocks of each file, in file-offset order, into a new unencrypted
/// Zstd archive written to `dst`. SOLID members cannot be attributed to
/// files without the original INDEX and are not extracted.
pub fn extract_recoverable<R, W>(
    src: &mut R,
    dst: &mut W,
    decryption_key: Option<&Key>,
) -> Result<RecoveryReport>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let opts = ScanOptions {
        verify_payloads: true,
        key: decryption_key.cloned(),
        max_orig_size: 0,
    };
    let report = scan(src, &opts, None)?;

    let mut by_file: HashMap<u32, Vec<&ScannedBlock>> = HashMap::new();
    for scanned in report.block_log.iter().filter(|s| s.is_usable()) {
        if let Some(header) = &scanned.header {
            if header.block_type == BlockType::Data {
                by_file.entry(header.file_id).or_default().push(scanned);
            }
        }
    }

    let mut writer = ArchiveWriter::new(dst)?;

    let mut file_ids: Vec<u32> = by_file.keys().copied().collect();
    file_ids.sort_unstable();

    for file_id in file_ids {
        let mut blocks = by_file.remove(&file_id).unwrap();
        blocks.sort_by_key(|s| s.header.as_ref().map(|h| h.file_offset).unwrap_or(0));

        let mut data = Vec::new();
        for scanned in blocks {
            let header = scanned.header.as_ref().unwrap();
            src.seek(SeekFrom::Start(
                scanned.archive_offset + header.header_size as u64,
            ))?;
            let mut payload = vec![0u8; header.comp_size as usize];
            src.read_exact(&mut payload)?;

            // The scan already verified this block; a failure here means the
            // medium changed under us, so skip the block rather than abort.
            match decode_block(header, &payload, decryption_key) {
                Ok(chunk) => data.extend_from_slice(&chunk),
                Err(e) => {
                    warn!(archive_offset = scanned.archive_offset, error = %e, "block decode failed during extraction");
                    continue;
                }
            }
        }

        if !data.is_empty() {
            let name = format!("file_{file_id:08x}");
            writer.add_file_with(&name, &data, CodecId::Zstd, 3)?;
        }
    }

    writer.finalize()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WriterConfig;
    use std::io::Cursor;

    /// Chunk-distinct bytes so deduplication never collapses blocks
    fn distinct(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                (state >> 24) as u8
            })
            .collect()
    }

    fn build_archive(files: &[(&str, Vec<u8>)], chunk_size: usize) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        let mut writer = ArchiveWriter::with_config(
            &mut buf,
            WriterConfig::default().with_chunk_size(chunk_size),
        )
        .unwrap();
        for (name, data) in files {
            writer.add_file(name, data).unwrap();
        }
        writer.finalize().unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_scan_intact_archive() {
        let bytes = build_archive(
            &[
                ("a.bin", distinct(3000, 1)),
                ("b.bin", distinct(4000, 2)),
            ],
            1024,
        );

        let report = scan(&mut Cursor::new(bytes), &ScanOptions::default(), None).unwrap();

        assert_eq!(report.corrupt_blocks, 0);
        assert_eq!(report.quality, RecoveryQuality::Full);
        assert_eq!(report.index.records.len(), 2);
        assert_eq!(report.index.records[0].name, "file_00000000");
        assert_eq!(report.index.records[0].original_size, 3000);
        // a.bin: ceil(3000/1024) = 3 blocks, sorted by file_offset.
        assert_eq!(report.index.records[0].block_refs.len(), 3);
    }

    #[test]
    fn test_scan_empty_input() {
        let report = scan(
            &mut Cursor::new(vec![0u8; SUPERBLOCK_SIZE]),
            &ScanOptions::default(),
            None,
        )
        .unwrap();

        assert_eq!(report.total_scanned, 0);
        assert_eq!(report.quality, RecoveryQuality::Catastrophic);
    }

    #[test]
    fn test_scan_progress_callback() {
        let bytes = build_archive(&[("f", vec![5u8; 4096])], 1024);

        let mut calls = 0u32;
        let mut last = 0u64;
        let mut cb = |scanned: u64, total: u64| {
            calls += 1;
            assert!(scanned <= total);
            assert!(scanned >= last);
            last = scanned;
        };
        scan(&mut Cursor::new(bytes), &ScanOptions::default(), Some(&mut cb)).unwrap();

        assert!(calls > 0);
    }

    #[test]
    fn test_recovery_map_tail_roundtrip() {
        let map = RecoveryMap {
            checkpoints: vec![RecoveryCheckpoint {
                archive_offset: 4096,
                last_file_id: 2,
                timestamp: 1_700_000_000,
            }],
        };

        let body = map.to_bytes().unwrap();
        let mut tail = (body.len() as u64).to_le_bytes().to_vec();
        tail.extend_from_slice(&body);

        let parsed = RecoveryMap::read_from(Cursor::new(tail)).unwrap();
        assert_eq!(parsed.checkpoints.len(), 1);
        assert_eq!(parsed.checkpoints[0].archive_offset, 4096);
        assert_eq!(parsed.checkpoints[0].last_file_id, 2);
    }

    #[test]
    fn test_resync_finds_next_magic() {
        let mut bytes = vec![0u8; 512];
        let magic = BLOCK_MAGIC.to_le_bytes();
        bytes[300..304].copy_from_slice(&magic);

        let mut cursor = Cursor::new(bytes);
        let found = resync(&mut cursor, 0, 512).unwrap();
        assert_eq!(found, Some(300));

        let found = resync(&mut cursor, 301, 512).unwrap();
        assert_eq!(found, None);
    }
}
