//! Integration tests for index-bypass recovery
//!
//! Covers index reconstruction from headers after the INDEX block is lost,
//! full recovery after bit-rot, truncation behaviour, and scans of archives
//! whose finalize never ran.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use sixcy_codec::CodecId;
use sixcy_format::{
    Archive, ArchiveWriter, BlockHealth, BlockType, Error, RecoveryQuality, Superblock,
    WriterConfig, BLOCK_HEADER_SIZE, SUPERBLOCK_SIZE,
};

/// Deterministic incompressible-ish bytes
fn pattern(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 24) as u8
        })
        .collect()
}

/// Build an archive of `files` with 1 KiB chunks, returning its path
fn build_archive(dir: &Path, files: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join("archive.6cy");
    let mut ar = Archive::create(
        &path,
        WriterConfig::default().with_chunk_size(1024),
    )
    .unwrap();
    for (name, data) in files {
        ar.add_file(name, data).unwrap();
    }
    ar.finalize().unwrap();
    path
}

fn flip_bit(path: &Path, offset: u64, mask: u8) {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .unwrap();
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.read_exact(&mut byte).unwrap();
    byte[0] ^= mask;
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&byte).unwrap();
}

/// Archive offsets of all DATA blocks, in on-disk order
fn data_block_offsets(path: &Path) -> Vec<u64> {
    Archive::scan_damaged(path)
        .unwrap()
        .block_log
        .iter()
        .filter(|b| {
            b.header
                .as_ref()
                .is_some_and(|h| h.block_type == BlockType::Data)
        })
        .map(|b| b.archive_offset)
        .collect()
}

#[test]
fn test_index_reconstruction_after_truncation() {
    let temp = TempDir::new().unwrap();
    let file_a = pattern(3000, 1);
    let file_b = pattern(4500, 2);
    let path = build_archive(temp.path(), &[("a.bin", &file_a), ("b.bin", &file_b)]);

    // Remember the real index before destroying it.
    let mut pristine = sixcy_format::ArchiveReader::new(File::open(&path).unwrap()).unwrap();
    let original_records = pristine.index().records.clone();
    drop(pristine);

    // Discard the INDEX block and the recovery map.
    let sb = Superblock::read_from(File::open(&path).unwrap()).unwrap();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(sb.index_offset).unwrap();
    drop(file);

    // The archive no longer opens normally.
    assert!(Archive::open(&path).is_err());

    let report = Archive::scan_damaged(&path).unwrap();
    assert_eq!(report.quality, RecoveryQuality::Full);
    assert_eq!(report.corrupt_blocks, 0);
    assert_eq!(report.index.records.len(), 2);

    // Synthesized names, refs sorted by file_offset, original hashes intact.
    let rec_a = &report.index.records[0];
    let rec_b = &report.index.records[1];
    assert_eq!(rec_a.name, "file_00000000");
    assert_eq!(rec_b.name, "file_00000001");
    assert_eq!(rec_a.original_size, 3000);
    assert_eq!(rec_b.original_size, 4500);
    assert_eq!(rec_a.block_refs.len(), 3);
    assert_eq!(rec_b.block_refs.len(), 5);

    for (scanned, original) in report.index.records.iter().zip(&original_records) {
        let scanned_hashes: Vec<[u8; 32]> =
            scanned.block_refs.iter().map(|r| r.content_hash).collect();
        let original_hashes: Vec<[u8; 32]> =
            original.block_refs.iter().map(|r| r.content_hash).collect();
        assert_eq!(scanned_hashes, original_hashes);
    }
}

#[test]
fn test_truncation_mid_index_still_recovers() {
    let temp = TempDir::new().unwrap();
    let data = pattern(5 * 1024, 5);
    let path = build_archive(temp.path(), &[("f.bin", &data)]);

    // Cut inside the INDEX payload: below index_offset + index_size, above 256.
    let sb = Superblock::read_from(File::open(&path).unwrap()).unwrap();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(sb.index_offset + BLOCK_HEADER_SIZE as u64 + sb.index_size / 2)
        .unwrap();
    drop(file);

    let report = Archive::scan_damaged(&path).unwrap();

    // All five DATA blocks survive; only the INDEX is truncated.
    assert_eq!(report.truncated_blocks, 1);
    assert_eq!(report.index.records.len(), 1);
    assert_eq!(report.index.records[0].block_refs.len(), 5);
    assert_eq!(report.index.records[0].original_size, 5 * 1024);
}

#[test]
fn test_full_recovery_after_bit_rot() {
    let temp = TempDir::new().unwrap();
    let data = pattern(5 * 1024, 42);
    let path = build_archive(temp.path(), &[("f.bin", &data)]);

    let offsets = data_block_offsets(&path);
    assert_eq!(offsets.len(), 5);

    // One bit in the first block's header, one bit in the third block's payload.
    flip_bit(&path, offsets[0] + 40, 0x10);
    flip_bit(&path, offsets[2] + BLOCK_HEADER_SIZE as u64 + 10, 0x04);

    let out_path = temp.path().join("recovered.6cy");
    let report = Archive::extract_recoverable(&path, &out_path, None).unwrap();

    assert_eq!(report.corrupt_blocks, 1);
    assert_eq!(report.payload_corrupt_blocks, 1);
    // Blocks 1, 3, 4 plus the INDEX are healthy: 4 of 6 scanned.
    assert_eq!(report.total_scanned, 6);
    assert_eq!(report.healthy_blocks, 4);
    assert_eq!(report.quality, RecoveryQuality::Partial);

    assert_eq!(
        report.block_log[0].health,
        BlockHealth::HeaderCorrupt,
        "first block must be classified by its corrupt header"
    );
    assert_eq!(report.block_log[2].health, BlockHealth::PayloadCorrupt);

    // The fresh archive holds the healthy chunks, in file-offset order.
    let mut expected = Vec::new();
    expected.extend_from_slice(&data[1024..2048]);
    expected.extend_from_slice(&data[3072..5120]);

    let mut recovered = Archive::open(&out_path).unwrap();
    assert_eq!(recovered.read_file("file_00000000").unwrap(), expected);
}

#[test]
fn test_scan_of_unfinalized_archive() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("aborted.6cy");

    let data = pattern(4 * 1024, 9);
    {
        let mut writer = ArchiveWriter::with_config(
            File::create(&path).unwrap(),
            WriterConfig::default().with_chunk_size(1024),
        )
        .unwrap();
        writer.add_file("doomed.bin", &data).unwrap();
        // Dropped without finalize: placeholder superblock, no INDEX.
    }

    // A reader must refuse the placeholder superblock.
    assert!(matches!(Archive::open(&path), Err(Error::Magic)));

    // Forward scan still recovers everything written before the abort.
    let report = Archive::scan_damaged(&path).unwrap();
    assert_eq!(report.corrupt_blocks, 0);
    assert_eq!(report.index.records.len(), 1);
    assert_eq!(report.index.records[0].original_size, data.len() as u64);

    let out_path = temp.path().join("rescued.6cy");
    Archive::extract_recoverable(&path, &out_path, None).unwrap();
    let mut rescued = Archive::open(&out_path).unwrap();
    assert_eq!(rescued.read_file("file_00000000").unwrap(), data);
}

#[test]
fn test_encrypted_recovery_with_password() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("secret.6cy");

    let data = pattern(3 * 1024, 77);
    let mut ar = Archive::create(
        &path,
        WriterConfig::default()
            .with_chunk_size(1024)
            .with_password("hunter2"),
    )
    .unwrap();
    ar.add_file("s.bin", &data).unwrap();
    ar.finalize().unwrap();

    // Without the password the payloads cannot be verified.
    let out_bad = temp.path().join("bad.6cy");
    let report = Archive::extract_recoverable(&path, &out_bad, None).unwrap();
    assert_eq!(report.payload_corrupt_blocks, 3);
    assert_eq!(report.quality, RecoveryQuality::HeaderOnly);

    // With it, full recovery round-trips the plaintext.
    let out_good = temp.path().join("good.6cy");
    let report = Archive::extract_recoverable(&path, &out_good, Some("hunter2")).unwrap();
    assert_eq!(report.payload_corrupt_blocks, 0);
    assert_eq!(report.quality, RecoveryQuality::Full);

    let mut recovered = Archive::open(&out_good).unwrap();
    assert_eq!(recovered.read_file("file_00000000").unwrap(), data);
}

#[test]
fn test_unknown_codec_classified_not_fatal() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("alien.6cy");

    // Hand-craft: zeroed superblock region, then one block naming a codec
    // this build has never heard of.
    let payload = b"opaque alien payload".to_vec();
    let (mut header, _) = sixcy_format::encode_block(
        BlockType::Data,
        0,
        0,
        &payload,
        CodecId::None.uuid(),
        0,
        None,
    )
    .unwrap();
    header.codec_uuid = [0xAB; 16];

    let mut bytes = vec![0u8; SUPERBLOCK_SIZE];
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(&payload);
    std::fs::write(&path, &bytes).unwrap();

    let report = Archive::scan_damaged(&path).unwrap();
    assert_eq!(report.unknown_codec_blocks, 1);
    assert_eq!(report.total_scanned, 1);
    assert!(matches!(
        report.block_log[0].health,
        BlockHealth::UnknownCodec { .. }
    ));
    // Header-only: a block was scanned but nothing healthy was recovered.
    assert_eq!(report.quality, RecoveryQuality::HeaderOnly);
}

#[test]
fn test_report_summary_shape() {
    let temp = TempDir::new().unwrap();
    let data = pattern(2048, 8);
    let path = build_archive(temp.path(), &[("x.bin", &data)]);

    let report = Archive::scan_damaged(&path).unwrap();
    let summary = report.summary();

    assert!(summary.contains("Full"));
    assert!(summary.contains("file(s) reconstructed"));
    assert!((report.health_pct() - 100.0).abs() < f64::EPSILON);
}
