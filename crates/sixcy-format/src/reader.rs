//! Archive reader: superblock gate, index load, random access
//!
//! Opening verifies the superblock, enforces codec availability for the
//! whole archive upfront, then decodes the INDEX block into the file
//! catalog. Reads are served by walking a record's block refs; each block
//! is decoded in full (the block is the atomic unit of storage and
//! integrity), and [`read_at`](ArchiveReader::read_at) decodes only the
//! blocks that overlap the requested range.

use std::io::{Read, Seek, SeekFrom};

use sixcy_crypto::Key;
use tracing::debug;

use crate::block::{decode_block, BlockHeader, BlockType, BLOCK_HEADER_SIZE};
use crate::index::{BlockRef, FileIndex, FileRecord};
use crate::superblock::Superblock;
use crate::{Error, Result};

/// Configuration for [`ArchiveReader`]
#[derive(Default)]
pub struct ReaderOptions {
    /// Decryption key for encrypted blocks
    pub key: Option<Key>,
    /// Reject archives that need the legacy `offsets` index shim
    pub strict: bool,
    /// Upper bound on a single block's plaintext size; reads of blocks
    /// declaring more are refused before allocation. Zero means the format
    /// ceiling (4 GiB).
    pub max_orig_size: u32,
}

impl ReaderOptions {
    /// Supply a decryption key
    pub fn with_key(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }

    /// Enable strict mode
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Lower the per-block plaintext gate for untrusted input
    pub fn with_max_orig_size(mut self, max: u32) -> Self {
        self.max_orig_size = max;
        self
    }

    fn orig_size_cap(&self) -> u32 {
        if self.max_orig_size == 0 {
            u32::MAX
        } else {
            self.max_orig_size
        }
    }
}

/// Reader for `.6cy` archives
pub struct ArchiveReader<R: Read + Seek> {
    reader: R,
    superblock: Superblock,
    index: FileIndex,
    opts: ReaderOptions,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Open an archive with default options
    pub fn new(reader: R) -> Result<Self> {
        Self::with_options(reader, ReaderOptions::default())
    }

    /// Open an archive.
    ///
    /// Verifies the superblock (magic, exact version, CRC), enforces codec
    /// availability for every declared UUID, then seeks to the INDEX block
    /// and reconstructs the file catalog. An archive whose finalize never
    /// completed still carries the zeroed placeholder superblock and is
    /// refused here; it remains recoverable by forward scan.
    pub fn with_options(mut reader: R, opts: ReaderOptions) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let superblock = Superblock::read_from(&mut reader)?;

        reader.seek(SeekFrom::Start(superblock.index_offset))?;
        let header = BlockHeader::read_from(&mut reader)?;
        if header.block_type != BlockType::Index {
            return Err(Error::IndexParse(
                "superblock does not point at an INDEX block".into(),
            ));
        }
        if header.is_encrypted() {
            return Err(Error::IndexParse("INDEX block must not be encrypted".into()));
        }
        if header.orig_size > opts.orig_size_cap() {
            return Err(Error::OutOfRange(format!(
                "INDEX orig_size {} exceeds the configured cap",
                header.orig_size
            )));
        }

        let payload = read_block_payload(&mut reader, &header)?;
        let raw = decode_block(&header, &payload, None)?;
        let index = FileIndex::from_bytes(&raw)?;

        if opts.strict && index.has_degraded_records() {
            return Err(Error::IndexParse(
                "legacy offsets index rejected in strict mode".into(),
            ));
        }

        debug!(
            uuid = %superblock.archive_uuid,
            files = index.records.len(),
            encrypted = superblock.is_encrypted(),
            "opened archive"
        );

        Ok(Self {
            reader,
            superblock,
            index,
            opts,
        })
    }

    /// The parsed superblock
    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// The file catalog
    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    /// Root hash recorded in the index
    pub fn root_hash(&self) -> [u8; 32] {
        self.index.root_hash
    }

    fn record_by_id(&self, id: u32) -> Result<&FileRecord> {
        self.index
            .find_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("file id {id}")))
    }

    /// Read the block header at an archive offset (no payload)
    fn header_at(&mut self, offset: u64) -> Result<BlockHeader> {
        self.reader.seek(SeekFrom::Start(offset))?;
        BlockHeader::read_from(&mut self.reader)
    }

    /// Read and validate one block, returning its raw on-disk payload
    fn block_at(&mut self, offset: u64) -> Result<(BlockHeader, Vec<u8>)> {
        let header = self.header_at(offset)?;
        if header.orig_size > self.opts.orig_size_cap() {
            return Err(Error::OutOfRange(format!(
                "block orig_size {} exceeds the configured cap",
                header.orig_size
            )));
        }
        let payload = read_block_payload(&mut self.reader, &header)?;
        Ok((header, payload))
    }

    /// Decode the block behind a ref, slicing solid members to their range
    fn decode_ref(&mut self, block_ref: &BlockRef) -> Result<Vec<u8>> {
        let (header, payload) = self.block_at(block_ref.archive_offset)?;
        let decoded = decode_block(&header, &payload, self.opts.key.as_ref())?;

        if block_ref.is_solid_slice() {
            let start = block_ref.intra_offset as usize;
            let end = start + block_ref.intra_length as usize;
            if end > decoded.len() {
                return Err(Error::OutOfRange(format!(
                    "solid intra range {start}..{end} exceeds decompressed size {}",
                    decoded.len()
                )));
            }
            Ok(decoded[start..end].to_vec())
        } else {
            Ok(decoded)
        }
    }

    /// Plaintext length a ref contributes, without decoding the payload.
    ///
    /// Solid slices carry their length in the ref; DATA refs cost one
    /// 84-byte header read.
    fn ref_plain_len(&mut self, block_ref: &BlockRef) -> Result<u64> {
        if block_ref.is_solid_slice() {
            return Ok(block_ref.intra_length);
        }
        Ok(self.header_at(block_ref.archive_offset)?.orig_size as u64)
    }

    /// Return the complete contents of a file by record id
    pub fn read_file_by_id(&mut self, id: u32) -> Result<Vec<u8>> {
        let record = self.record_by_id(id)?;
        let refs = record.block_refs.clone();
        let mut out = Vec::with_capacity(record.original_size as usize);

        for block_ref in &refs {
            out.extend_from_slice(&self.decode_ref(block_ref)?);
        }
        Ok(out)
    }

    /// Return the complete contents of a file by name
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let id = self
            .index
            .find(name)
            .ok_or_else(|| Error::NotFound(name.to_owned()))?
            .id;
        self.read_file_by_id(id)
    }

    /// Random-access read spanning block boundaries.
    ///
    /// Fills `buf` starting at `offset` within the file. Prefix sums over
    /// the per-ref plaintext lengths select the overlapping blocks; only
    /// those are decoded. Returns the number of bytes copied, which is
    /// short only at end of file.
    pub fn read_at(&mut self, id: u32, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let record = self.record_by_id(id)?;
        if offset >= record.original_size || buf.is_empty() {
            return Ok(0);
        }
        let refs = record.block_refs.clone();

        let want_end = offset + buf.len() as u64;
        let mut file_pos = 0u64;
        let mut written = 0usize;

        for block_ref in &refs {
            if written == buf.len() || file_pos >= want_end {
                break;
            }

            let len = self.ref_plain_len(block_ref)?;
            let block_end = file_pos + len;

            // Entirely before the requested range: one header read, no decode.
            if block_end <= offset {
                file_pos = block_end;
                continue;
            }

            let block = self.decode_ref(block_ref)?;
            let start_in_block = offset.saturating_sub(file_pos) as usize;
            let to_copy = (buf.len() - written).min(block.len() - start_in_block);
            buf[written..written + to_copy]
                .copy_from_slice(&block[start_in_block..start_in_block + to_copy]);

            written += to_copy;
            file_pos = block_end;
        }

        Ok(written)
    }

    /// Reconstruct the file list from block headers alone, bypassing the
    /// INDEX block. See [`crate::recovery::scan`].
    pub fn scan_blocks(&mut self) -> Result<FileIndex> {
        let report = crate::recovery::scan(
            &mut self.reader,
            &crate::recovery::ScanOptions::default(),
            None,
        )?;
        Ok(report.index)
    }
}

/// Skip any header extension bytes, then read exactly `comp_size` payload
/// bytes, reporting how much was actually available on truncation.
fn read_block_payload<R: Read + Seek>(reader: &mut R, header: &BlockHeader) -> Result<Vec<u8>> {
    let extension = header.header_size as i64 - BLOCK_HEADER_SIZE as i64;
    if extension > 0 {
        reader.seek(SeekFrom::Current(extension))?;
    }

    let declared = header.comp_size as usize;
    let mut payload = vec![0u8; declared];
    let mut filled = 0usize;
    while filled < declared {
        match reader.read(&mut payload[filled..]) {
            Ok(0) => {
                return Err(Error::Truncated {
                    declared: declared as u64,
                    available: filled as u64,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{ArchiveWriter, WriterConfig};
    use std::io::Cursor;

    fn build_archive(files: &[(&str, Vec<u8>)], config: WriterConfig) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        let mut writer = ArchiveWriter::with_config(&mut buf, config).unwrap();
        for (name, data) in files {
            writer.add_file(name, data).unwrap();
        }
        writer.finalize().unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_open_and_read() {
        let bytes = build_archive(
            &[("hello.txt", b"Hello, world!".to_vec())],
            WriterConfig::default(),
        );

        let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.read_file("hello.txt").unwrap(), b"Hello, world!");
        assert!(matches!(
            reader.read_file("missing.txt"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_unfinalized_archive_refused() {
        let mut buf = Cursor::new(Vec::new());
        let mut writer = ArchiveWriter::new(&mut buf).unwrap();
        writer.add_file("partial.bin", &[7u8; 2048]).unwrap();
        // No finalize: the superblock is still the zeroed placeholder.
        let bytes = buf.into_inner();

        assert!(matches!(
            ArchiveReader::new(Cursor::new(bytes)),
            Err(Error::Magic)
        ));
    }

    #[test]
    fn test_read_at_within_single_block() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let bytes = build_archive(&[("seq.bin", data.clone())], WriterConfig::default());

        let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
        let mut out = [0u8; 100];
        let n = reader.read_at(0, 1000, &mut out).unwrap();

        assert_eq!(n, 100);
        assert_eq!(&out[..], &data[1000..1100]);
    }

    #[test]
    fn test_read_at_past_eof() {
        let bytes = build_archive(&[("small.bin", vec![1u8; 64])], WriterConfig::default());

        let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
        let mut out = [0u8; 16];
        assert_eq!(reader.read_at(0, 64, &mut out).unwrap(), 0);
        assert_eq!(reader.read_at(0, 1000, &mut out).unwrap(), 0);

        // Short read at the tail.
        let n = reader.read_at(0, 60, &mut out).unwrap();
        assert_eq!(n, 4);
    }

    #[test]
    fn test_max_orig_size_gate() {
        let bytes = build_archive(&[("big.bin", vec![9u8; 8192])], WriterConfig::default());

        let mut reader = ArchiveReader::with_options(
            Cursor::new(bytes),
            ReaderOptions::default().with_max_orig_size(1024),
        )
        .unwrap();

        assert!(matches!(
            reader.read_file("big.bin"),
            Err(Error::OutOfRange(_))
        ));
    }

    #[test]
    fn test_truncated_payload_reported() {
        let mut bytes = build_archive(&[("f.bin", vec![3u8; 4096])], WriterConfig::default());
        // Chop mid-payload of the first DATA block.
        bytes.truncate(crate::SUPERBLOCK_SIZE + BLOCK_HEADER_SIZE + 4);

        let mut cursor = Cursor::new(bytes);
        cursor
            .seek(SeekFrom::Start(crate::SUPERBLOCK_SIZE as u64))
            .unwrap();
        let header = BlockHeader::read_from(&mut cursor).unwrap();
        let err = read_block_payload(&mut cursor, &header).unwrap_err();

        assert!(matches!(err, Error::Truncated { available: 4, .. }));
    }
}
