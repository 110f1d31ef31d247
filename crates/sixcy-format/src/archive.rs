//! High-level [`Archive`] handle, the primary embedding surface
//!
//! Owns the backing file and wraps either a writer or a reader. Password
//! handling lives here: the archive UUID is the KDF salt, so opening an
//! encrypted archive pre-reads the superblock, derives the key, then hands
//! it to the reader.
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

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sixcy_codec::CodecId;
use uuid::Uuid;

use crate::index::{FileIndex, FileRecord};
use crate::reader::{ArchiveReader, ReaderOptions};
use crate::recovery::{self, RecoveryReport};
use crate::superblock::Superblock;
use crate::writer::{ArchiveWriter, WriterConfig};
use crate::{Error, Result};

/// Lightweight descriptor returned by [`Archive::list`]
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// File identifier
    pub id: u32,
    /// File name
    pub name: String,
    /// Plaintext size in bytes
    pub original_size: u64,
    /// Sum of on-disk payload sizes
    pub compressed_size: u64,
    /// Number of block refs covering the file
    pub block_count: usize,
    /// Content hash of the first block, when the file has one
    pub first_block_hash: Option<[u8; 32]>,
}

impl From<&FileRecord> for FileInfo {
    fn from(record: &FileRecord) -> Self {
        FileInfo {
            id: record.id,
            name: record.name.clone(),
            original_size: record.original_size,
            compressed_size: record.compressed_size,
            block_count: record.block_refs.len(),
            first_block_hash: record.block_refs.first().map(|r| r.content_hash),
        }
    }
}

enum ArchiveMode {
    Read(ArchiveReader<File>),
    Write(Box<ArchiveWriter<File>>),
}

/// An open `.6cy` archive, in either read or write mode
pub struct Archive {
    path: PathBuf,
    mode: ArchiveMode,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive").field("path", &self.path).finish()
    }
}

impl Archive {
    /// Create a new archive for writing
    pub fn create<P: AsRef<Path>>(path: P, config: WriterConfig) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let writer = ArchiveWriter::with_config(File::create(&path)?, config)?;
        Ok(Self {
            path,
            mode: ArchiveMode::Write(Box::new(writer)),
        })
    }

    /// Open an unencrypted archive for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ReaderOptions::default())
    }

    /// Open an encrypted archive for reading.
    ///
    /// The key is Argon2id(password, salt = archive UUID); the UUID comes
    /// from a superblock pre-read. A wrong password surfaces as
    /// [`Error::AuthFailed`] on the first block decode, before any
    /// plaintext materializes.
    pub fn open_encrypted<P: AsRef<Path>>(path: P, password: &str) -> Result<Self> {
        let path = path.as_ref();
        let superblock = Superblock::read_from(File::open(path)?)?;
        let key = sixcy_crypto::derive_key(password, superblock.archive_uuid.as_bytes())?;
        Self::open_with(path, ReaderOptions::default().with_key(key))
    }

    /// Open an archive with explicit reader options
    pub fn open_with<P: AsRef<Path>>(path: P, opts: ReaderOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let reader = ArchiveReader::with_options(File::open(&path)?, opts)?;
        Ok(Self {
            path,
            mode: ArchiveMode::Read(reader),
        })
    }

    fn writer(&mut self) -> Result<&mut ArchiveWriter<File>> {
        match &mut self.mode {
            ArchiveMode::Write(w) => Ok(w),
            ArchiveMode::Read(_) => Err(Error::State("archive is open read-only")),
        }
    }

    fn reader(&mut self) -> Result<&mut ArchiveReader<File>> {
        match &mut self.mode {
            ArchiveMode::Read(r) => Ok(r),
            ArchiveMode::Write(_) => Err(Error::State("archive is open write-only")),
        }
    }

    /// Add a file using the writer's default codec and level
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.writer()?.add_file(name, data)
    }

    /// Add a file with an explicit codec and level
    pub fn add_file_with_codec(
        &mut self,
        name: &str,
        data: &[u8],
        codec: CodecId,
        level: i32,
    ) -> Result<()> {
        self.writer()?.add_file_with(name, data, codec, level)
    }

    /// Begin a solid session: subsequent files share one SOLID block
    pub fn begin_solid(&mut self, codec: CodecId) -> Result<()> {
        self.writer()?.begin_solid(codec)
    }

    /// End the solid session, emitting the SOLID block
    pub fn end_solid(&mut self) -> Result<()> {
        self.writer()?.end_solid()
    }

    /// Write the INDEX block and recovery map, then patch the superblock
    pub fn finalize(&mut self) -> Result<()> {
        self.writer()?.finalize()
    }

    /// List all files in the archive
    pub fn list(&self) -> Vec<FileInfo> {
        let records = match &self.mode {
            ArchiveMode::Read(r) => &r.index().records,
            ArchiveMode::Write(w) => &w.index().records,
        };
        records.iter().map(FileInfo::from).collect()
    }

    /// Look up one file's descriptor by name
    pub fn stat(&self, name: &str) -> Option<FileInfo> {
        let records = match &self.mode {
            ArchiveMode::Read(r) => &r.index().records,
            ArchiveMode::Write(w) => &w.index().records,
        };
        records.iter().find(|r| r.name == name).map(FileInfo::from)
    }

    /// Read a whole file by name
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        self.reader()?.read_file(name)
    }

    /// Random-access read: fill `buf` from `offset` within the named file.
    ///
    /// Returns the number of bytes copied; short only at end of file.
    pub fn read_at(&mut self, name: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let id = self
            .stat(name)
            .ok_or_else(|| Error::NotFound(name.to_owned()))?
            .id;
        self.reader()?.read_at(id, offset, buf)
    }

    /// Extract every file into `dest`, creating directories as needed
    pub fn extract_all<P: AsRef<Path>>(&mut self, dest: P) -> Result<()> {
        let dest = dest.as_ref();
        std::fs::create_dir_all(dest)?;

        let entries: Vec<(u32, String)> = self.list().into_iter().map(|f| (f.id, f.name)).collect();
        for (id, name) in entries {
            let data = self.reader()?.read_file_by_id(id)?;
            let target = dest.join(&name);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            File::create(target)?.write_all(&data)?;
        }
        Ok(())
    }

    /// Reconstruct the file list from block headers, bypassing the INDEX
    pub fn scan_blocks(&mut self) -> Result<FileIndex> {
        self.reader()?.scan_blocks()
    }

    /// Scan a possibly damaged archive without opening it.
    ///
    /// Works on archives whose superblock or INDEX never made it to disk;
    /// see [`recovery::scan_file`].
    pub fn scan_damaged<P: AsRef<Path>>(path: P) -> Result<RecoveryReport> {
        recovery::scan_file(path.as_ref())
    }

    /// Full recovery: verify every block of `src` and re-emit the healthy
    /// DATA blocks into a fresh archive at `dst`.
    ///
    /// If `password` is given and the source superblock is still readable,
    /// encrypted payloads are verified and extracted with the derived key.
    pub fn extract_recoverable<P: AsRef<Path>, Q: AsRef<Path>>(
        src: P,
        dst: Q,
        password: Option<&str>,
    ) -> Result<RecoveryReport> {
        let mut src_file = File::open(src.as_ref())?;

        let key = match password {
            Some(password) => {
                let superblock = Superblock::read_from(&mut src_file).ok();
                src_file.seek(SeekFrom::Start(0))?;
                match superblock {
                    Some(sb) => Some(sixcy_crypto::derive_key(
                        password,
                        sb.archive_uuid.as_bytes(),
                    )?),
                    // Superblock unreadable: the salt is gone, decrypting is
                    // impossible, recover the unencrypted blocks only.
                    None => None,
                }
            }
            None => None,
        };

        let mut dst_file = File::create(dst.as_ref())?;
        recovery::extract_recoverable(&mut src_file, &mut dst_file, key.as_ref())
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The archive UUID
    pub fn uuid(&self) -> Uuid {
        match &self.mode {
            ArchiveMode::Read(r) => r.superblock().archive_uuid,
            ArchiveMode::Write(w) => w.superblock().archive_uuid,
        }
    }

    /// The index root hash (valid in write mode only after finalize)
    pub fn root_hash(&self) -> [u8; 32] {
        match &self.mode {
            ArchiveMode::Read(r) => r.root_hash(),
            ArchiveMode::Write(w) => w.index().root_hash,
        }
    }

    /// The root hash as lowercase hex
    pub fn root_hash_hex(&self) -> String {
        hex::encode(self.root_hash())
    }
}
