//! File index: the serialized catalog, reconstructible by block scan
//!
//! The index is a JSON document with two top-level fields: `records` and
//! `root_hash`. It is Zstd-compressed and written as the INDEX block, never
//! encrypted, so listing an archive and enumerating its codec requirements
//! work without the password.
//!
//! `root_hash` is BLAKE3 over the concatenation of every `content_hash` in
//! record order, block order. Whole-archive verification against it needs
//! no payload reads.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sixcy_hash::Hasher;

use crate::{Error, Result};

/// Pointer from a file record to a block, optionally narrowing to a
/// sub-range of a SOLID block's decompressed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRef {
    /// BLAKE3 of the referenced block's plaintext
    pub content_hash: [u8; 32],
    /// Byte offset of the block header in the archive
    pub archive_offset: u64,
    /// Start of this file's range within a SOLID block's plaintext
    #[serde(default)]
    pub intra_offset: u64,
    /// Length of the range; zero for DATA blocks
    #[serde(default)]
    pub intra_length: u64,
}

impl BlockRef {
    /// Whether this ref carves a range out of a SOLID block
    #[inline]
    pub fn is_solid_slice(&self) -> bool {
        self.intra_length > 0
    }
}

/// One file's entry in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// File identifier, dense from zero in creation order
    pub id: u32,
    /// Parent directory id (zero at the root)
    pub parent_id: u32,
    /// File name
    pub name: String,
    /// Ordered block pointers covering the file
    #[serde(default)]
    pub block_refs: Vec<BlockRef>,
    /// Legacy pre-v3 field: bare header offsets instead of `block_refs`.
    /// Accepted on read for interoperability, never written.
    #[serde(default, skip_serializing)]
    pub offsets: Vec<u64>,
    /// Plaintext size in bytes
    pub original_size: u64,
    /// Sum of on-disk payload sizes
    pub compressed_size: u64,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Set when this record was built from legacy `offsets`: its refs carry
    /// zeroed content hashes, so integrity degrades to header CRC only.
    #[serde(skip)]
    pub degraded: bool,
}

impl FileRecord {
    /// Build a record from scan results, with a synthesized name
    pub fn from_scan(file_id: u32, original_size: u64, refs: Vec<BlockRef>) -> Self {
        Self {
            id: file_id,
            parent_id: 0,
            name: format!("file_{file_id:08x}"),
            block_refs: refs,
            offsets: Vec::new(),
            original_size,
            compressed_size: 0,
            metadata: HashMap::new(),
            degraded: false,
        }
    }

    /// Convert legacy `offsets` into stub refs with zeroed hashes.
    ///
    /// Marks the record degraded; callers in strict mode reject it.
    fn normalize_legacy(&mut self) {
        if self.block_refs.is_empty() && !self.offsets.is_empty() {
            self.block_refs = self
                .offsets
                .drain(..)
                .map(|archive_offset| BlockRef {
                    content_hash: [0u8; 32],
                    archive_offset,
                    intra_offset: 0,
                    intra_length: 0,
                })
                .collect();
            self.degraded = true;
        }
    }
}

/// The complete file catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileIndex {
    /// File records in creation order
    pub records: Vec<FileRecord>,
    /// BLAKE3 over all block content hashes, record order, block order
    pub root_hash: [u8; 32],
}

impl FileIndex {
    /// Serialize to the JSON wire form
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::IndexParse(e.to_string()))
    }

    /// Parse the JSON wire form, applying the legacy `offsets` shim
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut index: FileIndex =
            serde_json::from_slice(bytes).map_err(|e| Error::IndexParse(e.to_string()))?;
        for record in &mut index.records {
            record.normalize_legacy();
        }
        Ok(index)
    }

    /// Whether any record was reconstructed from the legacy shim
    pub fn has_degraded_records(&self) -> bool {
        self.records.iter().any(|r| r.degraded)
    }

    /// Recompute `root_hash` from the current records
    pub fn compute_root_hash(&mut self) {
        let mut hasher = Hasher::new();
        for record in &self.records {
            for block_ref in &record.block_refs {
                hasher.update(&block_ref.content_hash);
            }
        }
        self.root_hash = hasher.finalize();
    }

    /// Look up a record by file name
    pub fn find(&self, name: &str) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Look up a record by id
    pub fn find_by_id(&self, id: u32) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.id == id)
    }
}
