//! Built-in codec implementations
//!
//! Levels are codec-defined: Zstd accepts 1..=19 (default 3), Brotli clamps
//! to 0..=11, LZ4 and LZMA ignore the level, and None stores verbatim.

use std::io::{Read, Write};

use crate::id::{CodecId, UUID_BROTLI, UUID_LZ4, UUID_LZMA, UUID_NONE, UUID_ZSTD};
use crate::{Codec, Error, Result};

/// Default Zstd compression level
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Verbatim storage
#[derive(Debug)]
pub struct NoneCodec;

impl Codec for NoneCodec {
    fn uuid(&self) -> [u8; 16] {
        UUID_NONE
    }

    fn compress(&self, data: &[u8], _level: i32) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], _out_capacity: usize) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn compress_bound(&self, in_len: usize) -> usize {
        in_len
    }
}

/// Zstandard codec, levels 1..=19
#[derive(Debug)]
pub struct ZstdCodec;

impl Codec for ZstdCodec {
    fn uuid(&self) -> [u8; 16] {
        UUID_ZSTD
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        let level = if level == 0 {
            DEFAULT_ZSTD_LEVEL
        } else {
            level.clamp(1, 19)
        };
        zstd::bulk::compress(data, level).map_err(|e| Error::Compress(e.to_string()))
    }

    fn decompress(&self, data: &[u8], out_capacity: usize) -> Result<Vec<u8>> {
        zstd::bulk::decompress(data, out_capacity).map_err(|e| Error::Decompress(e.to_string()))
    }

    fn compress_bound(&self, in_len: usize) -> usize {
        zstd::zstd_safe::compress_bound(in_len)
    }
}

/// LZ4 codec (size-prepended block format); level is ignored
#[derive(Debug)]
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn uuid(&self) -> [u8; 16] {
        UUID_LZ4
    }

    fn compress(&self, data: &[u8], _level: i32) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8], _out_capacity: usize) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data).map_err(|e| Error::Decompress(e.to_string()))
    }

    fn compress_bound(&self, in_len: usize) -> usize {
        // 4 bytes for the prepended size.
        lz4_flex::block::get_maximum_output_size(in_len) + 4
    }
}

/// Brotli codec; quality = level clamped to 0..=11
#[derive(Debug)]
pub struct BrotliCodec;

/// Brotli stream buffer size
const BROTLI_BUF: usize = 4096;
/// Brotli window size (lgwin)
const BROTLI_LGWIN: u32 = 22;

impl Codec for BrotliCodec {
    fn uuid(&self) -> [u8; 16] {
        UUID_BROTLI
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        let quality = level.clamp(0, 11) as u32;
        let mut out = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut out, BROTLI_BUF, quality, BROTLI_LGWIN);
            w.write_all(data)
                .map_err(|e| Error::Compress(e.to_string()))?;
        }
        Ok(out)
    }

    fn decompress(&self, data: &[u8], out_capacity: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(out_capacity);
        brotli::Decompressor::new(data, BROTLI_BUF)
            .read_to_end(&mut out)
            .map_err(|e| Error::Decompress(e.to_string()))?;
        Ok(out)
    }

    fn compress_bound(&self, in_len: usize) -> usize {
        in_len + (in_len >> 2) + 1024
    }
}

/// LZMA codec; level is ignored
#[derive(Debug)]
pub struct LzmaCodec;

impl Codec for LzmaCodec {
    fn uuid(&self) -> [u8; 16] {
        UUID_LZMA
    }

    fn compress(&self, data: &[u8], _level: i32) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        lzma_rs::lzma_compress(&mut std::io::Cursor::new(data), &mut out)
            .map_err(|e| Error::Compress(e.to_string()))?;
        Ok(out)
    }

    fn decompress(&self, data: &[u8], out_capacity: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(out_capacity);
        lzma_rs::lzma_decompress(&mut std::io::Cursor::new(data), &mut out)
            .map_err(|e| Error::Decompress(e.to_string()))?;
        Ok(out)
    }

    fn compress_bound(&self, in_len: usize) -> usize {
        in_len + (in_len >> 1) + 4096
    }
}

/// Instantiate the built-in codec for `id`
pub fn builtin_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::None => Box::new(NoneCodec),
        CodecId::Zstd => Box::new(ZstdCodec),
        CodecId::Lz4 => Box::new(Lz4Codec),
        CodecId::Brotli => Box::new(BrotliCodec),
        CodecId::Lzma => Box::new(LzmaCodec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CodecId; 5] = [
        CodecId::None,
        CodecId::Zstd,
        CodecId::Lz4,
        CodecId::Brotli,
        CodecId::Lzma,
    ];

    #[test]
    fn test_roundtrip_all_builtins() {
        let data = b"The quick brown fox jumps over the lazy dog. ".repeat(64);

        for id in ALL {
            let codec = builtin_codec(id);
            let compressed = codec.compress(&data, 3).unwrap();
            let decompressed = codec.decompress(&compressed, data.len()).unwrap();
            assert_eq!(decompressed, data, "roundtrip failed for {}", id.name());
        }
    }

    #[test]
    fn test_empty_input() {
        for id in ALL {
            let codec = builtin_codec(id);
            let compressed = codec.compress(&[], 3).unwrap();
            let decompressed = codec.decompress(&compressed, 0).unwrap();
            assert!(decompressed.is_empty());
        }
    }

    #[test]
    fn test_bound_covers_output() {
        // Incompressible input is the worst case for the bound.
        let data: Vec<u8> = (0..16384u32).map(|i| (i.wrapping_mul(2654435761) >> 24) as u8).collect();

        for id in ALL {
            let codec = builtin_codec(id);
            let compressed = codec.compress(&data, 9).unwrap();
            assert!(
                compressed.len() <= codec.compress_bound(data.len()),
                "bound too small for {}",
                id.name()
            );
        }
    }

    #[test]
    fn test_zstd_level_clamped() {
        let data = vec![0x42u8; 4096];
        let codec = ZstdCodec;

        // Out-of-range levels are clamped, not rejected.
        let lo = codec.compress(&data, -100).unwrap();
        let hi = codec.compress(&data, 100).unwrap();

        assert_eq!(codec.decompress(&lo, data.len()).unwrap(), data);
        assert_eq!(codec.decompress(&hi, data.len()).unwrap(), data);
    }

    #[test]
    fn test_brotli_quality_clamped() {
        let data = vec![0x42u8; 4096];
        let codec = BrotliCodec;

        let compressed = codec.compress(&data, 99).unwrap();
        assert_eq!(codec.decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_zstd_corrupt_input_fails() {
        let codec = ZstdCodec;
        assert!(codec.decompress(b"definitely not zstd", 64).is_err());
    }
}
