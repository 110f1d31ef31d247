//! Frozen C ABI for codec plugins
//!
//! A plugin ships a `#[repr(C)]` descriptor with its frozen UUID, an
//! optional short alias, the ABI version it was compiled against, and three
//! function pointers. The descriptor is returned by a single exported entry
//! point that is idempotent and yields a process-lifetime static address.
//!
//! Stability contract, frozen at version 1:
//! - the ABI version only ever increases;
//! - new fields are appended at the end of the descriptor, never inserted;
//! - existing field offsets and calling conventions never change;
//! - the host rejects descriptors declaring a newer ABI than it knows.
//!
//! Plugin functions must be reentrant: safe to call concurrently on
//! disjoint, non-overlapping buffer pairs. No allocator is shared; the host
//! owns every buffer and sizes output buffers from `compress_bound`.

use crate::{Codec, Error, Result};

/// ABI version understood by this host
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Return codes for plugin compress/decompress functions
pub mod rc {
    /// Success; `*out_len` holds the number of bytes written
    pub const OK: i32 = 0;
    /// Output buffer too small; retry with a larger buffer
    pub const OVERFLOW: i32 = -1;
    /// Input data is corrupt or truncated
    pub const CORRUPT: i32 = -2;
    /// Codec-internal error
    pub const INTERNAL: i32 = -3;
}

/// Compress function signature.
///
/// On entry `*out_len` is the capacity of `out_buf`; on [`rc::OK`] it is
/// the number of bytes written.
pub type CompressFn = unsafe extern "C" fn(
    in_buf: *const u8,
    in_len: u32,
    out_buf: *mut u8,
    out_len: *mut u32,
    level: i32,
) -> i32;

/// Decompress function signature; same `out_len` convention as [`CompressFn`]
pub type DecompressFn =
    unsafe extern "C" fn(in_buf: *const u8, in_len: u32, out_buf: *mut u8, out_len: *mut u32) -> i32;

/// Upper bound on compressed size for `in_len` input bytes.
///
/// Must be pure: deterministic, no side effects, callable from any thread.
pub type CompressBoundFn = unsafe extern "C" fn(in_len: u32) -> u32;

/// Frozen C ABI descriptor for a codec plugin.
///
/// `#[repr(C)]` layout is mandatory; fields are never reordered.
#[repr(C)]
#[derive(Debug)]
pub struct CodecPluginDesc {
    /// 16-byte codec UUID in little-endian field order, the on-disk identity
    pub uuid: [u8; 16],

    /// Optional in-process alias; 0 means none assigned. Never written to disk.
    pub short_id: u32,

    /// ABI version the plugin was compiled against
    pub abi_version: u32,

    /// Compress entry point
    pub compress: Option<CompressFn>,

    /// Decompress entry point
    pub decompress: Option<DecompressFn>,

    /// Output-size upper bound entry point
    pub compress_bound: Option<CompressBoundFn>,
}

// The ABI contract declares all function pointers reentrant and free of
// global mutable state.
unsafe impl Send for CodecPluginDesc {}
unsafe impl Sync for CodecPluginDesc {}

/// Safe wrapper around a loaded plugin descriptor.
///
/// Validates the descriptor once at construction; afterwards it behaves as
/// any other [`Codec`] in the registry.
#[derive(Debug)]
pub struct PluginCodec {
    desc: &'static CodecPluginDesc,
    compress: CompressFn,
    decompress: DecompressFn,
    compress_bound: CompressBoundFn,
}

impl PluginCodec {
    /// Wrap a static descriptor after validating ABI version and entry points.
    pub fn new(desc: &'static CodecPluginDesc) -> Result<Self> {
        if desc.abi_version > PLUGIN_ABI_VERSION {
            return Err(Error::AbiVersion {
                found: desc.abi_version,
                supported: PLUGIN_ABI_VERSION,
            });
        }
        let (Some(compress), Some(decompress), Some(compress_bound)) =
            (desc.compress, desc.decompress, desc.compress_bound)
        else {
            return Err(Error::IncompletePlugin);
        };
        Ok(Self {
            desc,
            compress,
            decompress,
            compress_bound,
        })
    }

    /// The plugin's short alias, if one is assigned
    pub fn short_id(&self) -> u32 {
        self.desc.short_id
    }

    fn check_len(len: usize) -> Result<u32> {
        u32::try_from(len).map_err(|_| Error::Compress("input exceeds 4 GiB ABI limit".into()))
    }
}

impl Codec for PluginCodec {
    fn uuid(&self) -> [u8; 16] {
        self.desc.uuid
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        let in_len = Self::check_len(data.len())?;
        let cap = self.compress_bound(data.len());
        let mut out = vec![0u8; cap];
        let mut out_len = Self::check_len(cap)?;

        // SAFETY: buffers are live, sized as annotated, and do not overlap.
        let code = unsafe {
            (self.compress)(data.as_ptr(), in_len, out.as_mut_ptr(), &mut out_len, level)
        };
        match code {
            rc::OK => {
                out.truncate(out_len as usize);
                Ok(out)
            }
            // The buffer was already bound-sized, so the bound is wrong.
            rc::OVERFLOW => Err(Error::Compress("plugin overflowed its own bound".into())),
            rc::CORRUPT => Err(Error::Compress("plugin rejected input as corrupt".into())),
            other => Err(Error::Compress(format!("plugin error code {other}"))),
        }
    }

    fn decompress(&self, data: &[u8], out_capacity: usize) -> Result<Vec<u8>> {
        let in_len = Self::check_len(data.len())?;
        let mut out = vec![0u8; out_capacity];
        let mut out_len = Self::check_len(out_capacity)?;

        // SAFETY: buffers are live, sized as annotated, and do not overlap.
        let code =
            unsafe { (self.decompress)(data.as_ptr(), in_len, out.as_mut_ptr(), &mut out_len) };
        match code {
            rc::OK => {
                out.truncate(out_len as usize);
                Ok(out)
            }
            rc::OVERFLOW => Err(Error::Overflow),
            rc::CORRUPT => Err(Error::Decompress("plugin rejected input as corrupt".into())),
            other => Err(Error::Decompress(format!("plugin error code {other}"))),
        }
    }

    fn compress_bound(&self, in_len: usize) -> usize {
        let in_len = u32::try_from(in_len).unwrap_or(u32::MAX);
        // SAFETY: compress_bound is pure per the ABI contract.
        unsafe { (self.compress_bound)(in_len) as usize }
    }
}
