//! Process-global codec registry
//!
//! Maps codec UUID to a dispatchable [`Codec`]. Seeded with the five
//! built-ins on first touch; plugins are added through [`register_plugin`]
//! during startup. After initialization the registry is read-only, so
//! lookups from concurrent decoders never contend with writers.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::info;

use crate::builtin::builtin_codec;
use crate::id::{uuid_to_string, CodecId};
use crate::plugin::{CodecPluginDesc, PluginCodec};
use crate::{Codec, Error, Result};

static REGISTRY: OnceLock<RwLock<HashMap<[u8; 16], Arc<dyn Codec>>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<[u8; 16], Arc<dyn Codec>>> {
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<[u8; 16], Arc<dyn Codec>> = HashMap::new();
        for id in [
            CodecId::None,
            CodecId::Zstd,
            CodecId::Lz4,
            CodecId::Brotli,
            CodecId::Lzma,
        ] {
            map.insert(id.uuid(), Arc::from(builtin_codec(id)));
        }
        RwLock::new(map)
    })
}

/// Resolve a UUID to its codec.
///
/// # Errors
///
/// Returns [`Error::UnknownCodec`] if the UUID is not registered. There is
/// no fallback; the caller must not substitute another codec.
pub fn lookup(uuid: &[u8; 16]) -> Result<Arc<dyn Codec>> {
    registry()
        .read()
        .get(uuid)
        .cloned()
        .ok_or_else(|| Error::UnknownCodec {
            uuid: uuid_to_string(uuid),
        })
}

/// Check whether a UUID resolves without taking a reference.
///
/// Used by the superblock open gate and by recovery scans.
pub fn is_available(uuid: &[u8; 16]) -> bool {
    registry().read().contains_key(uuid)
}

/// Register a plugin codec from its frozen C ABI descriptor.
///
/// Built-ins shadow plugins: a descriptor whose UUID collides with any
/// existing entry (built-in or plugin) is rejected at load time.
///
/// # Errors
///
/// - [`Error::AbiVersion`] if the descriptor declares a newer ABI
/// - [`Error::IncompletePlugin`] if any function pointer is missing
/// - [`Error::DuplicateCodec`] on a UUID collision
pub fn register_plugin(desc: &'static CodecPluginDesc) -> Result<()> {
    let codec = PluginCodec::new(desc)?;
    let uuid = codec.uuid();

    let mut map = registry().write();
    if map.contains_key(&uuid) {
        return Err(Error::DuplicateCodec {
            uuid: uuid_to_string(&uuid),
        });
    }

    info!(
        uuid = %uuid_to_string(&uuid),
        short_id = desc.short_id,
        "registered plugin codec"
    );
    map.insert(uuid, Arc::new(codec));
    Ok(())
}
