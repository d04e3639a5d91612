use crate::error::{FrameshotError, Result};
use crate::woff;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

static FONT_BYTES_CACHE: OnceLock<Mutex<HashMap<PathBuf, Arc<Vec<u8>>>>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FontContainer {
    Sfnt,
    Woff,
    Woff2,
}

pub(crate) fn detect_container(data: &[u8]) -> FontContainer {
    let signature = data
        .get(0..4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or(0);
    match signature {
        woff::WOFF_SIGNATURE => FontContainer::Woff,
        woff::WOFF2_SIGNATURE => FontContainer::Woff2,
        _ => FontContainer::Sfnt,
    }
}

/// Raw sfnt bytes for `data`, unwrapping web font containers.
pub(crate) fn decode_font_container(data: Vec<u8>) -> std::result::Result<Vec<u8>, String> {
    match detect_container(&data) {
        FontContainer::Sfnt => Ok(data),
        FontContainer::Woff => woff::decode_woff(&data),
        FontContainer::Woff2 => woff::decode_woff2(&data),
    }
}

/// Reads and decodes the font at `path`, caching the result for the life of the process.
pub fn load_font_bytes(path: &Path) -> Result<Arc<Vec<u8>>> {
    let cache = FONT_BYTES_CACHE.get_or_init(|| Mutex::new(HashMap::new()));

    if let Ok(guard) = cache.lock() {
        if let Some(bytes) = guard.get(path) {
            log::trace!("font cache hit: {}", path.display());
            return Ok(bytes.clone());
        }
    }
    log::trace!("font cache miss: {}", path.display());

    let raw = std::fs::read(path).map_err(|err| FrameshotError::font_load(path, err.to_string()))?;
    let decoded = decode_font_container(raw).map_err(|message| FrameshotError::font_load(path, message))?;
    let decoded = Arc::new(decoded);

    match cache.lock() {
        Ok(mut guard) => Ok(guard
            .entry(path.to_path_buf())
            .or_insert(decoded)
            .clone()),
        Err(_) => Ok(decoded),
    }
}
