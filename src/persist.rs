//! Disk I/O helpers: load a JSON document and write it back atomically.
//!
//! The rename-over approach is close to atomic on most platforms. On FAT32
//! or network shares there are no hard guarantees.

use crate::codec::Codec;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Reads and decodes the file at `path`. A missing or empty file yields
/// `T::default()` rather than an error.
pub fn load<T, C>(path: &Path, codec: &C) -> Result<T>
where
    T: DeserializeOwned + Default,
    C: Codec,
{
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(Error::Io(format!("{}: {e}", path.display()))),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    codec.decode(&bytes)
}

/// Write `bytes` to a temp file next to `path` and then rename it over
/// `path`, creating the parent directory first if needed. A crash mid-write
/// leaves the old file intact. Every call gets its own temp name
/// (`<file>.<pid>-<seq>.tmp`), so concurrent writers never share one.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::Io(e.to_string()))?;
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("{ext}.{}-{seq}.tmp", std::process::id()));
    let written = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Io(format!("{}: {e}", path.display())));
    }
    Ok(())
}
