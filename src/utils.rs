//! Small filesystem helpers shared across the crate.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ArkiError, Result};

/// Create the parent directory of `path` if it does not exist yet.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ArkiError::io(parent, e))?;
    }
    Ok(())
}

/// Unique-enough temporary sibling of `path`, in the same directory so that
/// the final rename stays on one filesystem.
fn temp_sibling(path: &Path) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    let name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!(".{name}.tmp{pid}.{n}"))
}

/// Write a file atomically: the content lands in a temporary sibling which
/// is fsynced and renamed over the destination. Readers see either the old
/// or the new content, never a partial write.
pub fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    let tmp = temp_sibling(path);
    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp).map_err(|e| ArkiError::io(&tmp, e))?;
        file.write_all(content).map_err(|e| ArkiError::io(&tmp, e))?;
        file.sync_all().map_err(|e| ArkiError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| ArkiError::io(path, e))?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Remove a file, treating "not found" as success.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ArkiError::io(path, e)),
    }
}

/// File size, or `None` if the file does not exist.
pub fn file_size(path: &Path) -> Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ArkiError::io(path, e)),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
