//! Positional segment reads through a process-global descriptor cache.
//!
//! Readers never seek a shared file position: all reads are `pread`-style.
//! Open descriptors are kept in a small LRU so repeated blob reads from the
//! same segment reuse the descriptor; the cache must be invalidated before
//! a segment is rewritten or unlinked. Accounting counters make read
//! patterns observable for tests.

use std::collections::VecDeque;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::{ArkiError, Result};

/// Default number of segment descriptors kept open.
pub const DEFAULT_FD_CACHE_SIZE: usize = 64;

// ── Accounting ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct IoCounters {
    /// Number of positional reads issued.
    pub read_count: AtomicU64,
    /// Total bytes returned to callers.
    pub bytes_read: AtomicU64,
    /// Bytes decompressed and discarded to reach a target offset.
    pub gzip_forward_seek_bytes: AtomicU64,
    /// Times the gzip reader had to jump to a different seek-index block.
    pub gzip_idx_reposition_count: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoSnapshot {
    pub read_count: u64,
    pub bytes_read: u64,
    pub gzip_forward_seek_bytes: u64,
    pub gzip_idx_reposition_count: u64,
}

impl IoCounters {
    pub fn snapshot(&self) -> IoSnapshot {
        IoSnapshot {
            read_count: self.read_count.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            gzip_forward_seek_bytes: self.gzip_forward_seek_bytes.load(Ordering::Relaxed),
            gzip_idx_reposition_count: self.gzip_idx_reposition_count.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.read_count.store(0, Ordering::Relaxed);
        self.bytes_read.store(0, Ordering::Relaxed);
        self.gzip_forward_seek_bytes.store(0, Ordering::Relaxed);
        self.gzip_idx_reposition_count.store(0, Ordering::Relaxed);
    }
}

pub fn counters() -> &'static IoCounters {
    static COUNTERS: OnceLock<IoCounters> = OnceLock::new();
    COUNTERS.get_or_init(IoCounters::default)
}

// ── Descriptor cache ───────────────────────────────────────────────

struct FdCache {
    entries: VecDeque<(PathBuf, Arc<File>)>,
    capacity: usize,
}

impl FdCache {
    fn get(&mut self, path: &Path) -> Option<Arc<File>> {
        let pos = self.entries.iter().position(|(p, _)| p == path)?;
        let entry = self.entries.remove(pos).unwrap();
        let file = entry.1.clone();
        self.entries.push_front(entry);
        Some(file)
    }

    fn insert(&mut self, path: PathBuf, file: Arc<File>) {
        self.entries.push_front((path, file));
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    fn invalidate(&mut self, path: &Path) {
        self.entries.retain(|(p, _)| p != path);
    }
}

fn fd_cache() -> &'static Mutex<FdCache> {
    static CACHE: OnceLock<Mutex<FdCache>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(FdCache {
            entries: VecDeque::new(),
            capacity: DEFAULT_FD_CACHE_SIZE,
        })
    })
}

fn open_cached(path: &Path) -> Result<Arc<File>> {
    let mut cache = fd_cache().lock().unwrap();
    if let Some(file) = cache.get(path) {
        return Ok(file);
    }
    let file = Arc::new(File::open(path).map_err(|e| ArkiError::io(path, e))?);
    cache.insert(path.to_path_buf(), file.clone());
    Ok(file)
}

/// Drop any cached descriptor for `path`. Must be called before the file
/// is truncated, rewritten or unlinked.
pub fn invalidate(path: &Path) {
    fd_cache().lock().unwrap().invalidate(path);
    super::gz::invalidate_cache(path);
}

// ── Reads ──────────────────────────────────────────────────────────

/// Positional read of `[offset, offset+size)` from a plain file.
pub fn read_range(path: &Path, offset: u64, size: u64) -> Result<Vec<u8>> {
    let file = open_cached(path)?;
    let mut buf = vec![0u8; size as usize];
    file.read_exact_at(&mut buf, offset)
        .map_err(|e| ArkiError::io(path, e))?;
    let c = counters();
    c.read_count.fetch_add(1, Ordering::Relaxed);
    c.bytes_read.fetch_add(size, Ordering::Relaxed);
    Ok(buf)
}

/// Read the data of a blob source, resolving the storage layout: plain
/// file, directory of numbered files, or compressed rendition.
pub fn read_blob(path: &Path, format: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
    if path.is_dir() {
        return super::dir::read_record(path, format, offset, size);
    }
    if path.exists() {
        return read_range(path, offset, size);
    }
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    if gz_path.exists() {
        return super::gz::read_range(path, offset, size);
    }
    Err(ArkiError::io(
        path,
        std::io::Error::new(std::io::ErrorKind::NotFound, "segment not found"),
    ))
}

/// Serialises tests that assert on the global I/O counters.
#[cfg(test)]
pub(crate) static TEST_IO_LOCK: Mutex<()> = Mutex::new(());

// ── Tests ──────────────────────────────────────────────────────────
