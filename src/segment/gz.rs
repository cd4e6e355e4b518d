//! Compressed segments: `<name>.gz` plus the `<name>.gz.idx` seek index.
//!
//! The data file is rewritten as a sequence of independent gzip members,
//! each holding a fixed-size group of records. The seek index maps the
//! uncompressed offset of each group start to its compressed offset, plus a
//! final entry with the totals. Reading a range repositions to the greatest
//! group start at or below the target offset, inflates forward, and caches
//! the inflated span so clustered reads do not reinflate.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Mutex, OnceLock};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{ArkiError, Result};
use crate::metadata::Collection;
use crate::utils;

/// Records per gzip member when compressing a segment.
pub const DEFAULT_GROUP_SIZE: usize = 512;

// ── Seek index ─────────────────────────────────────────────────────

/// Parallel arrays of uncompressed/compressed offsets, one entry per group
/// start plus a final totals entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeekIndex {
    pub ofs_unc: Vec<u64>,
    pub ofs_comp: Vec<u64>,
}

impl SeekIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, unc: u64, comp: u64) {
        self.ofs_unc.push(unc);
        self.ofs_comp.push(comp);
    }

    /// Index of the greatest entry with `ofs_unc <= offset`.
    pub fn lookup(&self, offset: u64) -> usize {
        match self.ofs_unc.binary_search(&offset) {
            Ok(pos) => pos,
            Err(0) => 0,
            Err(pos) => pos - 1,
        }
    }

    /// Number of gzip members (the final entry is the totals sentinel).
    pub fn groups(&self) -> usize {
        self.ofs_unc.len().saturating_sub(1)
    }

    /// Read `<data>.gz.idx`; `Ok(None)` if there is no index file.
    pub fn read(path: &Path) -> Result<Option<SeekIndex>> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ArkiError::io(path, e)),
        };
        if raw.len() % 16 != 0 {
            return Err(ArkiError::Format(format!(
                "{}: seek index size {} is not a multiple of 16",
                path.display(),
                raw.len()
            )));
        }
        let mut idx = SeekIndex::new();
        for pair in raw.chunks_exact(16) {
            idx.push(
                u64::from_be_bytes(pair[0..8].try_into().unwrap()),
                u64::from_be_bytes(pair[8..16].try_into().unwrap()),
            );
        }
        Ok(Some(idx))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::with_capacity(self.ofs_unc.len() * 16);
        for (unc, comp) in self.ofs_unc.iter().zip(&self.ofs_comp) {
            buf.extend_from_slice(&unc.to_be_bytes());
            buf.extend_from_slice(&comp.to_be_bytes());
        }
        utils::write_atomically(path, &buf)
    }
}

// ── Compression ────────────────────────────────────────────────────

pub fn gz_path(data_path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.gz", data_path.display()))
}

pub fn idx_path(data_path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.gz.idx", data_path.display()))
}

/// Compress a segment into groups of `group_size` records, writing the
/// `.gz` data and `.gz.idx` seek index, then remove the plain file. The
/// collection provides the record boundaries.
pub fn compress(data_path: &Path, collection: &Collection, group_size: usize) -> Result<()> {
    let group_size = group_size.max(1);
    let mut idx = SeekIndex::new();
    let mut out: Vec<u8> = Vec::new();
    let mut unc_pos: u64 = 0;

    for group in collection.as_slice().chunks(group_size) {
        idx.push(unc_pos, out.len() as u64);
        let mut encoder = GzEncoder::new(&mut out, Compression::default());
        for md in group {
            let data = md.get_data()?;
            std::io::Write::write_all(&mut encoder, &data)
                .map_err(|e| ArkiError::io(data_path, e))?;
            unc_pos += data.len() as u64;
        }
        encoder.finish().map_err(|e| ArkiError::io(data_path, e))?;
    }
    idx.push(unc_pos, out.len() as u64);

    utils::write_atomically(&gz_path(data_path), &out)?;
    idx.write(&idx_path(data_path))?;
    crate::segment::reader::invalidate(data_path);
    utils::remove_if_exists(data_path)?;
    Ok(())
}

/// Inflate the whole compressed segment.
pub fn uncompress_all(data_path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(gz_path(data_path)).map_err(|e| ArkiError::io(data_path, e))?;
    let mut decoder = flate2::read::MultiGzDecoder::new(raw.as_slice());
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ArkiError::io(data_path, e))?;
    Ok(out)
}

// ── Random-access reads ────────────────────────────────────────────

struct CacheEntry {
    idx: SeekIndex,
    /// Uncompressed offset of the cached span.
    base: u64,
    data: Vec<u8>,
}

fn cache() -> &'static Mutex<HashMap<PathBuf, CacheEntry>> {
    static CACHE: OnceLock<Mutex<HashMap<PathBuf, CacheEntry>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(super) fn invalidate_cache(data_path: &Path) {
    cache().lock().unwrap().remove(data_path);
}

/// Read `[offset, offset+size)` from the compressed rendition of
/// `data_path`, repositioning through the seek index as needed.
pub fn read_range(data_path: &Path, offset: u64, size: u64) -> Result<Vec<u8>> {
    let counters = crate::segment::reader::counters();
    let mut cache = cache().lock().unwrap();

    if !cache.contains_key(data_path) {
        let idx = SeekIndex::read(&idx_path(data_path))?.ok_or_else(|| {
            ArkiError::Format(format!(
                "{}: compressed segment has no seek index",
                data_path.display()
            ))
        })?;
        cache.insert(
            data_path.to_path_buf(),
            CacheEntry {
                idx,
                base: 0,
                data: Vec::new(),
            },
        );
    }
    let entry = cache.get_mut(data_path).unwrap();

    let end = offset + size;
    let cached_end = entry.base + entry.data.len() as u64;
    if entry.data.is_empty() || offset < entry.base || end > cached_end {
        // Reposition: inflate the run of groups covering the range.
        if entry.idx.groups() == 0 {
            return Err(ArkiError::Format(format!(
                "{}: empty seek index",
                data_path.display()
            )));
        }
        let first = entry.idx.lookup(offset).min(entry.idx.groups() - 1);
        let mut last = first;
        while last + 1 < entry.idx.groups() && entry.idx.ofs_unc[last + 1] < end {
            last += 1;
        }

        let raw = std::fs::read(gz_path(data_path)).map_err(|e| ArkiError::io(data_path, e))?;
        let comp_start = entry.idx.ofs_comp[first] as usize;
        let comp_end = entry.idx.ofs_comp[last + 1] as usize;
        if comp_end > raw.len() || comp_start > comp_end {
            return Err(ArkiError::Format(format!(
                "{}: seek index points outside the compressed data",
                data_path.display()
            )));
        }

        let mut data = Vec::new();
        let mut slice = &raw[comp_start..comp_end];
        while !slice.is_empty() {
            let mut decoder = GzDecoder::new(slice);
            decoder
                .read_to_end(&mut data)
                .map_err(|e| ArkiError::io(data_path, e))?;
            let consumed = slice.len() - decoder.into_inner().len();
            if consumed == 0 {
                break;
            }
            slice = &slice[consumed..];
        }

        entry.base = entry.idx.ofs_unc[first];
        entry.data = data;
        counters
            .gzip_idx_reposition_count
            .fetch_add(1, Ordering::Relaxed);
        counters
            .gzip_forward_seek_bytes
            .fetch_add(offset - entry.base, Ordering::Relaxed);
    }

    let start = (offset - entry.base) as usize;
    let stop = start + size as usize;
    if stop > entry.data.len() {
        return Err(ArkiError::Format(format!(
            "{}: read [{offset}, {end}) past the end of the segment",
            data_path.display()
        )));
    }
    counters.read_count.fetch_add(1, Ordering::Relaxed);
    counters.bytes_read.fetch_add(size, Ordering::Relaxed);
    Ok(entry.data[start..stop].to_vec())
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::segment::data::Writer;
    use crate::types::{Origin, Reftime, Time};

    #[test]
    fn test_seek_index_lookup() {
        let mut idx = SeekIndex::new();
        // 4000 bytes compressed exactly 50%.
        for (unc, comp) in [(0, 0), (1000, 500), (2000, 1000), (3000, 1500), (4000, 2000)] {
            idx.push(unc, comp);
        }
        assert_eq!(idx.lookup(0), 0);
        assert_eq!(idx.lookup(1), 0);
        assert_eq!(idx.lookup(999), 0);
        assert_eq!(idx.lookup(1000), 1);
        assert_eq!(idx.lookup(1999), 1);
        assert_eq!(idx.lookup(2000), 2);
        assert_eq!(idx.lookup(3999), 3);
        assert_eq!(idx.lookup(4000), 4);
        assert_eq!(idx.lookup(9999), 4);
        assert_eq!(idx.groups(), 4);
    }

    #[test]
    fn test_seek_index_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.bufr.gz.idx");
        let mut idx = SeekIndex::new();
        idx.push(0, 0);
        idx.push(1000, 321);
        idx.write(&path).unwrap();
        assert_eq!(SeekIndex::read(&path).unwrap().unwrap(), idx);
        assert_eq!(
            SeekIndex::read(&dir.path().join("nope.idx")).unwrap(),
            None
        );
    }

    /// Build a segment of `count` records of `size` bytes each, where
    /// record `i` is filled with the low byte of `i`.
    fn build_segment(dir: &Path, count: usize, size: usize) -> Collection {
        let mut writer = Writer::new(dir, "seg.bufr", "bufr");
        let mut coll = Collection::new();
        for i in 0..count {
            let mut md = Metadata::new();
            md.set(Origin::bufr(Some(80), Some(255)));
            md.set(Reftime::position(Time::new(2007, 7, 8, 0, 0, 0)));
            let mut data = vec![i as u8; size];
            data[0..4].copy_from_slice(b"BUFR");
            writer.append(&mut md, &data).unwrap().commit().unwrap();
            coll.push(md);
        }
        coll
    }

    #[test]
    fn test_compress_roundtrip_whole_file() {
        let _io = crate::segment::reader::TEST_IO_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let coll = build_segment(dir.path(), 20, 50);
        let path = dir.path().join("seg.bufr");
        let original = std::fs::read(&path).unwrap();

        compress(&path, &coll, 8).unwrap();
        assert!(!path.exists());
        assert!(gz_path(&path).exists());
        assert!(idx_path(&path).exists());
        assert_eq!(uncompress_all(&path).unwrap(), original);
    }

    #[test]
    fn test_compressed_reads_through_blob_sources() {
        let _io = crate::segment::reader::TEST_IO_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let coll = build_segment(dir.path(), 20, 50);
        let path = dir.path().join("seg.bufr");
        compress(&path, &coll, 8).unwrap();

        // Blob sources still resolve through the compressed rendition.
        for (i, md) in coll.iter().enumerate() {
            let data = md.get_data().unwrap();
            assert_eq!(data.len(), 50);
            assert_eq!(data[10], i as u8);
        }
    }

    #[test]
    fn test_reverse_reads_reposition_once_per_group() {
        let _io = crate::segment::reader::TEST_IO_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let record_size = 194;
        let count = 1024;
        let group = 128;
        let coll = build_segment(dir.path(), count, record_size);
        let path = dir.path().join("seg.bufr");
        compress(&path, &coll, group).unwrap();

        let before = crate::segment::reader::counters().snapshot();
        for i in (0..count).rev() {
            let data = read_range(&path, (i * record_size) as u64, record_size as u64).unwrap();
            assert_eq!(data.len(), record_size);
            assert_eq!(data[10], i as u8, "record {i}");
        }
        let after = crate::segment::reader::counters().snapshot();

        // One reposition per group, entered at its last record.
        let groups = (count / group) as u64;
        assert_eq!(
            after.gzip_idx_reposition_count - before.gzip_idx_reposition_count,
            groups
        );
        let skip_per_group = ((group - 1) * record_size) as u64;
        assert_eq!(
            after.gzip_forward_seek_bytes - before.gzip_forward_seek_bytes,
            groups * skip_per_group
        );
    }

    #[test]
    fn test_read_spanning_groups() {
        let _io = crate::segment::reader::TEST_IO_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let coll = build_segment(dir.path(), 10, 100);
        let path = dir.path().join("seg.bufr");
        compress(&path, &coll, 4).unwrap();

        // A range crossing the group boundary at record 4.
        let data = read_range(&path, 350, 200).unwrap();
        assert_eq!(data.len(), 200);
        assert_eq!(data[0], 3);
        assert_eq!(data[60], 4);
        assert_eq!(data[199], 5);
    }
}
