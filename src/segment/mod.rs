//! Dataset segments: append-only data files with metadata and summary
//! sidecars.
//!
//! A segment is one file (or, for single-datum formats, a directory of
//! numbered files) named by a relative path inside the dataset. Its state
//! is a bitset describing how its contents relate to the index; the single
//! all-clear value means contents and index agree exactly.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::metadata::Collection;
use crate::types::Source;
use crate::utils;

pub mod data;
pub mod dir;
pub mod gz;
pub mod reader;

pub const SEGMENT_OK: u32 = 0;
/// Segment contains data deleted or out of order.
pub const SEGMENT_DIRTY: u32 = 1 << 0;
/// Segment contents are inconsistent with the index.
pub const SEGMENT_UNALIGNED: u32 = 1 << 1;
/// Segment is known to the index but does not exist on disk.
pub const SEGMENT_MISSING: u32 = 1 << 2;
/// Segment contents have been entirely deleted.
pub const SEGMENT_DELETED: u32 = 1 << 3;
/// File is broken in a way that needs manual intervention.
pub const SEGMENT_CORRUPTED: u32 = 1 << 4;
/// File is old enough to be archived.
pub const SEGMENT_ARCHIVE_AGE: u32 = 1 << 5;
/// File is old enough to be deleted.
pub const SEGMENT_DELETE_AGE: u32 = 1 << 6;

/// State of a segment, as a bitset of the `SEGMENT_*` flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct State {
    pub value: u32,
}

impl State {
    pub const OK: State = State { value: SEGMENT_OK };

    pub fn new(value: u32) -> State {
        State { value }
    }

    pub fn is_ok(&self) -> bool {
        self.value == SEGMENT_OK
    }

    pub fn has(&self, flag: u32) -> bool {
        self.value & flag != 0
    }
}

impl std::ops::Add for State {
    type Output = State;
    fn add(self, other: State) -> State {
        State::new(self.value | other.value)
    }
}

impl std::ops::AddAssign for State {
    fn add_assign(&mut self, other: State) {
        self.value |= other.value;
    }
}

impl std::ops::Sub for State {
    type Output = State;
    fn sub(self, other: State) -> State {
        State::new(self.value & !other.value)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return f.write_str("OK");
        }
        let names = [
            (SEGMENT_DIRTY, "DIRTY"),
            (SEGMENT_UNALIGNED, "UNALIGNED"),
            (SEGMENT_MISSING, "MISSING"),
            (SEGMENT_DELETED, "DELETED"),
            (SEGMENT_CORRUPTED, "CORRUPTED"),
            (SEGMENT_ARCHIVE_AGE, "ARCHIVE_AGE"),
            (SEGMENT_DELETE_AGE, "DELETE_AGE"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.has(flag) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A byte range inside a segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Span {
    pub offset: u64,
    pub size: u64,
}

impl Span {
    pub fn new(offset: u64, size: u64) -> Span {
        Span { offset, size }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

// ── Format helpers ─────────────────────────────────────────────────

/// Data format from a file extension.
pub fn format_from_ext(ext: &str) -> Option<&'static str> {
    match ext {
        "grib" | "grib1" | "grib2" => Some("grib"),
        "bufr" => Some("bufr"),
        "vm2" => Some("vm2"),
        "h5" | "odim" | "odimh5" => Some("odimh5"),
        "nc" => Some("netcdf"),
        "arkimet" | "metadata" => Some("arkimet"),
        _ => None,
    }
}

pub fn format_from_path(path: &Path) -> Option<&'static str> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(format_from_ext)
}

/// Formats stored as a directory of single-datum files.
pub fn is_dir_format(format: &str) -> bool {
    matches!(format, "odimh5" | "netcdf")
}

/// Quick signature test for a datum claimed to start at some offset.
/// Unknown formats pass; known formats must show their leading magic.
pub fn signature_ok(format: &str, head: &[u8]) -> bool {
    match format {
        "grib" => head.starts_with(b"GRIB"),
        "bufr" => head.starts_with(b"BUFR"),
        "arkimet" => head.starts_with(b"MD") || head.starts_with(b"!D"),
        "vm2" => head.first().map_or(false, |b| b.is_ascii_digit()),
        _ => true,
    }
}

/// Sidecar paths of a segment data file.
pub fn metadata_path(data_path: &Path) -> PathBuf {
    append_ext(data_path, "metadata")
}

pub fn summary_path(data_path: &Path) -> PathBuf {
    append_ext(data_path, "summary")
}

fn append_ext(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

// ── Check ──────────────────────────────────────────────────────────

/// Maximum hole between records tolerated before a repack is requested.
pub const DEFAULT_MAX_GAP: u64 = 0;

/// Compare a segment's on-disk contents against the ordered metadata that
/// should describe it.
pub fn check(data_path: &Path, expected: &Collection, max_gap: u64) -> Result<State> {
    if data_path.is_dir() {
        return dir::check(data_path, expected);
    }
    let size = match utils::file_size(data_path)? {
        Some(size) => size,
        None => {
            // A compressed rendition still counts as present.
            let gz = append_ext(data_path, "gz");
            match utils::file_size(&gz)? {
                Some(_) => return Ok(State::new(SEGMENT_OK)),
                None => return Ok(State::new(SEGMENT_MISSING)),
            }
        }
    };

    if expected.is_empty() {
        return Ok(if size == 0 {
            State::new(SEGMENT_DELETED)
        } else {
            State::new(SEGMENT_DIRTY)
        });
    }

    let mut state = State::OK;
    let mut next_offset: u64 = 0;
    let mut ordered = true;
    for md in expected.iter() {
        let (format, span) = match md.source() {
            Some(Source::Blob {
                format,
                offset,
                size,
                ..
            }) => (format.clone(), Span::new(*offset, *size)),
            _ => {
                state += State::new(SEGMENT_UNALIGNED);
                continue;
            }
        };
        if span.end() > size {
            // Declared data past the end of the file: the index does not
            // describe what is on disk.
            state += State::new(SEGMENT_UNALIGNED);
            continue;
        }
        if span.offset < next_offset {
            ordered = false;
        } else if span.offset > next_offset + max_gap {
            state += State::new(SEGMENT_DIRTY);
        }
        let head_len = span.size.min(8) as usize;
        let head = reader::read_range(data_path, span.offset, head_len as u64)?;
        if !signature_ok(&format, &head) {
            state += State::new(SEGMENT_CORRUPTED);
        }
        next_offset = next_offset.max(span.end());
    }
    if !ordered {
        state += State::new(SEGMENT_DIRTY);
    }
    if next_offset < size {
        // Trailing bytes not described by any record.
        state += State::new(SEGMENT_DIRTY);
    }
    Ok(state)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::types::{Origin, Reftime, Time};

    fn blob_md(relpath: &str, root: &Path, offset: u64, size: u64) -> Metadata {
        let mut md = Metadata::new();
        md.set(Origin::grib1(Some(200), Some(0), Some(101)));
        md.set(Reftime::position(Time::new(2007, 7, 8, 13, 0, 0)));
        md.set_source(Source::blob(
            "grib",
            root.to_string_lossy().into_owned(),
            relpath,
            offset,
            size,
        ));
        md
    }

    #[test]
    fn test_state_composition_and_display() {
        let mut state = State::OK;
        assert!(state.is_ok());
        assert_eq!(state.to_string(), "OK");

        state += State::new(SEGMENT_DIRTY);
        state += State::new(SEGMENT_ARCHIVE_AGE);
        assert!(!state.is_ok());
        assert!(state.has(SEGMENT_DIRTY));
        assert_eq!(state.to_string(), "DIRTY,ARCHIVE_AGE");

        let cleared = state - State::new(SEGMENT_DIRTY);
        assert_eq!(cleared.to_string(), "ARCHIVE_AGE");
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_from_ext("grib1"), Some("grib"));
        assert_eq!(format_from_ext("vm2"), Some("vm2"));
        assert_eq!(format_from_ext("exe"), None);
        assert!(is_dir_format("odimh5"));
        assert!(!is_dir_format("grib"));
        assert!(signature_ok("grib", b"GRIB1234"));
        assert!(!signature_ok("grib", b"JUNK"));
        assert!(signature_ok("weird", b"anything"));
    }

    #[test]
    fn test_sidecar_paths() {
        let p = Path::new("/ds/2007/07-08.grib");
        assert_eq!(metadata_path(p), Path::new("/ds/2007/07-08.grib.metadata"));
        assert_eq!(summary_path(p), Path::new("/ds/2007/07-08.grib.summary"));
    }

    #[test]
    fn test_check_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.grib");
        std::fs::write(&path, b"GRIB-one-GRIB-two-").unwrap();

        let mut coll = Collection::new();
        coll.push(blob_md("seg.grib", dir.path(), 0, 9));
        coll.push(blob_md("seg.grib", dir.path(), 9, 9));
        assert!(check(&path, &coll, 0).unwrap().is_ok());
    }

    #[test]
    fn test_check_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.grib");
        let coll = Collection::new();
        assert!(check(&path, &coll, 0).unwrap().has(SEGMENT_MISSING));
    }

    #[test]
    fn test_check_trailing_data_is_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.grib");
        std::fs::write(&path, b"GRIB-one-trailing-junk").unwrap();

        let mut coll = Collection::new();
        coll.push(blob_md("seg.grib", dir.path(), 0, 9));
        let state = check(&path, &coll, 0).unwrap();
        assert!(state.has(SEGMENT_DIRTY));
        assert!(!state.has(SEGMENT_UNALIGNED));
    }

    #[test]
    fn test_check_out_of_order_is_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.grib");
        std::fs::write(&path, b"GRIB-one-GRIB-two-").unwrap();

        let mut coll = Collection::new();
        coll.push(blob_md("seg.grib", dir.path(), 9, 9));
        coll.push(blob_md("seg.grib", dir.path(), 0, 9));
        assert!(check(&path, &coll, 0).unwrap().has(SEGMENT_DIRTY));
    }

    #[test]
    fn test_check_out_of_bounds_is_unaligned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.grib");
        std::fs::write(&path, b"GRIB-one-").unwrap();

        let mut coll = Collection::new();
        coll.push(blob_md("seg.grib", dir.path(), 0, 9));
        coll.push(blob_md("seg.grib", dir.path(), 9, 100));
        assert!(check(&path, &coll, 0).unwrap().has(SEGMENT_UNALIGNED));
    }

    #[test]
    fn test_check_bad_signature_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.grib");
        std::fs::write(&path, b"JUNKJUNK1").unwrap();

        let mut coll = Collection::new();
        coll.push(blob_md("seg.grib", dir.path(), 0, 9));
        assert!(check(&path, &coll, 0).unwrap().has(SEGMENT_CORRUPTED));
    }
}
