//! Directory segments: one zero-padded sequence file per datum.
//!
//! Formats whose data cannot be concatenated (HDF5 volumes, NetCDF files)
//! store each datum as `NNNNNN.<format>` inside a directory named like the
//! segment. The blob "offset" is the sequence number and the "size" the
//! file length.

use std::path::{Path, PathBuf};

use crate::core::transaction::{Pending, Transaction};
use crate::error::{ArkiError, Result};
use crate::metadata::{Collection, Metadata};
use crate::segment::State;
use crate::types::Source;
use crate::utils;

pub fn record_path(dir: &Path, format: &str, sequence: u64) -> PathBuf {
    dir.join(format!("{sequence:06}.{format}"))
}

/// Read one record by sequence number, verifying the declared size.
pub fn read_record(dir: &Path, format: &str, sequence: u64, size: u64) -> Result<Vec<u8>> {
    let path = record_path(dir, format, sequence);
    let data = std::fs::read(&path).map_err(|e| ArkiError::io(&path, e))?;
    if data.len() as u64 != size {
        return Err(ArkiError::Consistency(format!(
            "{}: expected {size} bytes, found {}",
            path.display(),
            data.len()
        )));
    }
    Ok(data)
}

/// Next free sequence number in a directory segment.
fn next_sequence(dir: &Path) -> Result<u64> {
    let mut next = 0u64;
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries {
                let entry = entry.map_err(|e| ArkiError::io(dir, e))?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if let Some(stem) = name.split('.').next() {
                    if let Ok(n) = stem.parse::<u64>() {
                        next = next.max(n + 1);
                    }
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ArkiError::io(dir, e)),
    }
    Ok(next)
}

/// Append one datum as a new sequence file.
pub struct Writer {
    root: PathBuf,
    relpath: String,
    format: String,
}

impl Writer {
    pub fn new(root: &Path, relpath: &str, format: &str) -> Writer {
        Writer {
            root: root.to_path_buf(),
            relpath: relpath.to_string(),
            format: format.to_string(),
        }
    }

    pub fn append(&mut self, md: &mut Metadata, data: &[u8]) -> Result<Pending> {
        let dir = self.root.join(&self.relpath);
        std::fs::create_dir_all(&dir).map_err(|e| ArkiError::io(&dir, e))?;
        let sequence = next_sequence(&dir)?;
        let path = record_path(&dir, &self.format, sequence);
        utils::write_atomically(&path, data)?;
        md.set_source(Source::blob(
            self.format.clone(),
            self.root.to_string_lossy().into_owned(),
            self.relpath.clone(),
            sequence,
            data.len() as u64,
        ));
        Ok(Pending::new(Box::new(DirAppendTransaction {
            path,
            done: false,
        })))
    }
}

struct DirAppendTransaction {
    path: PathBuf,
    done: bool,
}

impl Transaction for DirAppendTransaction {
    fn commit(&mut self) -> Result<()> {
        self.done = true;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        utils::remove_if_exists(&self.path)
    }
}

/// Dir-segment variant of the content check.
pub fn check(dir: &Path, expected: &Collection) -> Result<State> {
    use crate::segment::{SEGMENT_DELETED, SEGMENT_DIRTY, SEGMENT_UNALIGNED};

    if expected.is_empty() {
        return Ok(State::new(SEGMENT_DELETED));
    }
    let mut state = State::OK;
    let mut declared = 0usize;
    for md in expected.iter() {
        match md.source() {
            Some(Source::Blob {
                format,
                offset,
                size,
                ..
            }) => {
                let path = record_path(dir, format, *offset);
                match utils::file_size(&path)? {
                    Some(found) if found == *size => declared += 1,
                    Some(_) | None => state += State::new(SEGMENT_UNALIGNED),
                }
            }
            _ => state += State::new(SEGMENT_UNALIGNED),
        }
    }
    // Sequence files nobody declared mean reclaimable space.
    let mut on_disk = 0usize;
    if let Ok(entries) = std::fs::read_dir(dir) {
        on_disk = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .split('.')
                    .next()
                    .map_or(false, |stem| stem.parse::<u64>().is_ok())
            })
            .count();
    }
    if on_disk > declared {
        state += State::new(SEGMENT_DIRTY);
    }
    Ok(state)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Product, Reftime, Time};

    fn md() -> Metadata {
        let mut md = Metadata::new();
        md.set(Product::Odimh5 {
            object: "PVOL".into(),
            product: "SCAN".into(),
        });
        md.set(Reftime::position(Time::new(2007, 7, 8, 0, 0, 0)));
        md
    }

    #[test]
    fn test_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = Writer::new(dir.path(), "2007/07-08.odimh5", "odimh5");

        let mut m1 = md();
        writer.append(&mut m1, b"volume-one").unwrap().commit().unwrap();
        let mut m2 = md();
        writer.append(&mut m2, b"volume-two!").unwrap().commit().unwrap();

        match m2.source() {
            Some(Source::Blob { offset, size, .. }) => {
                assert_eq!(*offset, 1);
                assert_eq!(*size, 11);
            }
            other => panic!("unexpected source: {other:?}"),
        }
        assert_eq!(m1.get_data().unwrap(), b"volume-one");
        assert_eq!(m2.get_data().unwrap(), b"volume-two!");
    }

    #[test]
    fn test_rollback_removes_sequence_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = Writer::new(dir.path(), "seg.odimh5", "odimh5");
        let mut m = md();
        {
            let _pending = writer.append(&mut m, b"doomed").unwrap();
        }
        let seg = dir.path().join("seg.odimh5");
        assert_eq!(std::fs::read_dir(&seg).unwrap().count(), 0);

        // The sequence restarts from zero after the rollback.
        let mut m2 = md();
        writer.append(&mut m2, b"kept").unwrap().commit().unwrap();
        assert!(record_path(&seg, "odimh5", 0).exists());
    }

    #[test]
    fn test_check_detects_missing_and_undeclared() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = Writer::new(dir.path(), "seg.odimh5", "odimh5");
        let mut m1 = md();
        writer.append(&mut m1, b"one").unwrap().commit().unwrap();

        let seg = dir.path().join("seg.odimh5");
        let mut coll = Collection::new();
        coll.push(m1.clone());
        assert!(check(&seg, &coll).unwrap().is_ok());

        // An undeclared extra file is reclaimable space.
        std::fs::write(record_path(&seg, "odimh5", 7), b"stray").unwrap();
        assert!(check(&seg, &coll)
            .unwrap()
            .has(crate::segment::SEGMENT_DIRTY));

        // A declared but missing file is out of alignment.
        std::fs::remove_file(record_path(&seg, "odimh5", 0)).unwrap();
        assert!(check(&seg, &coll)
            .unwrap()
            .has(crate::segment::SEGMENT_UNALIGNED));
    }
}
