//! Append transactions on plain file segments.
//!
//! An append takes the exclusive write lock, writes at end of file and
//! hands back a `Pending`: commit syncs and releases the lock, rollback
//! truncates back to the pre-append size. Concurrent readers observe either
//! the pre- or post-commit length, never a torn record.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::core::lock::WriteLock;
use crate::core::transaction::{Pending, Transaction};
use crate::error::{ArkiError, Result};
use crate::metadata::Metadata;
use crate::types::Source;
use crate::utils;

/// A batch of appends to one segment under a single write lock.
///
/// Offsets are assigned in lock-acquisition order with no gaps. The whole
/// batch commits or rolls back as one: commit syncs the file and releases
/// the lock, rollback truncates to the size recorded at open.
pub struct AppendSession {
    lock: WriteLock,
    root: PathBuf,
    relpath: String,
    format: String,
    base_size: u64,
    pos: u64,
}

impl AppendSession {
    /// Open (creating if needed) `root/relpath` and take its write lock,
    /// blocking until granted.
    pub fn open(root: &Path, relpath: &str, format: &str) -> Result<AppendSession> {
        let path = root.join(relpath);
        utils::ensure_parent_dir(&path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| ArkiError::io(&path, e))?;
        let lock = WriteLock::acquire(file, &path)?;
        let base_size = lock
            .file()
            .metadata()
            .map_err(|e| ArkiError::io(&path, e))?
            .len();
        Ok(AppendSession {
            lock,
            root: root.to_path_buf(),
            relpath: relpath.to_string(),
            format: format.to_string(),
            base_size,
            pos: base_size,
        })
    }

    pub fn relpath(&self) -> &str {
        &self.relpath
    }

    /// Size of the segment before this session started appending.
    pub fn base_size(&self) -> u64 {
        self.base_size
    }

    /// Next insertion offset.
    pub fn next_offset(&self) -> u64 {
        self.pos
    }

    /// Write `data` at the end of the segment and point the metadata's
    /// source at the new range. Durable only after commit.
    pub fn append(&mut self, md: &mut Metadata, data: &[u8]) -> Result<u64> {
        let offset = self.pos;
        let path = self.lock.path().to_path_buf();
        let file = self.lock.file_mut();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| ArkiError::io(&path, e))?;
        file.write_all(data).map_err(|e| ArkiError::io(&path, e))?;
        self.pos = offset + data.len() as u64;
        md.set_source(Source::blob(
            self.format.clone(),
            self.root.to_string_lossy().into_owned(),
            self.relpath.clone(),
            offset,
            data.len() as u64,
        ));
        Ok(offset)
    }

    /// Undo the latest appends down to `offset`. Used when the index
    /// rejects a datum after its bytes were staged.
    pub fn truncate_back(&mut self, offset: u64) -> Result<()> {
        let path = self.lock.path().to_path_buf();
        self.lock
            .file()
            .set_len(offset)
            .map_err(|e| ArkiError::io(&path, e))?;
        self.pos = offset;
        Ok(())
    }

    /// Hand the batch over to a transaction for commit/rollback.
    pub fn into_transaction(self) -> AppendTransaction {
        AppendTransaction {
            lock: Some(self.lock),
            base_size: self.base_size,
            done: false,
        }
    }

    pub fn into_pending(self) -> Pending {
        Pending::new(Box::new(self.into_transaction()))
    }
}

pub struct AppendTransaction {
    lock: Option<WriteLock>,
    base_size: u64,
    done: bool,
}

impl Transaction for AppendTransaction {
    fn commit(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        let lock = match self.lock.take() {
            Some(lock) => lock,
            None => return Ok(()),
        };
        let path = lock.path().to_path_buf();
        lock.file()
            .sync_all()
            .map_err(|e| ArkiError::io(&path, e))?;
        // New bytes are durable; readers may now see the grown segment.
        drop(lock);
        crate::segment::reader::invalidate(&path);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        let lock = match self.lock.take() {
            Some(lock) => lock,
            None => return Ok(()),
        };
        let path = lock.path().to_path_buf();
        lock.file()
            .set_len(self.base_size)
            .map_err(|e| ArkiError::io(&path, e))?;
        drop(lock);
        crate::segment::reader::invalidate(&path);
        Ok(())
    }
}

/// Single-record append: the writer-contract entry point.
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

    /// Append one datum; the returned `Pending` controls its fate.
    pub fn append(&mut self, md: &mut Metadata, data: &[u8]) -> Result<Pending> {
        let mut session = AppendSession::open(&self.root, &self.relpath, &self.format)?;
        session.append(md, data)?;
        Ok(session.into_pending())
    }
}

/// Rewrite a segment so it contains exactly `collection`'s records in
/// order, updating each source to the new offsets. The rewrite happens on a
/// temporary file renamed into place; on error the temporary file is
/// removed and the segment is untouched.
pub fn repack(root: &Path, relpath: &str, collection: &mut crate::metadata::Collection) -> Result<()> {
    let path = root.join(relpath);
    let tmp = path.with_extension("repack.tmp");
    let result = (|| -> Result<()> {
        let mut out = std::fs::File::create(&tmp).map_err(|e| ArkiError::io(&tmp, e))?;
        let mut new_sources = Vec::with_capacity(collection.len());
        let mut offset: u64 = 0;
        for md in collection.iter() {
            let data = md.get_data()?;
            out.write_all(&data).map_err(|e| ArkiError::io(&tmp, e))?;
            let format = md.source().map(|s| s.format().to_string()).unwrap_or_default();
            new_sources.push(Source::blob(
                format,
                root.to_string_lossy().into_owned(),
                relpath,
                offset,
                data.len() as u64,
            ));
            offset += data.len() as u64;
        }
        out.sync_all().map_err(|e| ArkiError::io(&tmp, e))?;

        crate::segment::reader::invalidate(&path);
        std::fs::rename(&tmp, &path).map_err(|e| ArkiError::io(&path, e))?;

        let mut updated = crate::metadata::Collection::new();
        for (md, source) in collection.iter().zip(new_sources) {
            let mut md = md.clone();
            md.set_source(source);
            updated.push(md);
        }
        *collection = updated;

        collection.write_to_file(&super::metadata_path(&path))?;
        collection.summary().write_to_file(&super::summary_path(&path))?;
        Ok(())
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Collection;
    use crate::types::{Origin, Reftime, Time};

    fn md() -> Metadata {
        let mut md = Metadata::new();
        md.set(Origin::grib1(Some(200), Some(0), Some(101)));
        md.set(Reftime::position(Time::new(2007, 7, 8, 13, 0, 0)));
        md
    }

    #[test]
    fn test_append_commit_grows_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = Writer::new(dir.path(), "2007/07-08.grib", "grib");

        let mut m = md();
        let pending = writer.append(&mut m, b"GRIB-first-record").unwrap();
        match m.source() {
            Some(Source::Blob { offset, size, .. }) => {
                assert_eq!(*offset, 0);
                assert_eq!(*size, 17);
            }
            other => panic!("unexpected source: {other:?}"),
        }
        pending.commit().unwrap();

        let path = dir.path().join("2007/07-08.grib");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 17);

        // Second append lands right after the first, no gap.
        let mut m2 = md();
        let pending2 = writer.append(&mut m2, b"GRIB-second").unwrap();
        match m2.source() {
            Some(Source::Blob { offset, .. }) => assert_eq!(*offset, 17),
            other => panic!("unexpected source: {other:?}"),
        }
        pending2.commit().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 28);
    }

    #[test]
    fn test_dropped_pending_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = Writer::new(dir.path(), "seg.grib", "grib");

        let mut m = md();
        {
            let _pending = writer.append(&mut m, &[0u8; 100]).unwrap();
            // Dropped without commit.
        }
        let path = dir.path().join("seg.grib");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_explicit_rollback_truncates_to_base() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = Writer::new(dir.path(), "seg.grib", "grib");

        let mut m1 = md();
        writer.append(&mut m1, b"GRIB-kept").unwrap().commit().unwrap();

        let mut m2 = md();
        let pending = writer.append(&mut m2, b"GRIB-discarded").unwrap();
        pending.rollback().unwrap();

        let path = dir.path().join("seg.grib");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 9);
    }

    #[test]
    fn test_session_batches_under_one_lock() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = AppendSession::open(dir.path(), "seg.grib", "grib").unwrap();
        let mut m1 = md();
        let mut m2 = md();
        assert_eq!(session.append(&mut m1, b"GRIB-aa").unwrap(), 0);
        assert_eq!(session.append(&mut m2, b"GRIB-bbb").unwrap(), 7);
        session.into_pending().commit().unwrap();
        assert_eq!(
            std::fs::metadata(dir.path().join("seg.grib")).unwrap().len(),
            15
        );
    }

    #[test]
    fn test_repack_preserves_bytes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = Writer::new(dir.path(), "seg.grib", "grib");
        let mut m1 = md();
        let mut m2 = md();
        writer.append(&mut m1, b"GRIB-one-").unwrap().commit().unwrap();
        writer.append(&mut m2, b"GRIB-two-").unwrap().commit().unwrap();

        // Repack in reverse declared order.
        let mut coll = Collection::new();
        coll.push(m2.clone());
        coll.push(m1.clone());
        repack(dir.path(), "seg.grib", &mut coll).unwrap();

        let path = dir.path().join("seg.grib");
        assert_eq!(std::fs::read(&path).unwrap(), b"GRIB-two-GRIB-one-");
        // Sources updated to the new layout.
        assert_eq!(coll.get(0).unwrap().get_data().unwrap(), b"GRIB-two-");
        assert_eq!(coll.get(1).unwrap().get_data().unwrap(), b"GRIB-one-");
        // Sidecars re-emitted.
        assert!(super::super::metadata_path(&path).exists());
        assert!(super::super::summary_path(&path).exists());
    }
}
