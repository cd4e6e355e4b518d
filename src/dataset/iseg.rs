//! Local indexed datasets: segments on disk plus one SQLite index.
//!
//! The writer batches acquisitions: segment appends and index inserts stage
//! under one index transaction and one write lock per touched segment, and
//! `flush` commits segment data before the index so a reader never sees an
//! index row whose bytes are not durable.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::transaction::TransactionChain;
use crate::error::{ArkiError, Result};
use crate::index::{DataQuery, Index, IndexTransaction};
use crate::matcher::Matcher;
use crate::metadata::{Collection, Metadata};
use crate::segment::{self, data::AppendSession, State};
use crate::summary::Summary;
use crate::types::{Source, Time};
use crate::utils;

use super::{AcquireOutcome, DatasetConfig, Writer};

/// Write the section copy a dataset directory carries, once.
fn write_config_copy(cfg: &DatasetConfig) -> Result<()> {
    let path = cfg.path.join("config");
    if !path.exists() {
        let mut rendered = crate::config::ConfigFile::new();
        rendered.push(cfg.to_section());
        utils::write_atomically(&path, rendered.to_string().as_bytes())?;
    }
    Ok(())
}

// ── Writer ─────────────────────────────────────────────────────────

struct Batch {
    txn: Option<IndexTransaction>,
    sessions: Vec<AppendSession>,
    dir_pendings: Vec<crate::core::transaction::Pending>,
}

pub struct IsegWriter {
    cfg: DatasetConfig,
    index: Index,
    batch: Option<Batch>,
}

impl IsegWriter {
    pub fn open(cfg: &DatasetConfig) -> Result<IsegWriter> {
        let index = Index::open(&cfg.path, &cfg.indexed)?;
        write_config_copy(cfg)?;
        Ok(IsegWriter {
            cfg: cfg.clone(),
            index,
            batch: None,
        })
    }

    fn batch(&mut self) -> Result<&mut Batch> {
        if self.batch.is_none() {
            self.batch = Some(Batch {
                txn: Some(self.index.begin()?),
                sessions: Vec::new(),
                dir_pendings: Vec::new(),
            });
        }
        Ok(self.batch.as_mut().unwrap())
    }

    fn session_for<'a>(
        sessions: &'a mut Vec<AppendSession>,
        root: &Path,
        relpath: &str,
        format: &str,
    ) -> Result<&'a mut AppendSession> {
        if let Some(pos) = sessions.iter().position(|s| s.relpath() == relpath) {
            return Ok(&mut sessions[pos]);
        }
        sessions.push(AppendSession::open(root, relpath, format)?);
        Ok(sessions.last_mut().unwrap())
    }

    fn acquire_dir(&mut self, md: &mut Metadata, data: &[u8], relpath: &str, format: &str) -> Result<AcquireOutcome> {
        let orig_source = md.source().cloned();
        let root = self.cfg.path.clone();
        let replace = self.cfg.replace;
        let name = self.cfg.name.clone();

        let mut writer = segment::dir::Writer::new(&root, relpath, format);
        let pending = writer.append(md, data)?;
        let (offset, size) = match md.source() {
            Some(Source::Blob { offset, size, .. }) => (*offset, *size),
            _ => unreachable!("dir append always sets a blob source"),
        };
        match self.index.insert(md, relpath, offset, size) {
            Ok(()) => {
                self.batch()?.dir_pendings.push(pending);
                md.set_assigned_dataset(&name);
                Ok(AcquireOutcome::Acquired)
            }
            Err(e) if e.is_duplicate() && replace => {
                self.index.replace(md, relpath, offset, size)?;
                self.batch()?.dir_pendings.push(pending);
                md.set_assigned_dataset(&name);
                Ok(AcquireOutcome::Acquired)
            }
            Err(e) if e.is_duplicate() => {
                pending.rollback()?;
                if let Some(source) = orig_source {
                    md.set_source(source);
                }
                Ok(AcquireOutcome::Duplicate)
            }
            Err(e) => {
                pending.rollback()?;
                if let Some(source) = orig_source {
                    md.set_source(source);
                }
                Err(e)
            }
        }
    }
}

impl Writer for IsegWriter {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn acquire(&mut self, md: &mut Metadata) -> Result<AcquireOutcome> {
        let data = md.get_data()?;
        let (reftime, _) = md.reftime_interval().ok_or_else(|| {
            ArkiError::Consistency("cannot acquire a metadata without a reference time".into())
        })?;
        let format = md
            .source()
            .map(|s| s.format().to_string())
            .ok_or_else(|| ArkiError::Consistency("cannot acquire a metadata without a source".into()))?;
        let relpath = self.cfg.step.target_file(&reftime, &format);

        // Make sure the index transaction is open before any staging.
        self.batch()?;

        if segment::is_dir_format(&format) {
            return self.acquire_dir(md, &data, &relpath, &format);
        }

        let orig_source = md.source().cloned();
        let root = self.cfg.path.clone();
        let batch = self.batch.as_mut().unwrap();
        let session = Self::session_for(&mut batch.sessions, &root, &relpath, &format)?;
        let offset = session.next_offset();
        session.append(md, &data)?;

        match self.index.insert(md, &relpath, offset, data.len() as u64) {
            Ok(()) => {
                md.set_assigned_dataset(&self.cfg.name);
                Ok(AcquireOutcome::Acquired)
            }
            Err(e) if e.is_duplicate() && self.cfg.replace => {
                self.index.replace(md, &relpath, offset, data.len() as u64)?;
                md.set_assigned_dataset(&self.cfg.name);
                Ok(AcquireOutcome::Acquired)
            }
            Err(e) => {
                let batch = self.batch.as_mut().unwrap();
                let session = Self::session_for(&mut batch.sessions, &root, &relpath, &format)?;
                session.truncate_back(offset)?;
                if let Some(source) = orig_source {
                    md.set_source(source);
                }
                if e.is_duplicate() {
                    debug!(dataset = %self.cfg.name, "rejected duplicate at {relpath}:{offset}");
                    Ok(AcquireOutcome::Duplicate)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        let batch = match self.batch.take() {
            Some(batch) => batch,
            None => return Ok(()),
        };
        let mut chain = TransactionChain::new();
        for pending in batch.dir_pendings {
            // Re-wrap staged dir appends so the chain owns them.
            chain.push(Box::new(PendingPart(Some(pending))));
        }
        for session in batch.sessions {
            chain.push(Box::new(session.into_transaction()));
        }
        if let Some(txn) = batch.txn {
            chain.push(Box::new(txn));
        }
        chain.into_pending().commit()
    }

    fn discard(&mut self) -> Result<()> {
        let batch = match self.batch.take() {
            Some(batch) => batch,
            None => return Ok(()),
        };
        let mut chain = TransactionChain::new();
        for pending in batch.dir_pendings {
            chain.push(Box::new(PendingPart(Some(pending))));
        }
        for session in batch.sessions {
            chain.push(Box::new(session.into_transaction()));
        }
        if let Some(txn) = batch.txn {
            chain.push(Box::new(txn));
        }
        chain.into_pending().rollback()
    }
}

impl Drop for IsegWriter {
    fn drop(&mut self) {
        if self.batch.is_some() {
            if let Err(e) = self.discard() {
                warn!(dataset = %self.cfg.name, "discarding unflushed batch failed: {e}");
            }
        }
    }
}

/// Adapter so a staged `Pending` can join a `TransactionChain`.
struct PendingPart(Option<crate::core::transaction::Pending>);

impl crate::core::transaction::Transaction for PendingPart {
    fn commit(&mut self) -> Result<()> {
        match self.0.take() {
            Some(pending) => pending.commit(),
            None => Ok(()),
        }
    }

    fn rollback(&mut self) -> Result<()> {
        match self.0.take() {
            Some(pending) => pending.rollback(),
            None => Ok(()),
        }
    }
}

// ── Reader ─────────────────────────────────────────────────────────

pub struct IsegReader {
    cfg: DatasetConfig,
    index: Index,
}

impl IsegReader {
    pub fn open(cfg: &DatasetConfig) -> Result<IsegReader> {
        Ok(IsegReader {
            cfg: cfg.clone(),
            index: Index::open(&cfg.path, &cfg.indexed)?,
        })
    }
}

impl super::Reader for IsegReader {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn query_data(
        &self,
        query: &DataQuery,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        self.index.query_data(query, consumer)
    }

    fn query_summary(&self, matcher: &Matcher, summary: &mut Summary) -> Result<()> {
        self.index.query_summary(matcher, summary)
    }
}

// ── Checker ────────────────────────────────────────────────────────

pub struct IsegChecker {
    cfg: DatasetConfig,
    index: Index,
}

impl IsegChecker {
    pub fn open(cfg: &DatasetConfig) -> Result<IsegChecker> {
        Ok(IsegChecker {
            cfg: cfg.clone(),
            index: Index::open(&cfg.path, &cfg.indexed)?,
        })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.cfg
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    fn age_state(&self, relpath: &str, reference: &Time) -> Result<State> {
        let newest = match self.index.segment_max_reftime(relpath)? {
            Some(newest) => newest,
            None => return Ok(State::OK),
        };
        let age_days = newest.days_until(reference);
        if let Some(delete_age) = self.cfg.delete_age_days {
            if age_days >= delete_age as i64 {
                return Ok(State::new(segment::SEGMENT_DELETE_AGE));
            }
        }
        if let Some(archive_age) = self.cfg.archive_age_days {
            if age_days >= archive_age as i64 {
                return Ok(State::new(segment::SEGMENT_ARCHIVE_AGE));
            }
        }
        Ok(State::OK)
    }

    /// State of every segment the index or the disk knows about. Index-
    /// checked segments are scanned in parallel; segments found on disk but
    /// unknown to the index report as out of alignment (a rescan imports
    /// them).
    pub fn segment_states(&self) -> Result<Vec<(String, State)>> {
        use rayon::prelude::*;

        let reference = crate::runtime::Runtime::get().reference_time();
        let known = self.index.list_segments()?;

        let mut states: Vec<(String, State)> = known
            .par_iter()
            .map(|relpath| -> Result<(String, State)> {
                let coll = self.index.segment_metadata(relpath)?;
                let mut state =
                    segment::check(&self.cfg.path.join(relpath), &coll, segment::DEFAULT_MAX_GAP)?;
                state += self.age_state(relpath, &reference)?;
                Ok((relpath.clone(), state))
            })
            .collect::<Result<Vec<_>>>()?;

        for relpath in walk_segments(&self.cfg.path)? {
            if !known.contains(&relpath) {
                states.push((relpath, State::new(segment::SEGMENT_UNALIGNED)));
            }
        }
        states.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(states)
    }

    /// Rewrite a segment to contain exactly the indexed records in index
    /// order, then point the index at the new offsets.
    pub fn repack_segment(&self, relpath: &str) -> Result<()> {
        let mut coll = self.index.segment_metadata(relpath)?;
        segment::data::repack(&self.cfg.path, relpath, &mut coll)?;
        self.index.reindex_segment(relpath, &coll)
    }

    /// Re-derive a segment's contents with the format scanner and reconcile
    /// index and sidecars with what is actually in the file.
    pub fn rescan_segment(&self, relpath: &str) -> Result<()> {
        let path = self.cfg.path.join(relpath);
        let format = segment::format_from_path(Path::new(relpath)).ok_or_else(|| {
            ArkiError::Format(format!("cannot tell the format of {relpath}"))
        })?;
        let mut coll = crate::scan::scan_file(&path, format)?;
        // Rebase the sources onto the dataset root.
        let mut rebased = Collection::new();
        for md in coll.iter() {
            let mut md = md.clone();
            if let Some(Source::Blob { offset, size, format, .. }) = md.source().cloned() {
                md.set_source(Source::blob(
                    format,
                    self.cfg.path.to_string_lossy().into_owned(),
                    relpath,
                    offset,
                    size,
                ));
            }
            rebased.push(md);
        }
        coll = rebased;

        coll.write_to_file(&segment::metadata_path(&path))?;
        coll.summary().write_to_file(&segment::summary_path(&path))?;
        self.index.reindex_segment(relpath, &coll)
    }

    /// Forget a segment that no longer exists on disk.
    pub fn remove_from_index(&self, relpath: &str) -> Result<usize> {
        self.index.remove_segment(relpath)
    }

    /// Delete a segment and all traces of it.
    pub fn delete_segment(&self, relpath: &str) -> Result<()> {
        let path = self.cfg.path.join(relpath);
        self.index.remove_segment(relpath)?;
        crate::segment::reader::invalidate(&path);
        if path.is_dir() {
            std::fs::remove_dir_all(&path).map_err(|e| ArkiError::io(&path, e))?;
        } else {
            utils::remove_if_exists(&path)?;
        }
        utils::remove_if_exists(&segment::metadata_path(&path))?;
        utils::remove_if_exists(&segment::summary_path(&path))?;
        utils::remove_if_exists(&segment::gz::gz_path(&path))?;
        utils::remove_if_exists(&segment::gz::idx_path(&path))?;
        Ok(())
    }

    /// Move a segment (with fresh sidecars) into `.archive/last` and drop
    /// it from the index.
    pub fn archive_segment(&self, relpath: &str) -> Result<()> {
        let coll = self.index.segment_metadata(relpath)?;
        let src = self.cfg.path.join(relpath);
        let dst = super::archive::archive_path(&self.cfg.path, relpath);
        utils::ensure_parent_dir(&dst)?;

        crate::segment::reader::invalidate(&src);
        std::fs::rename(&src, &dst).map_err(|e| ArkiError::io(&src, e))?;

        // Sidecars travel with the data, rebased on the archive directory.
        let archive_root = super::archive::archive_root(&self.cfg.path);
        let mut rebased = Collection::new();
        for md in coll.iter() {
            let mut md = md.clone();
            if let Some(Source::Blob { offset, size, format, .. }) = md.source().cloned() {
                md.set_source(Source::blob(
                    format,
                    archive_root.to_string_lossy().into_owned(),
                    relpath,
                    offset,
                    size,
                ));
            }
            rebased.push(md);
        }
        rebased.write_to_file(&segment::metadata_path(&dst))?;
        rebased.summary().write_to_file(&segment::summary_path(&dst))?;
        utils::remove_if_exists(&segment::metadata_path(&src))?;
        utils::remove_if_exists(&segment::summary_path(&src))?;

        self.index.remove_segment(relpath)?;
        Ok(())
    }

    /// Drop and lazily rebuild the summary cache files.
    pub fn rebuild_summary_cache(&self) -> Result<()> {
        crate::index::summary_cache::invalidate_all(&self.cfg.path)?;
        let mut summary = Summary::new();
        self.index.query_summary(&Matcher::empty(), &mut summary)
    }
}

/// Data segments under a dataset root, skipping sidecars and service dirs.
fn walk_segments(root: &Path) -> Result<Vec<String>> {
    let mut found = Vec::new();
    walk_dir(root, root, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk_dir(root: &Path, dir: &Path, found: &mut Vec<String>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ArkiError::io(dir, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| ArkiError::io(dir, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name == "config" || name == crate::index::INDEX_FILENAME {
            continue;
        }
        let is_dir_segment = path.is_dir()
            && segment::format_from_path(&path).map(segment::is_dir_format) == Some(true);
        if path.is_dir() && !is_dir_segment {
            walk_dir(root, &path, found)?;
            continue;
        }
        if name.ends_with(".metadata")
            || name.ends_with(".summary")
            || name.ends_with(".gz.idx")
            || name.ends_with("-journal")
            || name.ends_with("-wal")
            || name.ends_with("-shm")
        {
            continue;
        }
        let logical = match name.strip_suffix(".gz") {
            Some(stem) => dir.join(stem),
            None => path.clone(),
        };
        if segment::format_from_path(&logical).is_some() {
            let rel = logical
                .strip_prefix(root)
                .unwrap_or(&logical)
                .to_string_lossy()
                .into_owned();
            if !found.contains(&rel) {
                found.push(rel);
            }
        }
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use crate::types::{Code, Origin, Product, Reftime};

    pub(crate) fn test_config(dir: &Path, name: &str) -> DatasetConfig {
        let text = format!(
            "[{name}]\ntype = iseg\nstep = daily\npath = {}\n",
            dir.join(name).display()
        );
        let cfg = ConfigFile::parse(&text).unwrap();
        DatasetConfig::from_section(cfg.section(name).unwrap()).unwrap()
    }

    pub(crate) fn inline_md(centre: u32, day: u32, payload: &[u8]) -> Metadata {
        let mut md = Metadata::new();
        md.set(Origin::grib1(Some(centre), Some(0), Some(101)));
        md.set(Product::grib1(Some(centre), Some(140), Some(229)));
        md.set(Reftime::position(Time::new(2007, 7, day, 13, 0, 0)));
        md.set_source(Source::inline("grib", payload.len() as u64));
        md.set_inline_data(payload.to_vec());
        md
    }

    #[test]
    fn test_acquire_flush_query() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path(), "testds");
        let mut writer = IsegWriter::open(&cfg).unwrap();

        let mut md = inline_md(200, 8, b"GRIB-payload-1");
        assert_eq!(writer.acquire(&mut md).unwrap(), AcquireOutcome::Acquired);
        assert_eq!(md.assigned_dataset().unwrap().name, "testds");
        writer.flush().unwrap();

        // The segment landed where the step function says.
        let seg = cfg.path.join("2007/07-08.grib");
        assert_eq!(std::fs::read(&seg).unwrap(), b"GRIB-payload-1");
        // The dataset carries its config copy.
        assert!(cfg.path.join("config").exists());

        // Query round-trip: the stored datum comes back byte-identical.
        let reader = IsegReader::open(&cfg).unwrap();
        let mut results = Vec::new();
        crate::dataset::Reader::query_data(
            &reader,
            &DataQuery::new(Matcher::parse("origin:GRIB1,200").unwrap()),
            &mut |md| {
                results.push(md);
                Ok(true)
            },
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get_data().unwrap(), b"GRIB-payload-1");
    }

    #[test]
    fn test_unflushed_batch_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path(), "testds");
        {
            let mut writer = IsegWriter::open(&cfg).unwrap();
            let mut md = inline_md(200, 8, &[0u8; 100]);
            writer.acquire(&mut md).unwrap();
            // Dropped without flush.
        }
        let seg = cfg.path.join("2007/07-08.grib");
        assert_eq!(std::fs::metadata(&seg).unwrap().len(), 0);

        let reader = IsegReader::open(&cfg).unwrap();
        let mut count = 0;
        crate::dataset::Reader::query_data(
            &reader,
            &DataQuery::new(Matcher::empty()),
            &mut |_| {
                count += 1;
                Ok(true)
            },
        )
        .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_duplicate_without_replace() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path(), "testds");
        let mut writer = IsegWriter::open(&cfg).unwrap();

        let mut first = inline_md(200, 8, b"GRIB-a");
        assert_eq!(writer.acquire(&mut first).unwrap(), AcquireOutcome::Acquired);
        let mut dup = inline_md(200, 8, b"GRIB-b");
        assert_eq!(writer.acquire(&mut dup).unwrap(), AcquireOutcome::Duplicate);
        // The rejected metadata still points at its original data.
        assert!(matches!(dup.source(), Some(Source::Inline { .. })));
        writer.flush().unwrap();

        let seg = cfg.path.join("2007/07-08.grib");
        assert_eq!(std::fs::read(&seg).unwrap(), b"GRIB-a");
    }

    #[test]
    fn test_replace_policy_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path(), "testds");
        cfg.replace = true;
        let mut writer = IsegWriter::open(&cfg).unwrap();

        let mut first = inline_md(200, 8, b"GRIB-a");
        writer.acquire(&mut first).unwrap();
        let mut second = inline_md(200, 8, b"GRIB-b");
        assert_eq!(
            writer.acquire(&mut second).unwrap(),
            AcquireOutcome::Acquired
        );
        writer.flush().unwrap();

        // Both byte ranges exist (repack reclaims the dead one), but only
        // the replacement is indexed.
        let reader = IsegReader::open(&cfg).unwrap();
        let mut results = Vec::new();
        crate::dataset::Reader::query_data(
            &reader,
            &DataQuery::new(Matcher::empty()),
            &mut |md| {
                results.push(md);
                Ok(true)
            },
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get_data().unwrap(), b"GRIB-b");
    }

    #[test]
    fn test_checker_states_and_repack() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path(), "testds");
        let mut writer = IsegWriter::open(&cfg).unwrap();
        // Two records in the same daily segment, different indexed tuples.
        let mut m1 = inline_md(200, 8, b"GRIB-a");
        let mut m2 = inline_md(80, 8, b"GRIB-bb");
        writer.acquire(&mut m1).unwrap();
        writer.acquire(&mut m2).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let checker = IsegChecker::open(&cfg).unwrap();
        let states = checker.segment_states().unwrap();
        assert_eq!(states.len(), 1);
        assert!(states.iter().all(|(_, state)| state.is_ok()), "{states:?}");

        // Drop one record from the index: its bytes become unaccounted.
        checker.index().remove("2007/07-08.grib", 0).unwrap();
        let states = checker.segment_states().unwrap();
        let bad = states
            .iter()
            .find(|(rel, _)| rel == "2007/07-08.grib")
            .unwrap();
        assert!(bad.1.has(segment::SEGMENT_DIRTY));

        // After a repack the segment is clean again.
        checker.repack_segment("2007/07-08.grib").unwrap();
        let states = checker.segment_states().unwrap();
        assert!(states.iter().all(|(_, state)| state.is_ok()), "{states:?}");
    }

    #[test]
    fn test_checker_age_flags() {
        let _guard = crate::runtime::TEST_CLOCK_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path(), "testds");
        cfg.archive_age_days = Some(7);
        cfg.delete_age_days = Some(30);

        let mut writer = IsegWriter::open(&cfg).unwrap();
        let mut md = inline_md(200, 8, b"GRIB-a");
        writer.acquire(&mut md).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let rt = crate::runtime::Runtime::get();
        let checker = IsegChecker::open(&cfg).unwrap();

        rt.set_reference_time(Some(Time::new(2007, 7, 10, 0, 0, 0)));
        let states = checker.segment_states().unwrap();
        assert!(states[0].1.is_ok());

        rt.set_reference_time(Some(Time::new(2007, 7, 20, 0, 0, 0)));
        let states = checker.segment_states().unwrap();
        assert!(states[0].1.has(segment::SEGMENT_ARCHIVE_AGE));

        rt.set_reference_time(Some(Time::new(2007, 9, 1, 0, 0, 0)));
        let states = checker.segment_states().unwrap();
        assert!(states[0].1.has(segment::SEGMENT_DELETE_AGE));

        rt.set_reference_time(None);
    }

    #[test]
    fn test_checker_finds_unindexed_segment() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path(), "testds");
        let _writer = IsegWriter::open(&cfg).unwrap();

        std::fs::create_dir_all(cfg.path.join("2007")).unwrap();
        std::fs::write(cfg.path.join("2007/07-08.grib"), b"GRIB-x").unwrap();

        let checker = IsegChecker::open(&cfg).unwrap();
        let states = checker.segment_states().unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].0, "2007/07-08.grib");
        assert!(states[0].1.has(segment::SEGMENT_UNALIGNED));
    }

    #[test]
    fn test_delete_segment() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path(), "testds");
        let mut writer = IsegWriter::open(&cfg).unwrap();
        let mut md = inline_md(200, 8, b"GRIB-a");
        writer.acquire(&mut md).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let checker = IsegChecker::open(&cfg).unwrap();
        checker.delete_segment("2007/07-08.grib").unwrap();
        assert!(!cfg.path.join("2007/07-08.grib").exists());
        assert_eq!(checker.index().count().unwrap(), 0);
        assert!(checker.segment_states().unwrap().is_empty());
    }

    #[test]
    fn test_indexed_codes_follow_config() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!(
            "[slim]\ntype = iseg\nstep = daily\npath = {}\nindex = origin, reftime2\n",
            dir.path().join("slim").display()
        );
        // A bad index spec is a parse error.
        let cfg = ConfigFile::parse(&text).unwrap();
        assert!(DatasetConfig::from_section(cfg.section("slim").unwrap()).is_err());

        let text = format!(
            "[slim]\ntype = iseg\nstep = daily\npath = {}\nindex = origin, product\n",
            dir.path().join("slim").display()
        );
        let cfg = ConfigFile::parse(&text).unwrap();
        let ds = DatasetConfig::from_section(cfg.section("slim").unwrap()).unwrap();
        assert_eq!(ds.indexed, vec![Code::Origin, Code::Product]);
    }
}
