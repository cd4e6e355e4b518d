//! Sidecar-only datasets: segments plus `.metadata`/`.summary` files, no
//! SQLite index.
//!
//! The error dataset uses this layout too: everything that failed dispatch
//! must remain retrievable even when the database layer is the thing that
//! is broken.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::warn;

use crate::core::transaction::TransactionChain;
use crate::error::{ArkiError, Result};
use crate::index::DataQuery;
use crate::matcher::Matcher;
use crate::metadata::{Collection, Metadata};
use crate::segment::{self, data::AppendSession};
use crate::summary::Summary;

use super::{AcquireOutcome, DatasetConfig, Writer};

pub struct SimpleWriter {
    cfg: DatasetConfig,
    sessions: Vec<AppendSession>,
    /// Metadata staged per segment, appended to the sidecars on flush.
    staged: BTreeMap<String, Collection>,
}

impl SimpleWriter {
    pub fn open(cfg: &DatasetConfig) -> Result<SimpleWriter> {
        std::fs::create_dir_all(&cfg.path).map_err(|e| ArkiError::io(&cfg.path, e))?;
        Ok(SimpleWriter {
            cfg: cfg.clone(),
            sessions: Vec::new(),
            staged: BTreeMap::new(),
        })
    }
}

impl Writer for SimpleWriter {
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

        let session = match self.sessions.iter().position(|s| s.relpath() == relpath) {
            Some(pos) => &mut self.sessions[pos],
            None => {
                self.sessions
                    .push(AppendSession::open(&self.cfg.path, &relpath, &format)?);
                self.sessions.last_mut().unwrap()
            }
        };
        session.append(md, &data)?;
        md.set_assigned_dataset(&self.cfg.name);
        self.staged.entry(relpath).or_default().push(md.clone());
        Ok(AcquireOutcome::Acquired)
    }

    fn flush(&mut self) -> Result<()> {
        let mut chain = TransactionChain::new();
        for session in self.sessions.drain(..) {
            chain.push(Box::new(session.into_transaction()));
        }
        chain.into_pending().commit()?;

        // Data is durable: extend the sidecars.
        for (relpath, fresh) in std::mem::take(&mut self.staged) {
            let data_path = self.cfg.path.join(&relpath);
            let md_path = segment::metadata_path(&data_path);
            let mut coll = if md_path.exists() {
                Collection::read_from_file(&md_path)?
            } else {
                Collection::new()
            };
            for md in fresh {
                coll.push(md);
            }
            coll.write_to_file(&md_path)?;
            coll.summary()
                .write_to_file(&segment::summary_path(&data_path))?;
        }
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.staged.clear();
        let mut chain = TransactionChain::new();
        for session in self.sessions.drain(..) {
            chain.push(Box::new(session.into_transaction()));
        }
        chain.into_pending().rollback()
    }
}

impl Drop for SimpleWriter {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            if let Err(e) = self.discard() {
                warn!(dataset = %self.cfg.name, "discarding unflushed batch failed: {e}");
            }
        }
    }
}

// ── Reader ─────────────────────────────────────────────────────────

pub struct SimpleReader {
    cfg: DatasetConfig,
}

impl SimpleReader {
    pub fn open(cfg: &DatasetConfig) -> Result<SimpleReader> {
        Ok(SimpleReader { cfg: cfg.clone() })
    }

    fn sidecars(&self) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        collect_sidecars(&self.cfg.path, &mut found)?;
        found.sort();
        Ok(found)
    }
}

fn collect_sidecars(dir: &std::path::Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ArkiError::io(dir, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| ArkiError::io(dir, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_sidecars(&path, found)?;
        } else if name.ends_with(".metadata") {
            found.push(path);
        }
    }
    Ok(())
}

impl super::Reader for SimpleReader {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn query_data(
        &self,
        query: &DataQuery,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        let mut emit_all = |consumer: &mut dyn FnMut(Metadata) -> Result<bool>| -> Result<()> {
            for sidecar in self.sidecars()? {
                let coll = Collection::read_from_file(&sidecar)?;
                for md in coll {
                    if !query.matcher.matches(&md) {
                        continue;
                    }
                    let mut md = md;
                    if query.with_data {
                        md.inline_from_source()?;
                    }
                    if !consumer(md)? {
                        return Ok(());
                    }
                }
            }
            Ok(())
        };
        match &query.sorter {
            None => emit_all(consumer),
            Some(expr) => {
                let cmp = crate::metadata::sort::Comparator::parse(expr)?;
                let mut all = Vec::new();
                emit_all(&mut |md| {
                    all.push(md);
                    Ok(true)
                })?;
                all.sort_by(|a, b| cmp.compare(a, b));
                for md in all {
                    if !consumer(md)? {
                        break;
                    }
                }
                Ok(())
            }
        }
    }

    fn query_summary(&self, matcher: &Matcher, summary: &mut Summary) -> Result<()> {
        for sidecar in self.sidecars()? {
            let summary_file = sidecar.with_extension("summary");
            let segment_summary = if summary_file.exists() {
                Summary::read_from_file(&summary_file)?
            } else {
                Collection::read_from_file(&sidecar)?.summary()
            };
            summary.merge(&segment_summary.filter(matcher));
        }
        Ok(())
    }
}

/// Basic consistency pass for sidecar datasets: every segment's contents
/// must agree with its `.metadata` sidecar.
pub fn check_segments(cfg: &DatasetConfig) -> Result<Vec<(String, segment::State)>> {
    let mut states = Vec::new();
    let mut sidecars = Vec::new();
    collect_sidecars(&cfg.path, &mut sidecars)?;
    for sidecar in sidecars {
        let coll = Collection::read_from_file(&sidecar)?;
        let data_path = PathBuf::from(
            sidecar
                .to_string_lossy()
                .trim_end_matches(".metadata")
                .to_string(),
        );
        let state = segment::check(&data_path, &coll, segment::DEFAULT_MAX_GAP)?;
        let rel = data_path
            .strip_prefix(&cfg.path)
            .unwrap_or(&data_path)
            .to_string_lossy()
            .into_owned();
        states.push((rel, state));
    }
    Ok(states)
}

// ── Tests ──────────────────────────────────────────────────────────
