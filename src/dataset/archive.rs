//! Archived segments: the `.archive/last` hierarchy of an `ondisk2`
//! dataset.
//!
//! Archived segments leave the SQLite index; their `.metadata` sidecars
//! become the source of truth, and queries over the dataset union the live
//! index with the archive sidecars.

use std::path::{Path, PathBuf};

use crate::error::{ArkiError, Result};
use crate::index::DataQuery;
use crate::matcher::Matcher;
use crate::metadata::{Collection, Metadata};
use crate::summary::Summary;

use super::iseg::IsegReader;
use super::DatasetConfig;

pub fn archive_root(ds_root: &Path) -> PathBuf {
    ds_root.join(".archive").join("last")
}

pub fn archive_path(ds_root: &Path, relpath: &str) -> PathBuf {
    archive_root(ds_root).join(relpath)
}

/// The `.metadata` sidecars under the archive, recursively.
fn sidecar_paths(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    collect_sidecars(root, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_sidecars(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ArkiError::io(dir, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| ArkiError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_sidecars(&path, found)?;
        } else if path.to_string_lossy().ends_with(".metadata") {
            found.push(path);
        }
    }
    Ok(())
}

/// Reader over the archive hierarchy alone.
pub struct ArchiveReader {
    root: PathBuf,
}

impl ArchiveReader {
    pub fn new(ds_root: &Path) -> ArchiveReader {
        ArchiveReader {
            root: archive_root(ds_root),
        }
    }

    pub fn query_data(
        &self,
        query: &DataQuery,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        for sidecar in sidecar_paths(&self.root)? {
            // Prune whole segments through their summary when the query
            // has reference time bounds.
            let summary_file = sidecar.with_extension("summary");
            if summary_file.exists() {
                let summary = Summary::read_from_file(&summary_file)?;
                if !summary.matches(&query.matcher) {
                    continue;
                }
            }
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
    }

    pub fn query_summary(&self, matcher: &Matcher, summary: &mut Summary) -> Result<()> {
        for sidecar in sidecar_paths(&self.root)? {
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

/// `ondisk2` reader: live index plus archived segments.
pub struct ArchivingReader {
    inner: IsegReader,
    archive: ArchiveReader,
    name: String,
}

impl ArchivingReader {
    pub fn open(cfg: &DatasetConfig) -> Result<ArchivingReader> {
        Ok(ArchivingReader {
            inner: IsegReader::open(cfg)?,
            archive: ArchiveReader::new(&cfg.path),
            name: cfg.name.clone(),
        })
    }
}

impl super::Reader for ArchivingReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn query_data(
        &self,
        query: &DataQuery,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        match &query.sorter {
            None => {
                // Archived data is older: emit it first.
                self.archive.query_data(query, consumer)?;
                super::Reader::query_data(&self.inner, query, consumer)
            }
            Some(expr) => {
                let cmp = crate::metadata::sort::Comparator::parse(expr)?;
                let mut all = Vec::new();
                let mut collect = |md: Metadata| {
                    all.push(md);
                    Ok(true)
                };
                let unsorted = DataQuery {
                    matcher: query.matcher.clone(),
                    with_data: query.with_data,
                    sorter: None,
                };
                self.archive.query_data(&unsorted, &mut collect)?;
                super::Reader::query_data(&self.inner, &unsorted, &mut collect)?;
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
        self.archive.query_summary(matcher, summary)?;
        super::Reader::query_summary(&self.inner, matcher, summary)
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::iseg::tests::{inline_md, test_config};
    use crate::dataset::iseg::{IsegChecker, IsegWriter};
    use crate::dataset::{Reader, Writer};

    #[test]
    fn test_archive_then_query_union() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path(), "testds");
        let mut writer = IsegWriter::open(&cfg).unwrap();
        let mut old = inline_md(200, 1, b"GRIB-old");
        let mut new = inline_md(200, 20, b"GRIB-new");
        writer.acquire(&mut old).unwrap();
        writer.acquire(&mut new).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let checker = IsegChecker::open(&cfg).unwrap();
        checker.archive_segment("2007/07-01.grib").unwrap();
        assert!(archive_path(&cfg.path, "2007/07-01.grib").exists());
        assert!(!cfg.path.join("2007/07-01.grib").exists());
        assert_eq!(checker.index().count().unwrap(), 1);

        let reader = ArchivingReader::open(&cfg).unwrap();
        let mut results = Vec::new();
        reader
            .query_data(&DataQuery::new(Matcher::empty()), &mut |md| {
                results.push(md);
                Ok(true)
            })
            .unwrap();
        assert_eq!(results.len(), 2);
        // Archived data still readable through its rebased source.
        assert_eq!(results[0].get_data().unwrap(), b"GRIB-old");
        assert_eq!(results[1].get_data().unwrap(), b"GRIB-new");

        let mut summary = Summary::new();
        reader.query_summary(&Matcher::empty(), &mut summary).unwrap();
        assert_eq!(summary.count(), 2);
    }

    #[test]
    fn test_archive_summary_prunes_queries() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path(), "testds");
        let mut writer = IsegWriter::open(&cfg).unwrap();
        let mut old = inline_md(200, 1, b"GRIB-old");
        writer.acquire(&mut old).unwrap();
        writer.flush().unwrap();
        drop(writer);

        IsegChecker::open(&cfg)
            .unwrap()
            .archive_segment("2007/07-01.grib")
            .unwrap();

        let archive = ArchiveReader::new(&cfg.path);
        let mut count = 0;
        archive
            .query_data(
                &DataQuery::new(Matcher::parse("reftime:=2010").unwrap()),
                &mut |_| {
                    count += 1;
                    Ok(true)
                },
            )
            .unwrap();
        assert_eq!(count, 0);
    }
}
