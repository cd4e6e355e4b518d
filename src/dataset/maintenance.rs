//! Maintenance over dataset segments.
//!
//! A state scan classifies every segment; an agent decides what to do with
//! each. The full agents perform the minimal fix per state, the report
//! agents only count. Per-segment failures are collected so one broken
//! segment does not abort the traversal.

use tracing::{info, warn};

use crate::error::Result;
use crate::runtime::Runtime;
use crate::segment::{self, State};

use super::iseg::IsegChecker;

/// The minimal fix for a segment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// Contents disagree with the index: rescan the file.
    Rescan,
    /// Space to reclaim or order to restore: rewrite the segment.
    Repack,
    /// Known to the index but gone from disk: forget it.
    Deindex,
    /// Old enough for the archive.
    Archive,
    /// Old enough, or fully deleted: remove.
    Delete,
}

pub fn plan(state: State) -> Action {
    if state.is_ok() {
        Action::None
    } else if state.has(segment::SEGMENT_MISSING) {
        Action::Deindex
    } else if state.has(segment::SEGMENT_DELETE_AGE) || state.has(segment::SEGMENT_DELETED) {
        Action::Delete
    } else if state.has(segment::SEGMENT_ARCHIVE_AGE) {
        Action::Archive
    } else if state.has(segment::SEGMENT_UNALIGNED) || state.has(segment::SEGMENT_CORRUPTED) {
        Action::Rescan
    } else {
        debug_assert!(state.has(segment::SEGMENT_DIRTY));
        Action::Repack
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub ok: usize,
    pub rescanned: usize,
    pub repacked: usize,
    pub deindexed: usize,
    pub archived: usize,
    pub deleted: usize,
}

pub trait MaintenanceAgent {
    /// Visit one segment with its computed state.
    fn on_segment(&mut self, checker: &IsegChecker, relpath: &str, state: State) -> Result<()>;

    /// Called once after the traversal.
    fn finish(&mut self, _checker: &IsegChecker) -> Result<()> {
        Ok(())
    }

    fn counters(&self) -> Counters;
}

/// Perform every applicable fix.
#[derive(Default)]
pub struct FullMaintenance {
    counters: Counters,
}

impl MaintenanceAgent for FullMaintenance {
    fn on_segment(&mut self, checker: &IsegChecker, relpath: &str, state: State) -> Result<()> {
        match plan(state) {
            Action::None => self.counters.ok += 1,
            Action::Rescan => {
                checker.rescan_segment(relpath)?;
                info!(segment = relpath, "rescanned");
                self.counters.rescanned += 1;
            }
            Action::Repack => {
                checker.repack_segment(relpath)?;
                info!(segment = relpath, "repacked");
                self.counters.repacked += 1;
            }
            Action::Deindex => {
                checker.remove_from_index(relpath)?;
                info!(segment = relpath, "removed from index");
                self.counters.deindexed += 1;
            }
            Action::Archive => {
                checker.archive_segment(relpath)?;
                info!(segment = relpath, "archived");
                self.counters.archived += 1;
            }
            Action::Delete => {
                checker.delete_segment(relpath)?;
                info!(segment = relpath, "deleted");
                self.counters.deleted += 1;
            }
        }
        Ok(())
    }

    fn finish(&mut self, checker: &IsegChecker) -> Result<()> {
        checker.rebuild_summary_cache()
    }

    fn counters(&self) -> Counters {
        self.counters
    }
}

/// Dry run: log and count what full maintenance would do.
#[derive(Default)]
pub struct MaintenanceReport {
    counters: Counters,
}

impl MaintenanceAgent for MaintenanceReport {
    fn on_segment(&mut self, _checker: &IsegChecker, relpath: &str, state: State) -> Result<()> {
        match plan(state) {
            Action::None => self.counters.ok += 1,
            Action::Rescan => {
                info!(segment = relpath, %state, "would rescan");
                self.counters.rescanned += 1;
            }
            Action::Repack => {
                info!(segment = relpath, %state, "would repack");
                self.counters.repacked += 1;
            }
            Action::Deindex => {
                info!(segment = relpath, %state, "would remove from index");
                self.counters.deindexed += 1;
            }
            Action::Archive => {
                info!(segment = relpath, %state, "would archive");
                self.counters.archived += 1;
            }
            Action::Delete => {
                info!(segment = relpath, %state, "would delete");
                self.counters.deleted += 1;
            }
        }
        Ok(())
    }

    fn counters(&self) -> Counters {
        self.counters
    }
}

/// Perform only the repack-equivalent actions (repack, delete); anything
/// needing a rescan is left for full maintenance.
#[derive(Default)]
pub struct FullRepack {
    counters: Counters,
}

impl MaintenanceAgent for FullRepack {
    fn on_segment(&mut self, checker: &IsegChecker, relpath: &str, state: State) -> Result<()> {
        match plan(state) {
            Action::Repack => {
                checker.repack_segment(relpath)?;
                self.counters.repacked += 1;
            }
            Action::Delete => {
                checker.delete_segment(relpath)?;
                self.counters.deleted += 1;
            }
            Action::None => self.counters.ok += 1,
            _ => {}
        }
        Ok(())
    }

    fn counters(&self) -> Counters {
        self.counters
    }
}

/// Dry run of [`FullRepack`].
#[derive(Default)]
pub struct RepackReport {
    counters: Counters,
}

impl MaintenanceAgent for RepackReport {
    fn on_segment(&mut self, _checker: &IsegChecker, relpath: &str, state: State) -> Result<()> {
        match plan(state) {
            Action::Repack => {
                info!(segment = relpath, %state, "would repack");
                self.counters.repacked += 1;
            }
            Action::Delete => {
                info!(segment = relpath, %state, "would delete");
                self.counters.deleted += 1;
            }
            Action::None => self.counters.ok += 1,
            _ => {}
        }
        Ok(())
    }

    fn counters(&self) -> Counters {
        self.counters
    }
}

/// Run an agent over every segment of a dataset. Per-segment failures are
/// returned, not propagated; a shutdown request interrupts the traversal.
pub fn visit(
    checker: &IsegChecker,
    agent: &mut dyn MaintenanceAgent,
) -> Result<Vec<(String, String)>> {
    let mut failures = Vec::new();
    for (relpath, state) in checker.segment_states()? {
        Runtime::get().check_shutdown()?;
        if let Err(e) = agent.on_segment(checker, &relpath, state) {
            warn!(segment = %relpath, "maintenance failed: {e}");
            failures.push((relpath, e.to_string()));
        }
    }
    agent.finish(checker)?;
    Ok(failures)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::iseg::tests::{inline_md, test_config};
    use crate::dataset::iseg::IsegWriter;
    use crate::dataset::Writer as _;

    #[test]
    fn test_plan() {
        use crate::segment::*;
        assert_eq!(plan(State::OK), Action::None);
        assert_eq!(plan(State::new(SEGMENT_DIRTY)), Action::Repack);
        assert_eq!(plan(State::new(SEGMENT_UNALIGNED)), Action::Rescan);
        assert_eq!(plan(State::new(SEGMENT_CORRUPTED)), Action::Rescan);
        assert_eq!(plan(State::new(SEGMENT_MISSING)), Action::Deindex);
        assert_eq!(plan(State::new(SEGMENT_ARCHIVE_AGE)), Action::Archive);
        assert_eq!(plan(State::new(SEGMENT_DELETE_AGE)), Action::Delete);
        // Age dominates content state.
        assert_eq!(
            plan(State::new(SEGMENT_DIRTY | SEGMENT_DELETE_AGE)),
            Action::Delete
        );
    }

    fn seeded_checker(dir: &std::path::Path) -> IsegChecker {
        let cfg = test_config(dir, "maintds");
        let mut writer = IsegWriter::open(&cfg).unwrap();
        let mut m1 = inline_md(200, 8, b"GRIB-a");
        let mut m2 = inline_md(80, 8, b"GRIB-bb");
        writer.acquire(&mut m1).unwrap();
        writer.acquire(&mut m2).unwrap();
        writer.flush().unwrap();
        drop(writer);
        IsegChecker::open(&cfg).unwrap()
    }

    #[test]
    fn test_report_then_full_maintenance_fixes_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let checker = seeded_checker(dir.path());

        // Orphan the first record: the segment needs a repack.
        checker.index().remove("2007/07-08.grib", 0).unwrap();

        let mut report = MaintenanceReport::default();
        visit(&checker, &mut report).unwrap();
        assert_eq!(report.counters().repacked, 1);
        // Dry run changed nothing.
        assert_eq!(
            std::fs::read(checker.config().path.join("2007/07-08.grib")).unwrap(),
            b"GRIB-aGRIB-bb"
        );

        let mut full = FullMaintenance::default();
        let failures = visit(&checker, &mut full).unwrap();
        assert!(failures.is_empty());
        assert_eq!(full.counters().repacked, 1);
        assert_eq!(
            std::fs::read(checker.config().path.join("2007/07-08.grib")).unwrap(),
            b"GRIB-bb"
        );

        // A second pass has nothing to do.
        let mut again = FullMaintenance::default();
        visit(&checker, &mut again).unwrap();
        assert_eq!(again.counters(), Counters { ok: 1, ..Default::default() });
    }

    #[test]
    fn test_missing_segment_is_deindexed() {
        let dir = tempfile::tempdir().unwrap();
        let checker = seeded_checker(dir.path());
        std::fs::remove_file(checker.config().path.join("2007/07-08.grib")).unwrap();
        crate::segment::reader::invalidate(&checker.config().path.join("2007/07-08.grib"));

        let mut full = FullMaintenance::default();
        visit(&checker, &mut full).unwrap();
        assert_eq!(full.counters().deindexed, 1);
        assert_eq!(checker.index().count().unwrap(), 0);
    }

    #[test]
    fn test_repack_agent_ignores_unaligned() {
        let dir = tempfile::tempdir().unwrap();
        let checker = seeded_checker(dir.path());
        // Unindexed data on disk would need a rescan, which FullRepack
        // does not perform.
        std::fs::write(checker.config().path.join("2007/07-09.grib"), b"GRIB-x").unwrap();

        let mut repack = FullRepack::default();
        visit(&checker, &mut repack).unwrap();
        assert_eq!(repack.counters().rescanned, 0);
        assert!(checker.config().path.join("2007/07-09.grib").exists());
    }
}
