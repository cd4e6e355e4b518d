//! On-disk summary cache: `.summaries/YYYY-MM.summary` and
//! `.summaries/all.summary` under the dataset root.
//!
//! Month files hold the summary of the data whose reference time falls in
//! that month; `all.summary` aggregates the whole dataset. Files are built
//! lazily on summary queries and deleted eagerly whenever the index mutates
//! data in the corresponding month.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::summary::Summary;
use crate::types::Time;
use crate::utils;

pub const CACHE_DIR: &str = ".summaries";

pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

pub fn month_path(root: &Path, ye: i32, mo: u32) -> PathBuf {
    cache_dir(root).join(format!("{ye:04}-{mo:02}.summary"))
}

pub fn all_path(root: &Path) -> PathBuf {
    cache_dir(root).join("all.summary")
}

/// Load a cached month summary if present.
pub fn read_month(root: &Path, ye: i32, mo: u32) -> Result<Option<Summary>> {
    let path = month_path(root, ye, mo);
    if !path.exists() {
        return Ok(None);
    }
    Summary::read_from_file(&path).map(Some)
}

pub fn write_month(root: &Path, ye: i32, mo: u32, summary: &Summary) -> Result<()> {
    summary.write_to_file(&month_path(root, ye, mo))
}

pub fn read_all(root: &Path) -> Result<Option<Summary>> {
    let path = all_path(root);
    if !path.exists() {
        return Ok(None);
    }
    Summary::read_from_file(&path).map(Some)
}

pub fn write_all(root: &Path, summary: &Summary) -> Result<()> {
    summary.write_to_file(&all_path(root))
}

/// Drop the cache entries affected by a mutation at `reftime`: the month
/// file and the whole-dataset rollup.
pub fn invalidate(root: &Path, reftime: &Time) -> Result<()> {
    utils::remove_if_exists(&month_path(root, reftime.ye, reftime.mo))?;
    utils::remove_if_exists(&all_path(root))
}

/// Drop the whole cache (used by index rebuilds).
pub fn invalidate_all(root: &Path) -> Result<()> {
    let dir = cache_dir(root);
    match std::fs::read_dir(&dir) {
        Ok(entries) => {
            for entry in entries {
                let entry = entry.map_err(|e| crate::error::ArkiError::io(&dir, e))?;
                utils::remove_if_exists(&entry.path())?;
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(crate::error::ArkiError::io(&dir, e)),
    }
}

/// The months `[begin, end]` touches, in order.
pub fn months_in(begin: &Time, end: &Time) -> Vec<(i32, u32)> {
    let mut months = Vec::new();
    let mut cursor = begin.start_of_month();
    let stop = end.start_of_month();
    while cursor <= stop {
        months.push((cursor.ye, cursor.mo));
        cursor = cursor.next_month();
    }
    months
}

// ── Tests ──────────────────────────────────────────────────────────
