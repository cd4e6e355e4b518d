//! SQLite-backed dataset index.
//!
//! One database per dataset maps every stored datum to its segment and
//! offset, together with the ids of its indexed attributes. Attribute
//! payloads live in per-type sub-indices; every distinct indexed tuple has
//! one row in the aggregate table, and `(aggregate id, reftime)` is the
//! uniqueness predicate the replace policy acts on.
//!
//! All mutations run inside `BEGIN IMMEDIATE` transactions; the busy
//! timeout retries take care of concurrent writers. Readers observe
//! consistent snapshots through WAL.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use crate::core::codec::Decoder;
use crate::core::transaction::Transaction;
use crate::error::{ArkiError, Result};
use crate::matcher::Matcher;
use crate::metadata::{Collection, Metadata};
use crate::summary::Summary;
use crate::types::{Code, Item, Note, Reftime, Source, Time};

pub mod aggregate;
pub mod attr;
pub mod summary_cache;

use aggregate::Aggregate;
use attr::AttrSet;

/// Attribute types indexed by default.
pub const DEFAULT_INDEXED: [Code; 7] = [
    Code::Origin,
    Code::Product,
    Code::Level,
    Code::Timerange,
    Code::Area,
    Code::Proddef,
    Code::Run,
];

pub const INDEX_FILENAME: &str = "index.sqlite";

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// A query for data, with optional sort and data inlining.
#[derive(Debug, Clone, Default)]
pub struct DataQuery {
    pub matcher: Matcher,
    pub with_data: bool,
    pub sorter: Option<String>,
}

impl DataQuery {
    pub fn new(matcher: Matcher) -> DataQuery {
        DataQuery {
            matcher,
            with_data: false,
            sorter: None,
        }
    }
}

pub struct Index {
    root: PathBuf,
    conn: Arc<Mutex<Connection>>,
    codes: Vec<Code>,
    attrs: Mutex<AttrSet>,
    aggregate: Mutex<Aggregate>,
}

impl Index {
    /// Open (creating if needed) the index of the dataset rooted at `root`.
    pub fn open(root: &Path, codes: &[Code]) -> Result<Index> {
        std::fs::create_dir_all(root).map_err(|e| ArkiError::io(root, e))?;
        let path = root.join(INDEX_FILENAME);
        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "page_size", 4096)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        AttrSet::init_tables(&conn, codes)?;
        Aggregate::init_table(&conn, codes)?;

        let attr_columns: Vec<String> = codes
            .iter()
            .map(|c| format!("{} INTEGER NOT NULL", c.name()))
            .collect();
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS md (
                    id INTEGER PRIMARY KEY,
                    uniq INTEGER NOT NULL,
                    format TEXT NOT NULL,
                    file TEXT NOT NULL,
                    offset INTEGER NOT NULL,
                    size INTEGER NOT NULL,
                    notes BLOB,
                    reftime TEXT NOT NULL,
                    {})",
                attr_columns.join(",\n                    ")
            ),
            [],
        )?;
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS md_idx_file_offset ON md (file, offset)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS md_idx_reftime ON md (reftime)",
            [],
        )?;
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS md_idx_uniq_reftime ON md (uniq, reftime)",
            [],
        )?;

        Ok(Index {
            root: root.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
            codes: codes.to_vec(),
            attrs: Mutex::new(AttrSet::new()),
            aggregate: Mutex::new(Aggregate::new(codes)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn indexed_codes(&self) -> &[Code] {
        &self.codes
    }

    // ── Transactions ───────────────────────────────────────────────

    /// Start a write transaction, returning its commit/rollback handle.
    pub fn begin(&self) -> Result<IndexTransaction> {
        self.conn
            .lock()
            .unwrap()
            .execute_batch("BEGIN IMMEDIATE")?;
        Ok(IndexTransaction {
            conn: self.conn.clone(),
            done: false,
        })
    }

    // ── Mutations ──────────────────────────────────────────────────

    fn reftime_of(md: &Metadata) -> Result<Time> {
        md.reftime_interval()
            .map(|(begin, _)| begin)
            .ok_or_else(|| {
                ArkiError::Consistency("cannot index a metadata without a reference time".into())
            })
    }

    fn attr_ids(&self, conn: &Connection, md: &Metadata) -> Result<Vec<i64>> {
        let mut attrs = self.attrs.lock().unwrap();
        self.codes
            .iter()
            .map(|code| attrs.obtain(conn, *code, md.get(*code)))
            .collect()
    }

    fn insert_sql(&self, or_replace: bool) -> String {
        let names: Vec<&str> = self.codes.iter().map(|c| c.name()).collect();
        let mut placeholders = Vec::new();
        for n in 0..(7 + names.len()) {
            placeholders.push(format!("?{}", n + 1));
        }
        format!(
            "INSERT {}INTO md (uniq, format, file, offset, size, notes, reftime, {}) VALUES ({})",
            if or_replace { "OR REPLACE " } else { "" },
            names.join(", "),
            placeholders.join(", ")
        )
    }

    fn do_insert(
        &self,
        md: &Metadata,
        relpath: &str,
        offset: u64,
        size: u64,
        or_replace: bool,
    ) -> Result<()> {
        let reftime = Self::reftime_of(md)?;
        let format = md
            .source()
            .map(|s| s.format().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let notes = encode_notes(md.notes());

        let conn = self.conn.lock().unwrap();
        let ids = self.attr_ids(&conn, md)?;
        let uniq = self.aggregate.lock().unwrap().obtain(&conn, &ids)?;

        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(uniq),
            Box::new(format),
            Box::new(relpath.to_string()),
            Box::new(offset as i64),
            Box::new(size as i64),
            Box::new(notes),
            Box::new(reftime.to_sql()),
        ];
        for id in &ids {
            values.push(Box::new(*id));
        }
        let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let result = conn.execute(&self.insert_sql(or_replace), params.as_slice());
        drop(conn);
        match result {
            Ok(_) => {
                summary_cache::invalidate(&self.root, &reftime)?;
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, msg))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(ArkiError::Duplicate(format!(
                    "{relpath}:{offset}: {}",
                    msg.unwrap_or_else(|| "uniqueness constraint".to_string())
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Index one datum. Fails with a duplicate error when `(file, offset)`
    /// or the uniqueness predicate collides.
    pub fn insert(&self, md: &Metadata, relpath: &str, offset: u64, size: u64) -> Result<()> {
        self.do_insert(md, relpath, offset, size, false)
    }

    /// Index one datum, superseding any row with the same uniqueness
    /// predicate. The old datum's bytes stay in their segment until repack.
    pub fn replace(&self, md: &Metadata, relpath: &str, offset: u64, size: u64) -> Result<()> {
        self.do_insert(md, relpath, offset, size, true)
    }

    /// Drop one datum from the index.
    pub fn remove(&self, relpath: &str, offset: u64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let reftime: Option<String> = conn
            .query_row(
                "SELECT reftime FROM md WHERE file = ?1 AND offset = ?2",
                params![relpath, offset as i64],
                |row| row.get(0),
            )
            .optional()?;
        conn.execute(
            "DELETE FROM md WHERE file = ?1 AND offset = ?2",
            params![relpath, offset as i64],
        )?;
        drop(conn);
        if let Some(reftime) = reftime {
            summary_cache::invalidate(&self.root, &Time::parse(&reftime)?)?;
        }
        Ok(())
    }

    /// Drop every row of a segment, returning how many were removed.
    pub fn remove_segment(&self, relpath: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let mut months = Vec::new();
        {
            let mut stmt =
                conn.prepare("SELECT DISTINCT substr(reftime, 1, 7) FROM md WHERE file = ?1")?;
            let mut rows = stmt.query(params![relpath])?;
            while let Some(row) = rows.next()? {
                months.push(row.get::<_, String>(0)?);
            }
        }
        let removed = conn.execute("DELETE FROM md WHERE file = ?1", params![relpath])?;
        drop(conn);
        for month in months {
            if let Some((ye, mo)) = month.split_once('-') {
                if let (Ok(ye), Ok(mo)) = (ye.parse(), mo.parse()) {
                    crate::utils::remove_if_exists(&summary_cache::month_path(
                        &self.root, ye, mo,
                    ))?;
                }
            }
        }
        crate::utils::remove_if_exists(&summary_cache::all_path(&self.root))?;
        Ok(removed)
    }

    /// Reconcile a rescanned segment: replace its rows with `collection`.
    pub fn reindex_segment(&self, relpath: &str, collection: &Collection) -> Result<()> {
        let txn = self.begin()?;
        self.remove_segment(relpath)?;
        for md in collection.iter() {
            let (offset, size) = match md.source() {
                Some(Source::Blob { offset, size, .. }) => (*offset, *size),
                _ => {
                    return Err(ArkiError::Consistency(
                        "rescan produced a metadata without a blob source".into(),
                    ))
                }
            };
            self.insert(md, relpath, offset, size)?;
        }
        txn.commit_boxed()
    }

    // ── Queries ────────────────────────────────────────────────────

    fn row_columns(&self) -> String {
        let mut cols = vec![
            "format".to_string(),
            "file".to_string(),
            "offset".to_string(),
            "size".to_string(),
            "notes".to_string(),
            "reftime".to_string(),
        ];
        cols.extend(self.codes.iter().map(|c| c.name().to_string()));
        cols.join(", ")
    }

    fn metadata_from_row(&self, conn: &Connection, row: &rusqlite::Row) -> Result<Metadata> {
        self.metadata_from_row_at(conn, row, 0)
    }

    /// Translate the matcher into SQL constraints over the indexed columns.
    /// `Ok(None)` means the matcher provably selects nothing.
    fn sql_constraints(&self, matcher: &Matcher) -> Result<Option<String>> {
        let mut parts = Vec::new();
        let conn = self.conn.lock().unwrap();
        for clause in matcher.clauses() {
            if clause.code() == Code::Reftime {
                if let Some(sql) = clause.reftime_sql("reftime") {
                    parts.push(sql);
                }
                continue;
            }
            if self.codes.contains(&clause.code()) {
                let ids = self
                    .attrs
                    .lock()
                    .unwrap()
                    .match_ids(&conn, clause.code(), clause)?;
                if ids.is_empty() {
                    return Ok(None);
                }
                parts.push(attr::fmt_id_set(clause.code().name(), &ids));
            }
            // Clauses on unindexed types stay in the residual predicate.
        }
        Ok(Some(if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }))
    }

    /// Stream every metadata matching the query. The SQL answers what the
    /// indexed columns can; the full matcher is re-applied in process as
    /// the residual predicate.
    pub fn query_data(
        &self,
        query: &DataQuery,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        let where_clause = match self.sql_constraints(&query.matcher)? {
            Some(w) => w,
            None => return Ok(()),
        };

        let mut emit = |md: Metadata| -> Result<bool> {
            let mut md = md;
            if !query.matcher.matches(&md) {
                return Ok(true);
            }
            if query.with_data {
                md.inline_from_source()?;
            }
            consumer(md)
        };

        match &query.sorter {
            None => self.scan_rows(&where_clause, &mut emit),
            Some(expr) => {
                let cmp = crate::metadata::sort::Comparator::parse(expr)?;
                let mut sorter = crate::metadata::sort::Sorter::new(cmp, &mut emit);
                let mut feed = |md: Metadata| sorter.add(md);
                self.scan_rows(&where_clause, &mut feed)?;
                sorter.finish()
            }
        }
    }

    fn scan_rows(
        &self,
        where_clause: &str,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM md{} ORDER BY file, offset",
            self.row_columns(),
            where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let md = self.metadata_from_row(&conn, row)?;
            if !consumer(md)? {
                break;
            }
        }
        Ok(())
    }

    /// Aggregate a summary of the matching data, served from the on-disk
    /// month cache when the matcher only constrains the reference time.
    pub fn query_summary(&self, matcher: &Matcher, out: &mut Summary) -> Result<()> {
        if !matcher.is_reftime_only() {
            let mut add = |md: Metadata| {
                out.add(&md);
                Ok(true)
            };
            return self.query_data(&DataQuery::new(matcher.clone()), &mut add);
        }

        let (ds_min, ds_max) = match self.dataset_span()? {
            Some(span) => span,
            None => return Ok(()),
        };
        let (qlower, qupper) = matcher.date_range();

        if qlower.is_none() && qupper.is_none() {
            // Unbounded: use the whole-dataset rollup.
            let summary = match summary_cache::read_all(&self.root)? {
                Some(summary) => summary,
                None => {
                    let summary = self.compute_summary(&ds_min, &ds_max.next_second())?;
                    summary_cache::write_all(&self.root, &summary)?;
                    summary
                }
            };
            out.merge(&summary);
            return Ok(());
        }

        // Clamp the query months to the months the dataset spans, so only
        // cache files that can hold data get created.
        let begin = match qlower {
            Some(lower) => lower.max(ds_min),
            None => ds_min,
        };
        let end = match qupper {
            Some(upper) => upper.prev_second().min(ds_max),
            None => ds_max,
        };
        if begin > end {
            return Ok(());
        }
        for (ye, mo) in summary_cache::months_in(&begin, &end) {
            let month = match summary_cache::read_month(&self.root, ye, mo)? {
                Some(month) => month,
                None => {
                    let start = Time::new(ye, mo, 1, 0, 0, 0);
                    let month = self.compute_summary(&start, &start.next_month())?;
                    summary_cache::write_month(&self.root, ye, mo, &month)?;
                    month
                }
            };
            out.merge(&month.filter(matcher));
        }
        Ok(())
    }

    /// Aggregate the rows with `lower <= reftime < upper` directly.
    fn compute_summary(&self, lower: &Time, upper: &Time) -> Result<Summary> {
        let mut summary = Summary::new();
        let where_clause = format!(
            " WHERE reftime >= '{}' AND reftime < '{}'",
            lower.to_sql(),
            upper.to_sql()
        );
        self.scan_rows(&where_clause, &mut |md| {
            summary.add(&md);
            Ok(true)
        })?;
        Ok(summary)
    }

    /// For every distinct indexed tuple, emit its `n`-th chronological
    /// datum (0-based). Used by data-thinning queries.
    pub fn produce_nth(
        &self,
        n: usize,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT uniq, {} FROM md ORDER BY uniq, reftime, file, offset",
            self.row_columns()
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut current_uniq: Option<i64> = None;
        let mut position = 0usize;
        while let Some(row) = rows.next()? {
            let uniq: i64 = row.get(0)?;
            if current_uniq != Some(uniq) {
                current_uniq = Some(uniq);
                position = 0;
            } else {
                position += 1;
            }
            if position == n {
                let md = self.metadata_from_row_at(&conn, row, 1)?;
                if !consumer(md)? {
                    break;
                }
            }
        }
        Ok(())
    }

    fn metadata_from_row_at(
        &self,
        conn: &Connection,
        row: &rusqlite::Row,
        base: usize,
    ) -> Result<Metadata> {
        let format: String = row.get(base)?;
        let file: String = row.get(base + 1)?;
        let offset: i64 = row.get(base + 2)?;
        let size: i64 = row.get(base + 3)?;
        let notes: Option<Vec<u8>> = row.get(base + 4)?;
        let reftime: String = row.get(base + 5)?;

        let mut md = Metadata::new();
        let mut attrs = self.attrs.lock().unwrap();
        for (n, code) in self.codes.iter().enumerate() {
            let id: i64 = row.get(base + 6 + n)?;
            if id != 0 {
                md.set((*attrs.read(conn, *code, id)?).clone());
            }
        }
        drop(attrs);
        md.set(Reftime::position(Time::parse(&reftime)?));
        if let Some(notes) = notes {
            for note in decode_notes(&notes)? {
                md.set(Item::Note(note));
            }
        }
        md.set_source(Source::blob(
            format,
            self.root.to_string_lossy().into_owned(),
            file,
            offset as u64,
            size as u64,
        ));
        Ok(md)
    }

    // ── Segment-oriented access ────────────────────────────────────

    /// Relative paths of every segment the index knows, sorted.
    pub fn list_segments(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT file FROM md ORDER BY file")?;
        let mut rows = stmt.query([])?;
        let mut segments = Vec::new();
        while let Some(row) = rows.next()? {
            segments.push(row.get(0)?);
        }
        Ok(segments)
    }

    /// The ordered metadata collection the index declares for a segment.
    pub fn segment_metadata(&self, relpath: &str) -> Result<Collection> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM md WHERE file = ?1 ORDER BY offset",
            self.row_columns()
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![relpath])?;
        let mut coll = Collection::new();
        while let Some(row) = rows.next()? {
            coll.push(self.metadata_from_row(&conn, row)?);
        }
        Ok(coll)
    }

    /// Newest reference time stored for a segment.
    pub fn segment_max_reftime(&self, relpath: &str) -> Result<Option<Time>> {
        let conn = self.conn.lock().unwrap();
        let max: Option<String> = conn.query_row(
            "SELECT MAX(reftime) FROM md WHERE file = ?1",
            params![relpath],
            |row| row.get(0),
        )?;
        max.map(|s| Time::parse(&s)).transpose()
    }

    /// Oldest and newest reference time in the dataset.
    pub fn dataset_span(&self) -> Result<Option<(Time, Time)>> {
        let conn = self.conn.lock().unwrap();
        let span: (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(reftime), MAX(reftime) FROM md",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        match span {
            (Some(min), Some(max)) => Ok(Some((Time::parse(&min)?, Time::parse(&max)?))),
            _ => Ok(None),
        }
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM md", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn has(&self, relpath: &str, offset: u64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM md WHERE file = ?1 AND offset = ?2",
                params![relpath, offset as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

/// Commit/rollback handle over an open `BEGIN IMMEDIATE` transaction.
pub struct IndexTransaction {
    conn: Arc<Mutex<Connection>>,
    done: bool,
}

impl IndexTransaction {
    /// Commit without going through a `Pending`.
    pub fn commit_boxed(mut self) -> Result<()> {
        Transaction::commit(&mut self)
    }
}

impl Transaction for IndexTransaction {
    fn commit(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        self.conn.lock().unwrap().execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        self.conn.lock().unwrap().execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for IndexTransaction {
    fn drop(&mut self) {
        if !self.done {
            self.done = true;
            if let Err(e) = self.conn.lock().unwrap().execute_batch("ROLLBACK") {
                tracing::warn!("rollback of dropped index transaction failed: {e}");
            }
        }
    }
}

// ── Note blobs ─────────────────────────────────────────────────────

fn encode_notes(notes: &[Note]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut enc = crate::core::codec::Encoder::new(&mut buf);
    for note in notes {
        Item::Note(note.clone()).encode_with_envelope(&mut enc);
    }
    buf
}

fn decode_notes(raw: &[u8]) -> Result<Vec<Note>> {
    let mut dec = Decoder::new("notes blob", raw);
    let mut notes = Vec::new();
    while dec.remaining() > 0 {
        match Item::decode_envelope(&mut dec)? {
            Item::Note(note) => notes.push(note),
            other => {
                return Err(ArkiError::Consistency(format!(
                    "notes blob contains a {} item",
                    other.code()
                )))
            }
        }
    }
    Ok(notes)
}

// ── Time helpers for cache clamping ────────────────────────────────

trait TimeClampExt {
    fn next_second(&self) -> Time;
    fn prev_second(&self) -> Time;
}

impl TimeClampExt for Time {
    fn next_second(&self) -> Time {
        match self.to_chrono() {
            Some(dt) => Time::from_chrono(dt + chrono::Duration::seconds(1)),
            None => *self,
        }
    }

    fn prev_second(&self) -> Time {
        match self.to_chrono() {
            Some(dt) => Time::from_chrono(dt - chrono::Duration::seconds(1)),
            None => *self,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Origin, Product};

    fn sample(centre: u32, month: u32, day: u32) -> Metadata {
        let mut md = Metadata::new();
        md.set(Origin::grib1(Some(centre), Some(0), Some(101)));
        md.set(Product::grib1(Some(centre), Some(140), Some(229)));
        md.set(Reftime::position(Time::new(2007, month, day, 13, 0, 0)));
        md
    }

    fn open_index(dir: &Path) -> Index {
        Index::open(dir, &DEFAULT_INDEXED).unwrap()
    }

    #[test]
    fn test_insert_and_query_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());

        let txn = index.begin().unwrap();
        let md = sample(200, 7, 8);
        index.insert(&md, "2007/07-08.grib", 0, 7218).unwrap();
        txn.commit_boxed().unwrap();

        let mut results = Vec::new();
        index
            .query_data(
                &DataQuery::new(Matcher::parse("origin:GRIB1,200").unwrap()),
                &mut |md| {
                    results.push(md);
                    Ok(true)
                },
            )
            .unwrap();
        assert_eq!(results.len(), 1);
        let found = &results[0];
        assert_eq!(found.get(Code::Origin), md.get(Code::Origin));
        assert_eq!(found.get(Code::Product), md.get(Code::Product));
        match found.source() {
            Some(Source::Blob {
                relpath,
                offset,
                size,
                ..
            }) => {
                assert_eq!(relpath, "2007/07-08.grib");
                assert_eq!(*offset, 0);
                assert_eq!(*size, 7218);
            }
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_file_offset_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());

        let txn = index.begin().unwrap();
        index.insert(&sample(200, 7, 8), "a.grib", 0, 10).unwrap();
        let err = index
            .insert(&sample(80, 8, 9), "a.grib", 0, 10)
            .unwrap_err();
        assert!(err.is_duplicate());
        txn.commit_boxed().unwrap();
    }

    #[test]
    fn test_duplicate_uniq_reftime_rejected_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());

        let txn = index.begin().unwrap();
        index.insert(&sample(200, 7, 8), "a.grib", 0, 10).unwrap();
        // Same indexed tuple and reftime at a different offset.
        let err = index
            .insert(&sample(200, 7, 8), "a.grib", 10, 10)
            .unwrap_err();
        assert!(err.is_duplicate());

        index.replace(&sample(200, 7, 8), "a.grib", 10, 10).unwrap();
        txn.commit_boxed().unwrap();

        assert_eq!(index.count().unwrap(), 1);
        assert!(index.has("a.grib", 10).unwrap());
        assert!(!index.has("a.grib", 0).unwrap());
    }

    #[test]
    fn test_uncommitted_transaction_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());

        {
            let _txn = index.begin().unwrap();
            index.insert(&sample(200, 7, 8), "a.grib", 0, 10).unwrap();
            // Dropped without commit.
        }
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_query_reftime_range_and_residual() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());

        let txn = index.begin().unwrap();
        index.insert(&sample(200, 7, 8), "a.grib", 0, 10).unwrap();
        index.insert(&sample(200, 8, 9), "a.grib", 10, 10).unwrap();
        index.insert(&sample(80, 8, 10), "a.grib", 20, 10).unwrap();
        txn.commit_boxed().unwrap();

        let mut count = 0;
        index
            .query_data(
                &DataQuery::new(Matcher::parse("reftime:>=2007-08; origin:GRIB1,200").unwrap()),
                &mut |_| {
                    count += 1;
                    Ok(true)
                },
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_query_no_matching_attr_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let txn = index.begin().unwrap();
        index.insert(&sample(200, 7, 8), "a.grib", 0, 10).unwrap();
        txn.commit_boxed().unwrap();

        let mut count = 0;
        index
            .query_data(
                &DataQuery::new(Matcher::parse("origin:GRIB1,99").unwrap()),
                &mut |_| {
                    count += 1;
                    Ok(true)
                },
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_segment_metadata_ordered_by_offset() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let txn = index.begin().unwrap();
        index.insert(&sample(200, 7, 9), "a.grib", 10, 10).unwrap();
        index.insert(&sample(200, 7, 8), "a.grib", 0, 10).unwrap();
        index.insert(&sample(200, 7, 10), "b.grib", 0, 10).unwrap();
        txn.commit_boxed().unwrap();

        assert_eq!(index.list_segments().unwrap(), vec!["a.grib", "b.grib"]);
        let coll = index.segment_metadata("a.grib").unwrap();
        assert_eq!(coll.len(), 2);
        let offsets: Vec<u64> = coll
            .iter()
            .map(|md| match md.source() {
                Some(Source::Blob { offset, .. }) => *offset,
                _ => panic!(),
            })
            .collect();
        assert_eq!(offsets, vec![0, 10]);

        assert_eq!(
            index.segment_max_reftime("a.grib").unwrap(),
            Some(Time::new(2007, 7, 9, 13, 0, 0))
        );
    }

    #[test]
    fn test_summary_cache_creates_exact_month_files() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());

        // Data lies in 2007-07 .. 2007-10.
        let txn = index.begin().unwrap();
        index.insert(&sample(200, 7, 8), "a.grib", 0, 7218).unwrap();
        index.insert(&sample(200, 7, 7), "a.grib", 7218, 34960).unwrap();
        index.insert(&sample(98, 10, 9), "b.grib", 0, 2234).unwrap();
        txn.commit_boxed().unwrap();

        let mut summary = Summary::new();
        index
            .query_summary(&Matcher::parse("reftime:=2007").unwrap(), &mut summary)
            .unwrap();
        assert_eq!(summary.count(), 3);
        assert_eq!(summary.size(), 44412);

        // Exactly the months inside [data begin, data end] got cache files.
        let root = dir.path();
        for mo in 7..=10 {
            assert!(
                summary_cache::month_path(root, 2007, mo).exists(),
                "2007-{mo:02}.summary missing"
            );
        }
        for mo in [1, 2, 3, 4, 5, 6, 11, 12] {
            assert!(
                !summary_cache::month_path(root, 2007, mo).exists(),
                "2007-{mo:02}.summary should not exist"
            );
        }
        assert!(!summary_cache::month_path(root, 2008, 1).exists());
        assert!(!summary_cache::all_path(root).exists());
    }

    #[test]
    fn test_summary_cache_reuse_and_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let txn = index.begin().unwrap();
        index.insert(&sample(200, 7, 8), "a.grib", 0, 100).unwrap();
        txn.commit_boxed().unwrap();

        let mut summary = Summary::new();
        index
            .query_summary(&Matcher::parse("reftime:=2007-07").unwrap(), &mut summary)
            .unwrap();
        assert_eq!(summary.count(), 1);
        assert!(summary_cache::month_path(dir.path(), 2007, 7).exists());

        // A new insert in the same month drops the cache file.
        let txn = index.begin().unwrap();
        index.insert(&sample(80, 7, 9), "a.grib", 100, 50).unwrap();
        txn.commit_boxed().unwrap();
        assert!(!summary_cache::month_path(dir.path(), 2007, 7).exists());

        let mut summary = Summary::new();
        index
            .query_summary(&Matcher::parse("reftime:=2007-07").unwrap(), &mut summary)
            .unwrap();
        assert_eq!(summary.count(), 2);
    }

    #[test]
    fn test_unbounded_summary_uses_all_rollup() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let txn = index.begin().unwrap();
        index.insert(&sample(200, 7, 8), "a.grib", 0, 100).unwrap();
        index.insert(&sample(80, 9, 1), "a.grib", 100, 100).unwrap();
        txn.commit_boxed().unwrap();

        let mut summary = Summary::new();
        index.query_summary(&Matcher::empty(), &mut summary).unwrap();
        assert_eq!(summary.count(), 2);
        assert!(summary_cache::all_path(dir.path()).exists());
    }

    #[test]
    fn test_summary_with_attr_clause_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let txn = index.begin().unwrap();
        index.insert(&sample(200, 7, 8), "a.grib", 0, 100).unwrap();
        index.insert(&sample(80, 7, 9), "a.grib", 100, 50).unwrap();
        txn.commit_boxed().unwrap();

        let mut summary = Summary::new();
        index
            .query_summary(&Matcher::parse("origin:GRIB1,80").unwrap(), &mut summary)
            .unwrap();
        assert_eq!(summary.count(), 1);
        assert_eq!(summary.size(), 50);
        assert!(!summary_cache::all_path(dir.path()).exists());
    }

    #[test]
    fn test_produce_nth() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let txn = index.begin().unwrap();
        // Two data for centre 200 on different days, one for centre 80.
        index.insert(&sample(200, 7, 8), "a.grib", 0, 10).unwrap();
        index.insert(&sample(200, 7, 9), "a.grib", 10, 10).unwrap();
        index.insert(&sample(80, 7, 8), "a.grib", 20, 10).unwrap();
        txn.commit_boxed().unwrap();

        let mut first = Vec::new();
        index
            .produce_nth(0, &mut |md| {
                first.push(md);
                Ok(true)
            })
            .unwrap();
        assert_eq!(first.len(), 2);

        let mut second = Vec::new();
        index
            .produce_nth(1, &mut |md| {
                second.push(md);
                Ok(true)
            })
            .unwrap();
        // Only the centre-200 group has a second element.
        assert_eq!(second.len(), 1);
        assert_eq!(
            second[0].reftime_interval().unwrap().0,
            Time::new(2007, 7, 9, 13, 0, 0)
        );
    }

    #[test]
    fn test_reindex_segment() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let txn = index.begin().unwrap();
        index.insert(&sample(200, 7, 8), "a.grib", 0, 10).unwrap();
        index.insert(&sample(200, 7, 9), "a.grib", 10, 10).unwrap();
        txn.commit_boxed().unwrap();

        // Rescan found only one record.
        let mut md = sample(200, 7, 8);
        md.set_source(Source::blob("grib", "", "a.grib", 0, 10));
        let mut coll = Collection::new();
        coll.push(md);
        index.reindex_segment("a.grib", &coll).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        assert!(index.has("a.grib", 0).unwrap());
        assert!(!index.has("a.grib", 10).unwrap());
    }
}
