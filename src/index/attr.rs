//! Attribute sub-indices: one `sub_<name>` table per indexed item type.
//!
//! Each table stores the canonical binary payload of every distinct item of
//! that type seen by the dataset, keyed by a small integer id. An in-process
//! cache maps id↔item both ways so reconstruction of query results does not
//! round-trip to the database per row.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::matcher::OrMatcher;
use crate::types::{Code, Item};

#[derive(Default)]
struct AttrCache {
    by_id: HashMap<i64, Arc<Item>>,
    by_payload: HashMap<Vec<u8>, i64>,
}

/// Caches and helpers over all the `sub_*` tables of one index.
#[derive(Default)]
pub struct AttrSet {
    caches: HashMap<Code, AttrCache>,
}

fn table(code: Code) -> String {
    format!("sub_{}", code.name())
}

impl AttrSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the sub-index tables for the given codes.
    pub fn init_tables(conn: &Connection, codes: &[Code]) -> Result<()> {
        for code in codes {
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        id INTEGER PRIMARY KEY,
                        data BLOB NOT NULL,
                        UNIQUE(data))",
                    table(*code)
                ),
                [],
            )?;
        }
        Ok(())
    }

    /// Id of the item's payload, inserting it if never seen. Returns 0 when
    /// the metadata has no item of this code (ids start at 1).
    pub fn obtain(&mut self, conn: &Connection, code: Code, item: Option<&Item>) -> Result<i64> {
        let item = match item {
            Some(item) => item,
            None => return Ok(0),
        };
        let payload = item.encoded_payload();
        let cache = self.caches.entry(code).or_default();
        if let Some(id) = cache.by_payload.get(&payload) {
            return Ok(*id);
        }

        let existing: Option<i64> = conn
            .query_row(
                &format!("SELECT id FROM {} WHERE data = ?1", table(code)),
                params![payload],
                |row| row.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => id,
            None => {
                conn.execute(
                    &format!("INSERT INTO {} (data) VALUES (?1)", table(code)),
                    params![payload],
                )?;
                conn.last_insert_rowid()
            }
        };
        cache.by_payload.insert(payload, id);
        cache
            .by_id
            .insert(id, crate::types::intern(item.clone()));
        Ok(id)
    }

    /// Item for an id previously returned by [`AttrSet::obtain`].
    pub fn read(&mut self, conn: &Connection, code: Code, id: i64) -> Result<Arc<Item>> {
        if let Some(item) = self.caches.entry(code).or_default().by_id.get(&id) {
            return Ok(item.clone());
        }
        let payload: Vec<u8> = conn.query_row(
            &format!("SELECT data FROM {} WHERE id = ?1", table(code)),
            params![id],
            |row| row.get(0),
        )?;
        let item = crate::types::intern(Item::decode(code, &payload)?);
        let cache = self.caches.entry(code).or_default();
        cache.by_id.insert(id, item.clone());
        cache.by_payload.insert(payload, id);
        Ok(item)
    }

    /// Ids of every stored item of `code` matched by the clause. The whole
    /// sub-index is scanned and matched in process; sub-indices are small.
    pub fn match_ids(
        &mut self,
        conn: &Connection,
        code: Code,
        clause: &OrMatcher,
    ) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        let mut stmt = conn.prepare(&format!("SELECT id, data FROM {}", table(code)))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let payload: Vec<u8> = row.get(1)?;
            let item = Item::decode(code, &payload)?;
            if clause.matches_item(&item) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

/// Render an id list as a SQL membership test, as compact as possible.
pub fn fmt_id_set(column: &str, ids: &[i64]) -> String {
    match ids {
        [] => "0".to_string(), // no candidate ids: always false
        [id] => format!("{column} = {id}"),
        _ => {
            let list: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            format!("{column} IN ({})", list.join(","))
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Matcher;
    use crate::types::Origin;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        AttrSet::init_tables(&conn, &[Code::Origin]).unwrap();
        conn
    }

    #[test]
    fn test_obtain_dedups() {
        let conn = test_conn();
        let mut attrs = AttrSet::new();
        let a = Item::Origin(Origin::grib1(Some(200), Some(0), Some(101)));
        let b = Item::Origin(Origin::grib1(Some(80), Some(0), Some(101)));

        let id_a = attrs.obtain(&conn, Code::Origin, Some(&a)).unwrap();
        let id_b = attrs.obtain(&conn, Code::Origin, Some(&b)).unwrap();
        assert_ne!(id_a, id_b);
        assert!(id_a > 0);

        // Same payload, same id, also through a fresh cache.
        assert_eq!(attrs.obtain(&conn, Code::Origin, Some(&a)).unwrap(), id_a);
        let mut fresh = AttrSet::new();
        assert_eq!(fresh.obtain(&conn, Code::Origin, Some(&a)).unwrap(), id_a);

        // Absent item maps to the reserved id 0.
        assert_eq!(attrs.obtain(&conn, Code::Origin, None).unwrap(), 0);
    }

    #[test]
    fn test_read_roundtrip() {
        let conn = test_conn();
        let mut attrs = AttrSet::new();
        let item = Item::Origin(Origin::grib1(Some(200), Some(0), Some(101)));
        let id = attrs.obtain(&conn, Code::Origin, Some(&item)).unwrap();

        let mut fresh = AttrSet::new();
        let back = fresh.read(&conn, Code::Origin, id).unwrap();
        assert_eq!(*back, item);
    }

    #[test]
    fn test_match_ids() {
        let conn = test_conn();
        let mut attrs = AttrSet::new();
        let id200 = attrs
            .obtain(
                &conn,
                Code::Origin,
                Some(&Item::Origin(Origin::grib1(Some(200), Some(0), Some(101)))),
            )
            .unwrap();
        let _id80 = attrs
            .obtain(
                &conn,
                Code::Origin,
                Some(&Item::Origin(Origin::grib1(Some(80), Some(0), Some(101)))),
            )
            .unwrap();

        let matcher = Matcher::parse("origin:GRIB1,200").unwrap();
        let clause = matcher.clause(Code::Origin).unwrap();
        let ids = attrs.match_ids(&conn, Code::Origin, clause).unwrap();
        assert_eq!(ids, vec![id200]);
    }

    #[test]
    fn test_fmt_id_set() {
        assert_eq!(fmt_id_set("origin", &[]), "0");
        assert_eq!(fmt_id_set("origin", &[3]), "origin = 3");
        assert_eq!(fmt_id_set("origin", &[1, 2, 5]), "origin IN (1,2,5)");
    }
}
