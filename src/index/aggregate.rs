//! Aggregate table: one row per distinct combination of indexed attribute
//! ids seen in the dataset.
//!
//! The `mduniq` id stands for the whole indexed tuple of a datum; together
//! with the reference time it forms the uniqueness predicate the replace
//! policy acts on.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::types::Code;

pub struct Aggregate {
    codes: Vec<Code>,
    cache: HashMap<Vec<i64>, i64>,
}

impl Aggregate {
    pub fn new(codes: &[Code]) -> Aggregate {
        Aggregate {
            codes: codes.to_vec(),
            cache: HashMap::new(),
        }
    }

    pub fn init_table(conn: &Connection, codes: &[Code]) -> Result<()> {
        let columns: Vec<String> = codes
            .iter()
            .map(|c| format!("{} INTEGER NOT NULL", c.name()))
            .collect();
        let names: Vec<&str> = codes.iter().map(|c| c.name()).collect();
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS mduniq (
                    id INTEGER PRIMARY KEY,
                    {},
                    UNIQUE({}))",
                columns.join(", "),
                names.join(", ")
            ),
            [],
        )?;
        Ok(())
    }

    /// Id of the aggregate row for this attribute id tuple, inserting it if
    /// never seen.
    pub fn obtain(&mut self, conn: &Connection, ids: &[i64]) -> Result<i64> {
        debug_assert_eq!(ids.len(), self.codes.len());
        if let Some(id) = self.cache.get(ids) {
            return Ok(*id);
        }
        let names: Vec<&str> = self.codes.iter().map(|c| c.name()).collect();
        let where_clause: Vec<String> = names
            .iter()
            .zip(ids)
            .map(|(name, id)| format!("{name} = {id}"))
            .collect();
        let existing: Option<i64> = conn
            .query_row(
                &format!("SELECT id FROM mduniq WHERE {}", where_clause.join(" AND ")),
                [],
                |row| row.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => id,
            None => {
                let values: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                conn.execute(
                    &format!(
                        "INSERT INTO mduniq ({}) VALUES ({})",
                        names.join(", "),
                        values.join(", ")
                    ),
                    [],
                )?;
                conn.last_insert_rowid()
            }
        };
        self.cache.insert(ids.to_vec(), id);
        Ok(id)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
