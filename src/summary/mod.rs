//! Aggregate summaries over sets of metadata.
//!
//! A summary maps each distinct tuple of summarised items (origin, product,
//! level, timerange, area, proddef, run) to the count, total size and
//! reference time interval of the matching data. Summaries merge
//! commutatively and serve as the wire answer to "summary" queries and as
//! the on-disk `.summary` sidecars and cache files.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::matcher::Matcher;
use crate::metadata::bundle::{Record, MAGIC_SUMMARY};
use crate::metadata::Metadata;
use crate::types::{Code, Item, Time};
use crate::utils;

pub mod stats;

pub use stats::Stats;

/// The item codes a summary discriminates on, in code order.
pub const SUMMARY_CODES: [Code; 7] = [
    Code::Origin,
    Code::Product,
    Code::Level,
    Code::Timerange,
    Code::Area,
    Code::Proddef,
    Code::Run,
];

type EntryKey = Vec<(Code, Arc<Item>)>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    entries: BTreeMap<EntryKey, Stats>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Aggregation ────────────────────────────────────────────────

    fn key_of(md: &Metadata) -> EntryKey {
        SUMMARY_CODES
            .iter()
            .filter_map(|code| md.get_shared(*code).map(|item| (*code, item)))
            .collect()
    }

    pub fn add(&mut self, md: &Metadata) {
        let stats = Stats::for_datum(md.data_size(), md.reftime_interval());
        self.entries
            .entry(Self::key_of(md))
            .or_insert_with(Stats::empty)
            .merge(&stats);
    }

    pub fn merge(&mut self, other: &Summary) {
        for (key, stats) in &other.entries {
            self.entries
                .entry(key.clone())
                .or_insert_with(Stats::empty)
                .merge(stats);
        }
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn count(&self) -> u64 {
        self.entries.values().map(|s| s.count).sum()
    }

    pub fn size(&self) -> u64 {
        self.entries.values().map(|s| s.size).sum()
    }

    /// The overall reference time interval, if any entry carries one.
    pub fn reftime_interval(&self) -> Option<(Time, Time)> {
        let mut acc = Stats::empty();
        for stats in self.entries.values() {
            acc.merge(stats);
        }
        acc.reftime
    }

    pub fn entries(&self) -> impl Iterator<Item = (&EntryKey, &Stats)> {
        self.entries.iter()
    }

    // ── Matching ───────────────────────────────────────────────────

    fn entry_matches(matcher: &Matcher, key: &EntryKey, stats: &Stats) -> bool {
        matcher.clauses().all(|clause| {
            if clause.code() == Code::Reftime {
                return match stats.reftime {
                    Some((begin, end)) => clause.matches_interval(&begin, &end),
                    None => false,
                };
            }
            if !SUMMARY_CODES.contains(&clause.code()) {
                // The summary does not discriminate on this type: the entry
                // may contain matching data.
                return true;
            }
            match key.iter().find(|(code, _)| *code == clause.code()) {
                Some((_, item)) => clause.matches_item(item),
                None => false,
            }
        })
    }

    /// True iff at least one entry could contain data matched by `matcher`.
    pub fn matches(&self, matcher: &Matcher) -> bool {
        self.entries
            .iter()
            .any(|(key, stats)| Self::entry_matches(matcher, key, stats))
    }

    /// The sub-summary of entries compatible with `matcher`.
    pub fn filter(&self, matcher: &Matcher) -> Summary {
        Summary {
            entries: self
                .entries
                .iter()
                .filter(|(key, stats)| Self::entry_matches(matcher, key, stats))
                .map(|(key, stats)| (key.clone(), *stats))
                .collect(),
        }
    }

    /// Lossy projection onto a subset of codes: entries that collapse to
    /// the same projected key merge their stats.
    pub fn project(&self, codes: &[Code]) -> Summary {
        let mut res = Summary::new();
        for (key, stats) in &self.entries {
            let projected: EntryKey = key
                .iter()
                .filter(|(code, _)| codes.contains(code))
                .cloned()
                .collect();
            res.entries
                .entry(projected)
                .or_insert_with(Stats::empty)
                .merge(stats);
        }
        res
    }

    // ── Binary form ────────────────────────────────────────────────

    pub fn encode_body(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.add_varint(self.entries.len() as u64);
        for (key, stats) in &self.entries {
            enc.add_u8(key.len() as u8);
            for (_, item) in key {
                item.encode_with_envelope(&mut enc);
            }
            stats.encode(&mut enc);
        }
        buf
    }

    pub fn decode_body(body: &[u8]) -> Result<Summary> {
        let mut dec = Decoder::new("summary body", body);
        let n = dec.pop_varint("entry count")?;
        let mut entries = BTreeMap::new();
        for _ in 0..n {
            let items = dec.pop_u8("item count")?;
            let mut key = Vec::with_capacity(items as usize);
            for _ in 0..items {
                let item = Item::decode_envelope(&mut dec)?;
                key.push((item.code(), crate::types::intern(item)));
            }
            let stats = Stats::decode(&mut dec)?;
            entries.insert(key, stats);
        }
        Ok(Summary { entries })
    }

    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        Record::write(writer, MAGIC_SUMMARY, &self.encode_body())
    }

    /// Read one summary record. `Ok(None)` on clean end of stream.
    pub fn read(reader: &mut impl Read) -> Result<Option<Summary>> {
        match Record::read(reader)? {
            None => Ok(None),
            Some(record) if record.magic == MAGIC_SUMMARY => {
                Ok(Some(Summary::decode_body(&record.body)?))
            }
            Some(record) => Err(ArkiError::Format(format!(
                "expected summary record, found {:?}",
                String::from_utf8_lossy(&record.magic)
            ))),
        }
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        utils::write_atomically(path, &buf)
    }

    pub fn read_from_file(path: &Path) -> Result<Summary> {
        let mut reader = std::io::BufReader::new(
            std::fs::File::open(path).map_err(|e| ArkiError::io(path, e))?,
        );
        Summary::read(&mut reader)?
            .ok_or_else(|| ArkiError::Format(format!("{} is empty", path.display())))
    }

    // ── Text and structured forms ──────────────────────────────────

    /// YAML-ish rendering: one block per entry.
    pub fn to_yaml(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        for (key, stats) in &self.entries {
            let _ = writeln!(out, "SummaryItem:");
            for (code, item) in key {
                let _ = writeln!(out, "  {}: {}", code.name(), item);
            }
            let _ = writeln!(out, "SummaryStats:");
            let _ = writeln!(out, "  Count: {}", stats.count);
            let _ = writeln!(out, "  Size: {}", stats.size);
            if let Some((begin, end)) = stats.reftime {
                let _ = writeln!(out, "  Reftime: {begin} to {end}");
            }
            out.push('\n');
        }
        out
    }

    pub fn to_structured(&self) -> serde_json::Value {
        let items: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|(key, stats)| {
                let mut map = serde_json::Map::new();
                for (code, item) in key {
                    map.insert(code.name().to_string(), item.to_structured());
                }
                map.insert("summarystats".to_string(), stats.to_structured());
                serde_json::Value::Object(map)
            })
            .collect();
        serde_json::json!({ "items": items })
    }
}

// ── Tests ──────────────────────────────────────────────────────────
