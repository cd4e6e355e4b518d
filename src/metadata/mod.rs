//! Metadata: the typed attribute tuple describing one datum.
//!
//! A metadata holds at most one item per type code, except notes which
//! accumulate. The source item carries the provenance of the datum; inline
//! data read from a `!D` record is kept alongside.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::{self, Assigneddataset, Code, Item, Note, Reftime, Source, Time};

pub mod bundle;
pub mod collection;
pub mod formatter;
pub mod sort;

pub use collection::Collection;
pub use formatter::Formatter;

use bundle::{Record, MAGIC_GROUP, MAGIC_INLINE, MAGIC_METADATA};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// One item per code; notes are kept apart because they repeat.
    items: BTreeMap<Code, Arc<Item>>,
    notes: Vec<Note>,
    /// Data bytes carried along when the source is inline.
    inline_data: Option<Vec<u8>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Item access ────────────────────────────────────────────────

    /// Set an item, replacing any previous item of the same code. A note
    /// appends instead.
    pub fn set(&mut self, item: impl Into<Item>) {
        let item = item.into();
        if let Item::Note(note) = item {
            self.notes.push(note);
            return;
        }
        self.items.insert(item.code(), types::intern(item));
    }

    pub fn get(&self, code: Code) -> Option<&Item> {
        self.items.get(&code).map(|arc| arc.as_ref())
    }

    pub fn get_shared(&self, code: Code) -> Option<Arc<Item>> {
        self.items.get(&code).cloned()
    }

    pub fn has(&self, code: Code) -> bool {
        self.items.contains_key(&code)
    }

    pub fn unset(&mut self, code: Code) {
        if code == Code::Note {
            self.notes.clear();
        } else {
            self.items.remove(&code);
        }
    }

    /// Items in code order, notes and inline data excluded.
    pub fn items(&self) -> impl Iterator<Item = (&Code, &Arc<Item>)> {
        self.items.iter()
    }

    pub fn add_note(&mut self, content: impl Into<String>) {
        self.notes.push(Note::new(content));
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    // ── Typed accessors ────────────────────────────────────────────

    pub fn source(&self) -> Option<&Source> {
        match self.get(Code::Source) {
            Some(Item::Source(s)) => Some(s),
            _ => None,
        }
    }

    pub fn set_source(&mut self, source: Source) {
        self.set(Item::Source(source));
    }

    pub fn reftime(&self) -> Option<&Reftime> {
        match self.get(Code::Reftime) {
            Some(Item::Reftime(r)) => Some(r),
            _ => None,
        }
    }

    /// The time interval this datum refers to.
    pub fn reftime_interval(&self) -> Option<(Time, Time)> {
        self.reftime().map(|r| r.interval())
    }

    /// Record the dataset this metadata was acquired into.
    pub fn set_assigned_dataset(&mut self, name: &str) {
        self.set(Item::Assigneddataset(Assigneddataset::new(name)));
    }

    pub fn assigned_dataset(&self) -> Option<&Assigneddataset> {
        match self.get(Code::Assigneddataset) {
            Some(Item::Assigneddataset(a)) => Some(a),
            _ => None,
        }
    }

    pub fn data_size(&self) -> u64 {
        self.source().and_then(|s| s.size()).unwrap_or(0)
    }

    /// True iff all items except source, notes and assigned dataset match.
    /// This is the identity used to deduplicate results across datasets.
    pub fn items_eq(&self, other: &Metadata) -> bool {
        let skip = |code: &Code| {
            matches!(code, Code::Source | Code::Assigneddataset)
        };
        let mine = self.items.iter().filter(|(c, _)| !skip(c));
        let theirs = other.items.iter().filter(|(c, _)| !skip(c));
        mine.eq(theirs)
    }

    // ── Binary form ────────────────────────────────────────────────

    /// Encode the record body: enveloped items in code order, with the
    /// notes emitted at the NOTE code position.
    pub fn encode_body(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        for (code, item) in &self.items {
            if *code > Code::Note {
                break;
            }
            item.encode_with_envelope(&mut enc);
        }
        for note in &self.notes {
            Item::Note(note.clone()).encode_with_envelope(&mut enc);
        }
        for (code, item) in &self.items {
            if *code > Code::Note {
                item.encode_with_envelope(&mut enc);
            }
        }
        buf
    }

    /// Decode a record body.
    pub fn decode_body(body: &[u8]) -> Result<Metadata> {
        let mut md = Metadata::new();
        let mut dec = Decoder::new("metadata body", body);
        while dec.remaining() > 0 {
            let item = Item::decode_envelope(&mut dec)?;
            md.set(item);
        }
        Ok(md)
    }

    /// Write one record. Inline sources use the `!D` magic and append the
    /// data bytes right after the record.
    pub fn write_bundle(&self, writer: &mut impl Write) -> Result<()> {
        let body = self.encode_body();
        match (&self.inline_data, self.source()) {
            (Some(data), Some(Source::Inline { .. })) => {
                Record::write(writer, MAGIC_INLINE, &body)?;
                writer.write_all(data)?;
            }
            _ => Record::write(writer, MAGIC_METADATA, &body)?,
        }
        Ok(())
    }

    /// Read every metadata in the stream, feeding each to `consumer` until
    /// the stream ends or the consumer returns `false`.
    pub fn read_stream(
        reader: &mut impl Read,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        while let Some(record) = Record::read(reader)? {
            match record.magic {
                MAGIC_METADATA => {
                    if !consumer(Metadata::decode_body(&record.body)?)? {
                        return Ok(());
                    }
                }
                MAGIC_INLINE => {
                    let mut md = Metadata::decode_body(&record.body)?;
                    let size = match md.source() {
                        Some(Source::Inline { size, .. }) => *size as usize,
                        _ => {
                            return Err(ArkiError::Format(
                                "inline record without an inline source".into(),
                            ))
                        }
                    };
                    let mut data = vec![0u8; size];
                    reader
                        .read_exact(&mut data)
                        .map_err(|_| ArkiError::Format("truncated inline data".into()))?;
                    md.inline_data = Some(data);
                    if !consumer(md)? {
                        return Ok(());
                    }
                }
                MAGIC_GROUP => {
                    let mut inner = std::io::Cursor::new(record.body);
                    Metadata::read_stream(&mut inner, consumer)?;
                }
                other => {
                    return Err(ArkiError::Format(format!(
                        "unexpected record {:?} in metadata stream",
                        String::from_utf8_lossy(&other)
                    )))
                }
            }
        }
        Ok(())
    }

    /// Read a whole `.metadata` file.
    pub fn read_file(
        path: &Path,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        let mut reader = std::io::BufReader::new(
            std::fs::File::open(path).map_err(|e| ArkiError::io(path, e))?,
        );
        Metadata::read_stream(&mut reader, consumer)
    }

    // ── Data access ────────────────────────────────────────────────

    /// Fetch the datum bytes for this metadata.
    pub fn get_data(&self) -> Result<Vec<u8>> {
        match self.source() {
            Some(Source::Inline { size, .. }) => match &self.inline_data {
                Some(data) => Ok(data.clone()),
                None => Err(ArkiError::Consistency(format!(
                    "inline source of {size} bytes has no data attached"
                ))),
            },
            Some(Source::Blob {
                format,
                basedir,
                relpath,
                offset,
                size,
            }) => {
                let path = if basedir.is_empty() {
                    std::path::PathBuf::from(relpath)
                } else {
                    Path::new(basedir).join(relpath)
                };
                crate::segment::reader::read_blob(&path, format, *offset, *size)
            }
            Some(Source::Url { url, .. }) => Err(ArkiError::Consistency(format!(
                "data for URL source {url} must be fetched remotely"
            ))),
            None => Err(ArkiError::Consistency("metadata has no source".into())),
        }
    }

    /// Turn the source into an inline one carrying `data`.
    pub fn make_inline(&mut self, data: Vec<u8>) {
        let format = self
            .source()
            .map(|s| s.format().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        self.set_source(Source::inline(format, data.len() as u64));
        self.inline_data = Some(data);
    }

    /// Load the data of a blob source and carry it inline.
    pub fn inline_from_source(&mut self) -> Result<()> {
        let data = self.get_data()?;
        self.make_inline(data);
        Ok(())
    }

    /// Point a blob source to a URL on a remote server.
    pub fn make_url(&mut self, base: &str) {
        if let Some(source) = self.source() {
            let format = source.format().to_string();
            self.set_source(Source::url(format, base));
        }
    }

    /// Drop the absolute part of a blob path, making it stream-relative.
    pub fn strip_source_path(&mut self) {
        if let Some(Source::Blob {
            format,
            relpath,
            offset,
            size,
            ..
        }) = self.source().cloned()
        {
            self.set_source(Source::blob(format, "", relpath, offset, size));
        }
    }

    /// Fill in the base directory of a relative blob source.
    pub fn set_basedir_if_empty(&mut self, basedir: &Path) {
        if let Some(Source::Blob {
            format,
            basedir: b,
            relpath,
            offset,
            size,
        }) = self.source().cloned()
        {
            if b.is_empty() {
                self.set_source(Source::blob(
                    format,
                    basedir.to_string_lossy().into_owned(),
                    relpath,
                    offset,
                    size,
                ));
            }
        }
    }

    pub fn inline_data(&self) -> Option<&[u8]> {
        self.inline_data.as_deref()
    }

    pub fn set_inline_data(&mut self, data: Vec<u8>) {
        self.inline_data = Some(data);
    }

    // ── YAML form ──────────────────────────────────────────────────

    /// Human-readable form: one `Name: value` line per item, source first,
    /// ended by an empty line. With a formatter, annotations follow each
    /// value after `#`.
    pub fn to_yaml(&self, annotate: Option<&dyn Formatter>) -> String {
        let mut out = String::new();
        let mut write_line = |name: &str, value: String, item: Option<&Item>| {
            let note = annotate
                .and_then(|f| item.and_then(|i| f.format(i)))
                .map(|d| format!(" # {d}"))
                .unwrap_or_default();
            let _ = writeln!(out, "{name}: {value}{note}");
        };
        if let Some(item) = self.items.get(&Code::Source) {
            write_line("Source", item.to_string(), Some(item));
        }
        for (code, item) in &self.items {
            if *code == Code::Source {
                continue;
            }
            write_line(capitalized(code.name()), item.to_string(), Some(item));
        }
        for note in &self.notes {
            write_line("Note", note.to_string(), None);
        }
        out.push('\n');
        out
    }

    /// Parse one YAML block (up to an empty line or end of input).
    pub fn from_yaml(text: &str) -> Result<Metadata> {
        let mut md = Metadata::new();
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                ArkiError::parse("metadata yaml", format!("missing `:` in `{line}`"))
            })?;
            let value = value.trim();
            // Strip a trailing annotation comment.
            let value = match value.rsplit_once(" # ") {
                Some((v, _)) => v.trim_end(),
                None => value,
            };
            let code = Code::from_name(name)?;
            md.set(Item::parse(code, value)?);
        }
        Ok(md)
    }

    // ── Structured form ────────────────────────────────────────────

    pub fn to_structured(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (code, item) in &self.items {
            map.insert(code.name().to_string(), item.to_structured());
        }
        if !self.notes.is_empty() {
            map.insert(
                "notes".to_string(),
                serde_json::Value::Array(self.notes.iter().map(|n| n.to_structured()).collect()),
            );
        }
        serde_json::Value::Object(map)
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Metadata> {
        let obj = v
            .as_object()
            .ok_or_else(|| ArkiError::parse("metadata", "expected an object"))?;
        let mut md = Metadata::new();
        for (key, value) in obj {
            if key == "notes" {
                let arr = value
                    .as_array()
                    .ok_or_else(|| ArkiError::parse("metadata", "notes must be an array"))?;
                for n in arr {
                    md.set(Item::Note(Note::from_structured(n)?));
                }
                continue;
            }
            let code = Code::from_name(key)?;
            md.set(Item::from_structured(code, value)?);
        }
        Ok(md)
    }
}

impl PartialOrd for Metadata {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Metadata {
    /// Lexicographic over the (code, item) pairs; notes and carried data
    /// break ties so the order stays consistent with equality.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.items
            .iter()
            .cmp(other.items.iter())
            .then_with(|| self.notes.cmp(&other.notes))
            .then_with(|| self.inline_data.cmp(&other.inline_data))
    }
}

fn capitalized(name: &str) -> &'static str {
    match name {
        "origin" => "Origin",
        "product" => "Product",
        "level" => "Level",
        "timerange" => "Timerange",
        "reftime" => "Reftime",
        "note" => "Note",
        "source" => "Source",
        "assigneddataset" => "Assigneddataset",
        "area" => "Area",
        "proddef" => "Proddef",
        "run" => "Run",
        "task" => "Task",
        "quantity" => "Quantity",
        "value" => "Value",
        "bbox" => "Bbox",
        _ => "Unknown",
    }
}

// ── Tests ──────────────────────────────────────────────────────────
