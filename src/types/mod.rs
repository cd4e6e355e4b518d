//! Typed metadata items.
//!
//! Every datum carries a small tuple of typed attributes (origin, product,
//! level, …). Each attribute kind is a sum over "styles" with a fixed
//! payload, and has three equivalent serializations: a canonical binary
//! envelope, a canonical string form and a structured (JSON) form.
//!
//! Items are immutable; common values are shared through a process-global
//! intern table keyed by the canonical binary payload.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};

pub mod area;
pub mod assigneddataset;
pub mod bbox;
pub mod level;
pub mod note;
pub mod origin;
pub mod proddef;
pub mod product;
pub mod quantity;
pub mod reftime;
pub mod run;
pub mod source;
pub mod task;
pub mod time;
pub mod timerange;
pub mod value;

pub use area::Area;
pub use assigneddataset::Assigneddataset;
pub use bbox::Bbox;
pub use level::Level;
pub use note::Note;
pub use origin::Origin;
pub use proddef::Proddef;
pub use product::Product;
pub use quantity::Quantity;
pub use reftime::Reftime;
pub use run::Run;
pub use source::Source;
pub use task::Task;
pub use time::{PartialTime, Time};
pub use timerange::Timerange;
pub use value::ValueItem;

// ── Type codes ─────────────────────────────────────────────────────

/// Serialization code of an item kind. The numeric value is part of the
/// binary envelope and of the total order between items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Code {
    Origin = 1,
    Product = 2,
    Level = 3,
    Timerange = 4,
    Reftime = 5,
    Note = 6,
    Source = 7,
    Assigneddataset = 8,
    Area = 9,
    Proddef = 10,
    Run = 11,
    Task = 12,
    Quantity = 13,
    Value = 14,
    Bbox = 15,
}

impl Code {
    pub const ALL: [Code; 15] = [
        Code::Origin,
        Code::Product,
        Code::Level,
        Code::Timerange,
        Code::Reftime,
        Code::Note,
        Code::Source,
        Code::Assigneddataset,
        Code::Area,
        Code::Proddef,
        Code::Run,
        Code::Task,
        Code::Quantity,
        Code::Value,
        Code::Bbox,
    ];

    pub fn from_u8(v: u8) -> Result<Code> {
        Code::ALL
            .into_iter()
            .find(|c| *c as u8 == v)
            .ok_or_else(|| ArkiError::Format(format!("unknown item code {v}")))
    }

    /// Lowercase tag used in matchers, YAML and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Code::Origin => "origin",
            Code::Product => "product",
            Code::Level => "level",
            Code::Timerange => "timerange",
            Code::Reftime => "reftime",
            Code::Note => "note",
            Code::Source => "source",
            Code::Assigneddataset => "assigneddataset",
            Code::Area => "area",
            Code::Proddef => "proddef",
            Code::Run => "run",
            Code::Task => "task",
            Code::Quantity => "quantity",
            Code::Value => "value",
            Code::Bbox => "bbox",
        }
    }

    pub fn from_name(name: &str) -> Result<Code> {
        let lower = name.trim().to_ascii_lowercase();
        Code::ALL
            .into_iter()
            .find(|c| c.name() == lower)
            .ok_or_else(|| ArkiError::parse("type name", format!("unknown type `{name}`")))
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Item ───────────────────────────────────────────────────────────

/// One typed metadata attribute. Variants are declared in code order, so the
/// derived `Ord` sorts first by type code, then per-type by style and
/// payload fields in declared order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Item {
    Origin(Origin),
    Product(Product),
    Level(Level),
    Timerange(Timerange),
    Reftime(Reftime),
    Note(Note),
    Source(Source),
    Assigneddataset(Assigneddataset),
    Area(Area),
    Proddef(Proddef),
    Run(Run),
    Task(Task),
    Quantity(Quantity),
    Value(ValueItem),
    Bbox(Bbox),
}

impl Item {
    pub fn code(&self) -> Code {
        match self {
            Item::Origin(_) => Code::Origin,
            Item::Product(_) => Code::Product,
            Item::Level(_) => Code::Level,
            Item::Timerange(_) => Code::Timerange,
            Item::Reftime(_) => Code::Reftime,
            Item::Note(_) => Code::Note,
            Item::Source(_) => Code::Source,
            Item::Assigneddataset(_) => Code::Assigneddataset,
            Item::Area(_) => Code::Area,
            Item::Proddef(_) => Code::Proddef,
            Item::Run(_) => Code::Run,
            Item::Task(_) => Code::Task,
            Item::Quantity(_) => Code::Quantity,
            Item::Value(_) => Code::Value,
            Item::Bbox(_) => Code::Bbox,
        }
    }

    /// Encode the payload, without the `{code, length}` envelope.
    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Item::Origin(v) => v.encode(enc),
            Item::Product(v) => v.encode(enc),
            Item::Level(v) => v.encode(enc),
            Item::Timerange(v) => v.encode(enc),
            Item::Reftime(v) => v.encode(enc),
            Item::Note(v) => v.encode(enc),
            Item::Source(v) => v.encode(enc),
            Item::Assigneddataset(v) => v.encode(enc),
            Item::Area(v) => v.encode(enc),
            Item::Proddef(v) => v.encode(enc),
            Item::Run(v) => v.encode(enc),
            Item::Task(v) => v.encode(enc),
            Item::Quantity(v) => v.encode(enc),
            Item::Value(v) => v.encode(enc),
            Item::Bbox(v) => v.encode(enc),
        }
    }

    /// Canonical binary payload as an owned buffer.
    pub fn encoded_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut Encoder::new(&mut buf));
        buf
    }

    /// Encode as `{code: u8, length: u16 BE, payload}`.
    pub fn encode_with_envelope(&self, enc: &mut Encoder) {
        let payload = self.encoded_payload();
        enc.add_u8(self.code() as u8);
        enc.add_u16(payload.len() as u16);
        enc.add_bytes(&payload);
    }

    /// Decode a payload of a known code.
    pub fn decode(code: Code, payload: &[u8]) -> Result<Item> {
        let mut dec = Decoder::new("item payload", payload);
        let item = match code {
            Code::Origin => Item::Origin(Origin::decode(&mut dec)?),
            Code::Product => Item::Product(Product::decode(&mut dec)?),
            Code::Level => Item::Level(Level::decode(&mut dec)?),
            Code::Timerange => Item::Timerange(Timerange::decode(&mut dec)?),
            Code::Reftime => Item::Reftime(Reftime::decode(&mut dec)?),
            Code::Note => Item::Note(Note::decode(&mut dec)?),
            Code::Source => Item::Source(Source::decode(&mut dec)?),
            Code::Assigneddataset => Item::Assigneddataset(Assigneddataset::decode(&mut dec)?),
            Code::Area => Item::Area(Area::decode(&mut dec)?),
            Code::Proddef => Item::Proddef(Proddef::decode(&mut dec)?),
            Code::Run => Item::Run(Run::decode(&mut dec)?),
            Code::Task => Item::Task(Task::decode(&mut dec)?),
            Code::Quantity => Item::Quantity(Quantity::decode(&mut dec)?),
            Code::Value => Item::Value(ValueItem::decode(&mut dec)?),
            Code::Bbox => Item::Bbox(Bbox::decode(&mut dec)?),
        };
        Ok(item)
    }

    /// Decode one enveloped item, advancing the decoder past it.
    pub fn decode_envelope(dec: &mut Decoder) -> Result<Item> {
        let code = Code::from_u8(dec.pop_u8("item code")?)?;
        let len = dec.pop_u16("item length")? as usize;
        let payload = dec.pop_bytes(len, "item payload")?;
        Item::decode(code, payload)
    }

    /// Parse the canonical string form of an item of a known code.
    pub fn parse(code: Code, s: &str) -> Result<Item> {
        let item = match code {
            Code::Origin => Item::Origin(Origin::parse(s)?),
            Code::Product => Item::Product(Product::parse(s)?),
            Code::Level => Item::Level(Level::parse(s)?),
            Code::Timerange => Item::Timerange(Timerange::parse(s)?),
            Code::Reftime => Item::Reftime(Reftime::parse(s)?),
            Code::Note => Item::Note(Note::parse(s)?),
            Code::Source => Item::Source(Source::parse(s)?),
            Code::Assigneddataset => Item::Assigneddataset(Assigneddataset::parse(s)?),
            Code::Area => Item::Area(Area::parse(s)?),
            Code::Proddef => Item::Proddef(Proddef::parse(s)?),
            Code::Run => Item::Run(Run::parse(s)?),
            Code::Task => Item::Task(Task::parse(s)?),
            Code::Quantity => Item::Quantity(Quantity::parse(s)?),
            Code::Value => Item::Value(ValueItem::parse(s)?),
            Code::Bbox => Item::Bbox(Bbox::parse(s)?),
        };
        Ok(item)
    }

    /// Structured (JSON) form: a mapping with `"s"` for the style plus
    /// style-specific keys.
    pub fn to_structured(&self) -> serde_json::Value {
        match self {
            Item::Origin(v) => v.to_structured(),
            Item::Product(v) => v.to_structured(),
            Item::Level(v) => v.to_structured(),
            Item::Timerange(v) => v.to_structured(),
            Item::Reftime(v) => v.to_structured(),
            Item::Note(v) => v.to_structured(),
            Item::Source(v) => v.to_structured(),
            Item::Assigneddataset(v) => v.to_structured(),
            Item::Area(v) => v.to_structured(),
            Item::Proddef(v) => v.to_structured(),
            Item::Run(v) => v.to_structured(),
            Item::Task(v) => v.to_structured(),
            Item::Quantity(v) => v.to_structured(),
            Item::Value(v) => v.to_structured(),
            Item::Bbox(v) => v.to_structured(),
        }
    }

    pub fn from_structured(code: Code, v: &serde_json::Value) -> Result<Item> {
        let item = match code {
            Code::Origin => Item::Origin(Origin::from_structured(v)?),
            Code::Product => Item::Product(Product::from_structured(v)?),
            Code::Level => Item::Level(Level::from_structured(v)?),
            Code::Timerange => Item::Timerange(Timerange::from_structured(v)?),
            Code::Reftime => Item::Reftime(Reftime::from_structured(v)?),
            Code::Note => Item::Note(Note::from_structured(v)?),
            Code::Source => Item::Source(Source::from_structured(v)?),
            Code::Assigneddataset => Item::Assigneddataset(Assigneddataset::from_structured(v)?),
            Code::Area => Item::Area(Area::from_structured(v)?),
            Code::Proddef => Item::Proddef(Proddef::from_structured(v)?),
            Code::Run => Item::Run(Run::from_structured(v)?),
            Code::Task => Item::Task(Task::from_structured(v)?),
            Code::Quantity => Item::Quantity(Quantity::from_structured(v)?),
            Code::Value => Item::Value(ValueItem::from_structured(v)?),
            Code::Bbox => Item::Bbox(Bbox::from_structured(v)?),
        };
        Ok(item)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Origin(v) => v.fmt(f),
            Item::Product(v) => v.fmt(f),
            Item::Level(v) => v.fmt(f),
            Item::Timerange(v) => v.fmt(f),
            Item::Reftime(v) => v.fmt(f),
            Item::Note(v) => v.fmt(f),
            Item::Source(v) => v.fmt(f),
            Item::Assigneddataset(v) => v.fmt(f),
            Item::Area(v) => v.fmt(f),
            Item::Proddef(v) => v.fmt(f),
            Item::Run(v) => v.fmt(f),
            Item::Task(v) => v.fmt(f),
            Item::Quantity(v) => v.fmt(f),
            Item::Value(v) => v.fmt(f),
            Item::Bbox(v) => v.fmt(f),
        }
    }
}

macro_rules! impl_from_item {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Item {
            fn from(v: $ty) -> Item {
                Item::$variant(v)
            }
        })*
    };
}

impl_from_item! {
    Origin => Origin,
    Product => Product,
    Level => Level,
    Timerange => Timerange,
    Reftime => Reftime,
    Note => Note,
    Source => Source,
    Assigneddataset => Assigneddataset,
    Area => Area,
    Proddef => Proddef,
    Run => Run,
    Task => Task,
    Quantity => Quantity,
    ValueItem => Value,
    Bbox => Bbox,
}

// ── Interning ──────────────────────────────────────────────────────

type InternMap = HashMap<(Code, Vec<u8>), Arc<Item>>;

fn intern_table() -> &'static Mutex<InternMap> {
    static TABLE: OnceLock<Mutex<InternMap>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Return a shared handle to `item`, reusing the existing handle for any
/// item with the same canonical binary payload.
pub fn intern(item: Item) -> Arc<Item> {
    let key = (item.code(), item.encoded_payload());
    let mut table = intern_table().lock().unwrap();
    table.entry(key).or_insert_with(|| Arc::new(item)).clone()
}

/// Number of distinct interned items, for diagnostics.
pub fn intern_table_size() -> usize {
    intern_table().lock().unwrap().len()
}

// ── String form helpers ────────────────────────────────────────────

/// Split `STYLE(args)` into the style name and the argument list text.
/// A bare `STYLE` without parentheses yields empty arguments.
pub fn outer_parse<'a>(what: &'static str, s: &'a str) -> Result<(&'a str, &'a str)> {
    let s = s.trim();
    match s.find('(') {
        None => Ok((s, "")),
        Some(open) => {
            let close = s.rfind(')').ok_or_else(|| {
                ArkiError::parse(what, format!("missing closing parenthesis in `{s}`"))
            })?;
            if close < open {
                return Err(ArkiError::parse(what, format!("mismatched parentheses in `{s}`")));
            }
            Ok((s[..open].trim(), &s[open + 1..close]))
        }
    }
}

/// Comma-separated argument list with optional/empty slots. An empty slot or
/// a `-` stands for an undefined value; trailing empty slots are dropped.
pub struct ArgList {
    args: Vec<String>,
    what: &'static str,
}

impl ArgList {
    pub fn new(what: &'static str, s: &str) -> Self {
        let mut args: Vec<String> = if s.trim().is_empty() {
            Vec::new()
        } else {
            s.split(',').map(|a| a.trim().to_string()).collect()
        };
        while args.last().map(|a| a.is_empty() || a == "-").unwrap_or(false) {
            args.pop();
        }
        Self { args, what }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    fn raw(&self, pos: usize) -> Option<&str> {
        self.args
            .get(pos)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty() && *s != "-")
    }

    /// Integer slot; empty, missing or `-` yields `None`.
    pub fn opt_u32(&self, pos: usize) -> Result<Option<u32>> {
        match self.raw(pos) {
            None => Ok(None),
            Some(s) => s.parse::<u32>().map(Some).map_err(|_| {
                ArkiError::parse(self.what, format!("field {} is not an integer: `{s}`", pos + 1))
            }),
        }
    }

    /// Required integer slot.
    pub fn u32(&self, pos: usize) -> Result<u32> {
        self.opt_u32(pos)?.ok_or_else(|| {
            ArkiError::parse(self.what, format!("missing integer field {}", pos + 1))
        })
    }

    /// Signed integer slot (used by scaled bbox coordinates).
    pub fn opt_i32(&self, pos: usize) -> Result<Option<i32>> {
        match self.raw(pos) {
            None => Ok(None),
            Some(s) => s.parse::<i32>().map(Some).map_err(|_| {
                ArkiError::parse(self.what, format!("field {} is not an integer: `{s}`", pos + 1))
            }),
        }
    }

    /// Required string slot.
    pub fn string(&self, pos: usize) -> Result<&str> {
        self.raw(pos).ok_or_else(|| {
            ArkiError::parse(self.what, format!("missing field {}", pos + 1))
        })
    }

    /// Optional string slot.
    pub fn opt_string(&self, pos: usize) -> Option<&str> {
        self.raw(pos)
    }
}

/// Join optional integer fields the way the string form expects: defined
/// values as decimal, undefined interior values as `-`, trailing undefined
/// values omitted.
pub fn join_opt_fields(fields: &[Option<u32>]) -> String {
    let last_defined = match fields.iter().rposition(|f| f.is_some()) {
        Some(pos) => pos,
        None => return String::new(),
    };
    fields[..=last_defined]
        .iter()
        .map(|f| match f {
            Some(v) => v.to_string(),
            None => "-".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fetch the style string from a structured mapping.
pub fn structured_style<'a>(what: &'static str, v: &'a serde_json::Value) -> Result<&'a str> {
    v.get("s")
        .and_then(|s| s.as_str())
        .ok_or_else(|| ArkiError::parse(what, "structured form is missing the style key \"s\""))
}

/// Fetch an optional unsigned field from a structured mapping.
pub fn structured_opt_u32(
    what: &'static str,
    v: &serde_json::Value,
    key: &str,
) -> Result<Option<u32>> {
    match v.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(f) => f
            .as_u64()
            .map(|n| Some(n as u32))
            .ok_or_else(|| ArkiError::parse(what, format!("field {key} is not an integer"))),
    }
}

/// Fetch a required string field from a structured mapping.
pub fn structured_str<'a>(
    what: &'static str,
    v: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str> {
    v.get(key)
        .and_then(|s| s.as_str())
        .ok_or_else(|| ArkiError::parse(what, format!("missing string field {key}")))
}

// ── Tests ──────────────────────────────────────────────────────────
