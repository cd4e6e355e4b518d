//! Key/value bags used as payload for area and product-definition items.
//!
//! A `ValueBag` is an ordered mapping from short ASCII keys to tagged values
//! (signed integer or string). The binary encoding is canonical: entries are
//! key-sorted, integers in `[-32, 31]` take a single byte, larger integers a
//! sign+magnitude form, and strings a length-prefixed form. String content is
//! treated as opaque bytes, so embedded zeros survive a round trip.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::json;

use crate::core::codec::{c_escape, c_unescape, Decoder, Encoder};
use crate::error::{ArkiError, Result};

// Entry type tags, stored in the two top bits of the first byte.
const TAG_SINT6: u8 = 0b0000_0000;
const TAG_NUMBER: u8 = 0b0100_0000;
const TAG_STRING: u8 = 0b1000_0000;
const TAG_LONG_STRING: u8 = 0b1100_0000;

/// A single tagged value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Int(i64),
    String(String),
}

impl Value {
    /// Encode into `enc`. Never fails.
    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Value::Int(v) if (-32..=31).contains(v) => {
                enc.add_u8(TAG_SINT6 | ((v + 32) as u8));
            }
            Value::Int(v) => {
                let magnitude = v.unsigned_abs();
                let nbytes = ((64 - magnitude.leading_zeros()).div_ceil(8)).max(1) as usize;
                let mut lead = TAG_NUMBER | (nbytes as u8);
                if *v < 0 {
                    lead |= 0b0010_0000;
                }
                enc.add_u8(lead);
                enc.add_bytes(&magnitude.to_be_bytes()[8 - nbytes..]);
            }
            Value::String(s) if s.len() <= 63 => {
                enc.add_u8(TAG_STRING | (s.len() as u8));
                enc.add_bytes(s.as_bytes());
            }
            Value::String(s) => {
                enc.add_u8(TAG_LONG_STRING);
                enc.add_str16(s);
            }
        }
    }

    /// Decode one value, where `lead` is the already-consumed first byte.
    fn decode_payload(lead: u8, dec: &mut Decoder) -> Result<Value> {
        match lead & 0b1100_0000 {
            TAG_SINT6 => Ok(Value::Int((lead & 0b0011_1111) as i64 - 32)),
            TAG_NUMBER => {
                let negative = lead & 0b0010_0000 != 0;
                let nbytes = (lead & 0b0001_1111) as usize;
                if nbytes == 0 || nbytes > 8 {
                    return Err(ArkiError::parse(
                        "value",
                        format!("invalid integer width {nbytes}"),
                    ));
                }
                let raw = dec.pop_bytes(nbytes, "integer magnitude")?;
                let mut magnitude: u64 = 0;
                for b in raw {
                    magnitude = (magnitude << 8) | *b as u64;
                }
                let v = if negative {
                    (magnitude as i64).wrapping_neg()
                } else {
                    magnitude as i64
                };
                Ok(Value::Int(v))
            }
            TAG_STRING if lead != TAG_LONG_STRING => {
                let len = (lead & 0b0011_1111) as usize;
                let raw = dec.pop_bytes(len, "string")?;
                Ok(Value::String(String::from_utf8_lossy(raw).into_owned()))
            }
            _ => {
                let s = dec.pop_str16("long string")?;
                Ok(Value::String(s))
            }
        }
    }

    /// Parse the textual form: a decimal integer, or a double-quoted string.
    /// Returns the value and the number of bytes consumed.
    pub fn parse(s: &str) -> Result<(Value, usize)> {
        let s_trim = s.trim_start();
        let skipped = s.len() - s_trim.len();
        if let Some(rest) = s_trim.strip_prefix('"') {
            let (content, used) = c_unescape(rest);
            return Ok((Value::String(content), skipped + 1 + used));
        }
        let end = s_trim
            .find(|c: char| c == ',' || c == ')')
            .unwrap_or(s_trim.len());
        let tok = s_trim[..end].trim();
        match tok.parse::<i64>() {
            Ok(v) => Ok((Value::Int(v), skipped + end)),
            Err(_) if !tok.is_empty() => Ok((Value::String(tok.to_string()), skipped + end)),
            Err(_) => Err(ArkiError::parse("value", "empty value")),
        }
    }

    pub fn to_structured(&self) -> serde_json::Value {
        match self {
            Value::Int(v) => json!(v),
            Value::String(s) => json!(s),
        }
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Value> {
        match v {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| ArkiError::parse("value", "number out of range")),
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(ArkiError::parse(
                "value",
                format!("unsupported structured value: {other}"),
            )),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{}\"", c_escape(s)),
        }
    }
}

/// Ordered mapping from short ASCII keys to [`Value`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueBag {
    values: BTreeMap<String, Value>,
}

impl ValueBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// True iff every key of `other` exists in `self` with an equal value.
    pub fn contains(&self, other: &ValueBag) -> bool {
        other
            .values
            .iter()
            .all(|(k, v)| self.values.get(k) == Some(v))
    }

    /// Canonical binary encoding: entry count, then key-sorted entries of
    /// `{type byte, keylen, key, value payload}`.
    pub fn encode(&self, enc: &mut Encoder) {
        enc.add_varint(self.values.len() as u64);
        for (key, value) in &self.values {
            let mut tmp = Vec::new();
            value.encode(&mut Encoder::new(&mut tmp));
            enc.add_u8(tmp[0]);
            enc.add_u8(key.len().min(255) as u8);
            enc.add_bytes(&key.as_bytes()[..key.len().min(255)]);
            enc.add_bytes(&tmp[1..]);
        }
    }

    pub fn decode(dec: &mut Decoder) -> Result<ValueBag> {
        let n = dec.pop_varint("value count")?;
        let mut bag = ValueBag::new();
        for _ in 0..n {
            let lead = dec.pop_u8("value type")?;
            let keylen = dec.pop_u8("key length")? as usize;
            let raw_key = dec.pop_bytes(keylen, "key")?;
            let key = String::from_utf8(raw_key.to_vec())
                .map_err(|_| ArkiError::parse("valuebag", "key is not valid UTF-8"))?;
            let value = Value::decode_payload(lead, dec)?;
            bag.set(key, value);
        }
        Ok(bag)
    }

    /// Parse the textual form `key=value, key="string"…`; stops at an
    /// unbalanced `)` so it can be embedded in item argument lists.
    pub fn parse(s: &str) -> Result<ValueBag> {
        let mut bag = ValueBag::new();
        let mut rest = s.trim();
        while !rest.is_empty() && !rest.starts_with(')') {
            let eq = rest.find('=').ok_or_else(|| {
                ArkiError::parse("valuebag", format!("missing '=' in `{rest}`"))
            })?;
            let key = rest[..eq].trim().to_string();
            if key.is_empty() {
                return Err(ArkiError::parse("valuebag", "empty key"));
            }
            let (value, used) = Value::parse(&rest[eq + 1..])?;
            bag.set(key, value);
            rest = rest[eq + 1 + used..].trim_start();
            if let Some(r) = rest.strip_prefix(',') {
                rest = r.trim_start();
            } else {
                break;
            }
        }
        Ok(bag)
    }

    pub fn to_structured(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_structured()))
            .collect();
        serde_json::Value::Object(map)
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<ValueBag> {
        let obj = v
            .as_object()
            .ok_or_else(|| ArkiError::parse("valuebag", "expected an object"))?;
        let mut bag = ValueBag::new();
        for (k, v) in obj {
            bag.set(k.clone(), Value::from_structured(v)?);
        }
        Ok(bag)
    }
}

impl fmt::Display for ValueBag {
    /// `key=value` pairs joined by `, `, keys sorted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, (key, value)) in self.values.iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────
