//! Processing notes attached to a metadata during its lifetime.

use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::time::Time;

/// A timestamped annotation. NOTE is the one repeatable item: a metadata
/// accumulates notes as it moves through dispatch and maintenance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Note {
    pub time: Time,
    pub content: String,
}

impl Note {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            time: Time::now(),
            content: content.into(),
        }
    }

    pub fn with_time(time: Time, content: impl Into<String>) -> Self {
        Self {
            time,
            content: content.into(),
        }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        self.time.encode(enc);
        enc.add_str16(&self.content);
    }

    pub fn decode(dec: &mut Decoder) -> Result<Note> {
        Ok(Note {
            time: Time::decode(dec)?,
            content: dec.pop_str16("note content")?,
        })
    }

    /// `[2007-06-05T04:03:02Z] text`.
    pub fn parse(s: &str) -> Result<Note> {
        let s = s.trim();
        let rest = s
            .strip_prefix('[')
            .ok_or_else(|| ArkiError::parse("note", "missing [timestamp]"))?;
        let close = rest
            .find(']')
            .ok_or_else(|| ArkiError::parse("note", "missing closing bracket"))?;
        Ok(Note {
            time: Time::parse(&rest[..close])?,
            content: rest[close + 1..].trim_start().to_string(),
        })
    }

    pub fn to_structured(&self) -> serde_json::Value {
        json!({"ti": self.time.to_string(), "va": self.content})
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Note> {
        let ti = v
            .get("ti")
            .and_then(|x| x.as_str())
            .ok_or_else(|| ArkiError::parse("note", "missing timestamp"))?;
        let content = v
            .get("va")
            .and_then(|x| x.as_str())
            .ok_or_else(|| ArkiError::parse("note", "missing content"))?;
        Ok(Note {
            time: Time::parse(ti)?,
            content: content.to_string(),
        })
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.time, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let n = Note::with_time(Time::new(2007, 6, 5, 4, 3, 2), "test note");
        let mut buf = Vec::new();
        n.encode(&mut Encoder::new(&mut buf));
        assert_eq!(Note::decode(&mut Decoder::new("test", &buf)).unwrap(), n);
        assert_eq!(Note::parse(&n.to_string()).unwrap(), n);
        assert_eq!(Note::from_structured(&n.to_structured()).unwrap(), n);
        assert_eq!(n.to_string(), "[2007-06-05T04:03:02Z] test note");
    }

    #[test]
    fn test_parse_rejects_bare_text() {
        assert!(Note::parse("no timestamp").is_err());
    }
}
