//! Trailing observation value carried verbatim (VM2 data).

use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};

/// The raw datum tail, preserved byte for byte so the original line can be
/// reconstructed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueItem {
    pub content: String,
}

impl ValueItem {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.add_str16(&self.content);
    }

    pub fn decode(dec: &mut Decoder) -> Result<ValueItem> {
        Ok(ValueItem {
            content: dec.pop_str16("value content")?,
        })
    }

    pub fn parse(s: &str) -> Result<ValueItem> {
        Ok(ValueItem::new(s))
    }

    pub fn to_structured(&self) -> serde_json::Value {
        json!({"va": self.content})
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<ValueItem> {
        let content = v
            .get("va")
            .and_then(|x| x.as_str())
            .ok_or_else(|| ArkiError::parse("value", "missing content"))?;
        Ok(ValueItem::new(content))
    }
}

impl fmt::Display for ValueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let v = ValueItem::new("1.2,,,000000000");
        let mut buf = Vec::new();
        v.encode(&mut Encoder::new(&mut buf));
        assert_eq!(ValueItem::decode(&mut Decoder::new("test", &buf)).unwrap(), v);
        assert_eq!(ValueItem::parse(&v.to_string()).unwrap(), v);
        assert_eq!(ValueItem::from_structured(&v.to_structured()).unwrap(), v);
    }
}
