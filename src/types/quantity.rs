//! Physical quantities present in a polar volume (ODIMH5 data).

use std::collections::BTreeSet;
use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};

/// A sorted set of quantity names. The string form has no style prefix:
/// `DBZH, VRAD`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity {
    pub values: BTreeSet<String>,
}

impl Quantity {
    pub fn new(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.add_varint(self.values.len() as u64);
        for v in &self.values {
            enc.add_str8(v);
        }
    }

    pub fn decode(dec: &mut Decoder) -> Result<Quantity> {
        let n = dec.pop_varint("quantity count")?;
        let mut values = BTreeSet::new();
        for _ in 0..n {
            values.insert(dec.pop_str8("quantity")?);
        }
        Ok(Quantity { values })
    }

    pub fn parse(s: &str) -> Result<Quantity> {
        let values: BTreeSet<String> = s
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            return Err(ArkiError::parse("quantity", "empty quantity list"));
        }
        Ok(Quantity { values })
    }

    pub fn to_structured(&self) -> serde_json::Value {
        json!({"va": self.values.iter().collect::<Vec<_>>()})
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Quantity> {
        let arr = v
            .get("va")
            .and_then(|x| x.as_array())
            .ok_or_else(|| ArkiError::parse("quantity", "missing value list"))?;
        let mut values = BTreeSet::new();
        for item in arr {
            let s = item
                .as_str()
                .ok_or_else(|| ArkiError::parse("quantity", "quantity is not a string"))?;
            values.insert(s.to_string());
        }
        Ok(Quantity { values })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.values.iter().map(|s| s.as_str()).collect();
        f.write_str(&joined.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_and_sorting() {
        let q = Quantity::new(["VRAD", "DBZH"]);
        assert_eq!(q.to_string(), "DBZH, VRAD");

        let mut buf = Vec::new();
        q.encode(&mut Encoder::new(&mut buf));
        assert_eq!(Quantity::decode(&mut Decoder::new("test", &buf)).unwrap(), q);
        assert_eq!(Quantity::parse(&q.to_string()).unwrap(), q);
        assert_eq!(Quantity::from_structured(&q.to_structured()).unwrap(), q);
    }

    #[test]
    fn test_empty_rejected() {
        assert!(Quantity::parse("").is_err());
        assert!(Quantity::parse(" , ").is_err());
    }
}
