//! Which dataset a datum was acquired into, and when.

use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::time::Time;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Assigneddataset {
    pub name: String,
    pub changed: Time,
}

impl Assigneddataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            changed: Time::now(),
        }
    }

    pub fn with_time(name: impl Into<String>, changed: Time) -> Self {
        Self {
            name: name.into(),
            changed,
        }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        self.changed.encode(enc);
        enc.add_str8(&self.name);
    }

    pub fn decode(dec: &mut Decoder) -> Result<Assigneddataset> {
        Ok(Assigneddataset {
            changed: Time::decode(dec)?,
            name: dec.pop_str8("dataset name")?,
        })
    }

    /// `name as of 2007-06-05T04:03:02Z`.
    pub fn parse(s: &str) -> Result<Assigneddataset> {
        let (name, time) = s
            .split_once(" as of ")
            .ok_or_else(|| ArkiError::parse("assigneddataset", "missing ` as of `"))?;
        Ok(Assigneddataset {
            name: name.trim().to_string(),
            changed: Time::parse(time)?,
        })
    }

    pub fn to_structured(&self) -> serde_json::Value {
        json!({"na": self.name, "ch": self.changed.to_string()})
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Assigneddataset> {
        let na = v
            .get("na")
            .and_then(|x| x.as_str())
            .ok_or_else(|| ArkiError::parse("assigneddataset", "missing dataset name"))?;
        let ch = v
            .get("ch")
            .and_then(|x| x.as_str())
            .ok_or_else(|| ArkiError::parse("assigneddataset", "missing change time"))?;
        Ok(Assigneddataset {
            name: na.to_string(),
            changed: Time::parse(ch)?,
        })
    }
}

impl fmt::Display for Assigneddataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} as of {}", self.name, self.changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let a = Assigneddataset::with_time("test200", Time::new(2007, 6, 5, 4, 3, 2));
        let mut buf = Vec::new();
        a.encode(&mut Encoder::new(&mut buf));
        assert_eq!(
            Assigneddataset::decode(&mut Decoder::new("test", &buf)).unwrap(),
            a
        );
        assert_eq!(Assigneddataset::parse(&a.to_string()).unwrap(), a);
        assert_eq!(Assigneddataset::from_structured(&a.to_structured()).unwrap(), a);
        assert_eq!(a.to_string(), "test200 as of 2007-06-05T04:03:02Z");
    }
}
