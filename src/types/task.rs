//! Acquisition task name (ODIMH5 data).

use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};

/// A free-form task name, no style prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Task {
    pub name: String,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.add_str16(&self.name);
    }

    pub fn decode(dec: &mut Decoder) -> Result<Task> {
        Ok(Task {
            name: dec.pop_str16("task name")?,
        })
    }

    pub fn parse(s: &str) -> Result<Task> {
        let name = s.trim();
        if name.is_empty() {
            return Err(ArkiError::parse("task", "empty task name"));
        }
        Ok(Task::new(name))
    }

    pub fn to_structured(&self) -> serde_json::Value {
        json!({"va": self.name})
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Task> {
        let name = v
            .get("va")
            .and_then(|x| x.as_str())
            .ok_or_else(|| ArkiError::parse("task", "missing task name"))?;
        Ok(Task::new(name))
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let t = Task::new("ZZZ vol");
        let mut buf = Vec::new();
        t.encode(&mut Encoder::new(&mut buf));
        assert_eq!(Task::decode(&mut Decoder::new("test", &buf)).unwrap(), t);
        assert_eq!(Task::parse(&t.to_string()).unwrap(), t);
        assert_eq!(Task::from_structured(&t.to_structured()).unwrap(), t);
    }
}
