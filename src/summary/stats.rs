//! Per-entry aggregate statistics.

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::Time;

/// Count, total size and reference time interval of the data aggregated
/// under one summary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub count: u64,
    pub size: u64,
    pub reftime: Option<(Time, Time)>,
}

impl Stats {
    pub fn empty() -> Self {
        Self {
            count: 0,
            size: 0,
            reftime: None,
        }
    }

    pub fn for_datum(size: u64, reftime: Option<(Time, Time)>) -> Self {
        Self {
            count: 1,
            size,
            reftime,
        }
    }

    /// Merge counts, sizes and widen the interval.
    pub fn merge(&mut self, other: &Stats) {
        self.count += other.count;
        self.size += other.size;
        self.reftime = match (self.reftime, other.reftime) {
            (None, r) | (r, None) => r,
            (Some((b1, e1)), Some((b2, e2))) => Some((b1.min(b2), e1.max(e2))),
        };
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.add_varint(self.count);
        enc.add_varint(self.size);
        match self.reftime {
            None => {
                enc.add_u8(0);
            }
            Some((begin, end)) => {
                enc.add_u8(1);
                begin.encode(enc);
                end.encode(enc);
            }
        }
    }

    pub fn decode(dec: &mut Decoder) -> Result<Stats> {
        let count = dec.pop_varint("count")?;
        let size = dec.pop_varint("size")?;
        let reftime = match dec.pop_u8("reftime flag")? {
            0 => None,
            1 => Some((Time::decode(dec)?, Time::decode(dec)?)),
            other => {
                return Err(ArkiError::parse(
                    "summary stats",
                    format!("invalid reftime flag {other}"),
                ))
            }
        };
        Ok(Stats {
            count,
            size,
            reftime,
        })
    }

    pub fn to_structured(&self) -> serde_json::Value {
        match self.reftime {
            Some((begin, end)) => json!({
                "c": self.count,
                "s": self.size,
                "b": begin.to_string(),
                "e": end.to_string(),
            }),
            None => json!({"c": self.count, "s": self.size}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_widens_interval() {
        let mut a = Stats::for_datum(
            100,
            Some((Time::new(2007, 7, 8, 0, 0, 0), Time::new(2007, 7, 8, 0, 0, 0))),
        );
        let b = Stats::for_datum(
            50,
            Some((Time::new(2007, 7, 7, 0, 0, 0), Time::new(2007, 7, 9, 0, 0, 0))),
        );
        a.merge(&b);
        assert_eq!(a.count, 2);
        assert_eq!(a.size, 150);
        assert_eq!(
            a.reftime,
            Some((Time::new(2007, 7, 7, 0, 0, 0), Time::new(2007, 7, 9, 0, 0, 0)))
        );
    }

    #[test]
    fn test_roundtrip() {
        for stats in [
            Stats::empty(),
            Stats::for_datum(44412, Some((Time::new(2007, 7, 8, 13, 0, 0), Time::new(2007, 10, 9, 0, 0, 0)))),
        ] {
            let mut buf = Vec::new();
            stats.encode(&mut Encoder::new(&mut buf));
            assert_eq!(Stats::decode(&mut Decoder::new("test", &buf)).unwrap(), stats);
        }
    }
}
