//! Reference time of a datum: a position in time, or a period.

use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::time::Time;

const STYLE_POSITION: u8 = 1;
const STYLE_PERIOD: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reftime {
    Position(Time),
    Period { begin: Time, end: Time },
}

impl Reftime {
    pub fn position(t: Time) -> Self {
        Reftime::Position(t)
    }

    pub fn period(begin: Time, end: Time) -> Self {
        Reftime::Period { begin, end }
    }

    /// The time interval covered: a position covers a single instant.
    pub fn interval(&self) -> (Time, Time) {
        match self {
            Reftime::Position(t) => (*t, *t),
            Reftime::Period { begin, end } => (*begin, *end),
        }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Reftime::Position(t) => {
                enc.add_u8(STYLE_POSITION);
                t.encode(enc);
            }
            Reftime::Period { begin, end } => {
                enc.add_u8(STYLE_PERIOD);
                begin.encode(enc);
                end.encode(enc);
            }
        }
    }

    pub fn decode(dec: &mut Decoder) -> Result<Reftime> {
        match dec.pop_u8("reftime style")? {
            STYLE_POSITION => Ok(Reftime::Position(Time::decode(dec)?)),
            STYLE_PERIOD => Ok(Reftime::Period {
                begin: Time::decode(dec)?,
                end: Time::decode(dec)?,
            }),
            other => Err(ArkiError::parse(
                "reftime",
                format!("unknown reftime style {other}"),
            )),
        }
    }

    pub fn parse(s: &str) -> Result<Reftime> {
        let s = s.trim();
        match s.split_once(" to ") {
            Some((begin, end)) => Ok(Reftime::Period {
                begin: Time::parse(begin)?,
                end: Time::parse(end)?,
            }),
            None => Ok(Reftime::Position(Time::parse(s)?)),
        }
    }

    pub fn to_structured(&self) -> serde_json::Value {
        match self {
            Reftime::Position(t) => json!({"s": "POSITION", "ti": t.to_string()}),
            Reftime::Period { begin, end } => {
                json!({"s": "PERIOD", "b": begin.to_string(), "e": end.to_string()})
            }
        }
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Reftime> {
        match crate::types::structured_style("reftime", v)? {
            "POSITION" => {
                let ti = crate::types::structured_str("reftime", v, "ti")?;
                Ok(Reftime::Position(Time::parse(ti)?))
            }
            "PERIOD" => Ok(Reftime::Period {
                begin: Time::parse(crate::types::structured_str("reftime", v, "b")?)?,
                end: Time::parse(crate::types::structured_str("reftime", v, "e")?)?,
            }),
            other => Err(ArkiError::parse(
                "reftime",
                format!("unknown reftime style `{other}`"),
            )),
        }
    }
}

impl fmt::Display for Reftime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reftime::Position(t) => t.fmt(f),
            Reftime::Period { begin, end } => write!(f, "{begin} to {end}"),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
