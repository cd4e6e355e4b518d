//! Model run: the time of day an acquisition cycle started.

use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::{outer_parse, structured_style};

const STYLE_MINUTE: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Run {
    /// Minutes since midnight.
    Minute { minute: u32 },
}

impl Run {
    pub fn minute(hour: u32, minute: u32) -> Self {
        Run::Minute {
            minute: hour * 60 + minute,
        }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        let Run::Minute { minute } = self;
        enc.add_u8(STYLE_MINUTE);
        enc.add_varint(*minute as u64);
    }

    pub fn decode(dec: &mut Decoder) -> Result<Run> {
        match dec.pop_u8("run style")? {
            STYLE_MINUTE => Ok(Run::Minute {
                minute: dec.pop_varint("run minute")? as u32,
            }),
            other => Err(ArkiError::parse("run", format!("unknown run style {other}"))),
        }
    }

    /// `MINUTE(12)` and `MINUTE(12:30)` are both accepted.
    pub fn parse(s: &str) -> Result<Run> {
        let (style, rest) = outer_parse("run", s)?;
        if style != "MINUTE" {
            return Err(ArkiError::parse("run", format!("unknown run style `{style}`")));
        }
        let rest = rest.trim();
        let (hour, minute) = match rest.split_once(':') {
            Some((h, m)) => (
                h.trim().parse::<u32>().map_err(|_| bad_number(h))?,
                m.trim().parse::<u32>().map_err(|_| bad_number(m))?,
            ),
            None => (rest.parse::<u32>().map_err(|_| bad_number(rest))?, 0),
        };
        Ok(Run::minute(hour, minute))
    }

    pub fn to_structured(&self) -> serde_json::Value {
        let Run::Minute { minute } = self;
        json!({"s": "MINUTE", "va": minute})
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Run> {
        match structured_style("run", v)? {
            "MINUTE" => {
                let minute = v
                    .get("va")
                    .and_then(|x| x.as_u64())
                    .ok_or_else(|| ArkiError::parse("run", "missing run minute"))?;
                Ok(Run::Minute {
                    minute: minute as u32,
                })
            }
            other => Err(ArkiError::parse("run", format!("unknown run style `{other}`"))),
        }
    }
}

fn bad_number(s: &str) -> ArkiError {
    ArkiError::parse("run", format!("`{s}` is not a number"))
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Run::Minute { minute } = self;
        write!(f, "MINUTE({:02}:{:02})", minute / 60, minute % 60)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
