//! Vertical level or layer of a datum.

use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::{
    join_opt_fields, outer_parse, structured_opt_u32, structured_style, ArgList,
};

const STYLE_GRIB1: u8 = 1;
const STYLE_GRIB2S: u8 = 2;
const STYLE_GRIB2D: u8 = 3;
const STYLE_ODIMH5: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Grib1 {
        ty: Option<u32>,
        l1: Option<u32>,
        l2: Option<u32>,
    },
    /// Single GRIB2 level: value scaled by 10^-scale.
    Grib2S {
        ty: Option<u32>,
        scale: Option<u32>,
        value: Option<u32>,
    },
    /// GRIB2 layer between two levels.
    Grib2D {
        ty1: Option<u32>,
        scale1: Option<u32>,
        value1: Option<u32>,
        ty2: Option<u32>,
        scale2: Option<u32>,
        value2: Option<u32>,
    },
    /// Height range in hundredths of a meter.
    Odimh5 {
        min: i32,
        max: i32,
    },
}

impl Level {
    pub fn grib1(ty: Option<u32>, l1: Option<u32>, l2: Option<u32>) -> Self {
        Level::Grib1 { ty, l1, l2 }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Level::Grib1 { ty, l1, l2 } => {
                enc.add_u8(STYLE_GRIB1);
                enc.add_opt_u32(*ty);
                enc.add_opt_u32(*l1);
                enc.add_opt_u32(*l2);
            }
            Level::Grib2S { ty, scale, value } => {
                enc.add_u8(STYLE_GRIB2S);
                enc.add_opt_u32(*ty);
                enc.add_opt_u32(*scale);
                enc.add_opt_u32(*value);
            }
            Level::Grib2D {
                ty1,
                scale1,
                value1,
                ty2,
                scale2,
                value2,
            } => {
                enc.add_u8(STYLE_GRIB2D);
                enc.add_opt_u32(*ty1);
                enc.add_opt_u32(*scale1);
                enc.add_opt_u32(*value1);
                enc.add_opt_u32(*ty2);
                enc.add_opt_u32(*scale2);
                enc.add_opt_u32(*value2);
            }
            Level::Odimh5 { min, max } => {
                enc.add_u8(STYLE_ODIMH5);
                enc.add_u32(*min as u32);
                enc.add_u32(*max as u32);
            }
        }
    }

    pub fn decode(dec: &mut Decoder) -> Result<Level> {
        match dec.pop_u8("level style")? {
            STYLE_GRIB1 => Ok(Level::Grib1 {
                ty: dec.pop_opt_u32("type")?,
                l1: dec.pop_opt_u32("l1")?,
                l2: dec.pop_opt_u32("l2")?,
            }),
            STYLE_GRIB2S => Ok(Level::Grib2S {
                ty: dec.pop_opt_u32("type")?,
                scale: dec.pop_opt_u32("scale")?,
                value: dec.pop_opt_u32("value")?,
            }),
            STYLE_GRIB2D => Ok(Level::Grib2D {
                ty1: dec.pop_opt_u32("type1")?,
                scale1: dec.pop_opt_u32("scale1")?,
                value1: dec.pop_opt_u32("value1")?,
                ty2: dec.pop_opt_u32("type2")?,
                scale2: dec.pop_opt_u32("scale2")?,
                value2: dec.pop_opt_u32("value2")?,
            }),
            STYLE_ODIMH5 => Ok(Level::Odimh5 {
                min: dec.pop_u32("min")? as i32,
                max: dec.pop_u32("max")? as i32,
            }),
            other => Err(ArkiError::parse(
                "level",
                format!("unknown level style {other}"),
            )),
        }
    }

    pub fn parse(s: &str) -> Result<Level> {
        let (style, rest) = outer_parse("level", s)?;
        let args = ArgList::new("level", rest);
        match style {
            "GRIB1" => Ok(Level::Grib1 {
                ty: args.opt_u32(0)?,
                l1: args.opt_u32(1)?,
                l2: args.opt_u32(2)?,
            }),
            "GRIB2S" => Ok(Level::Grib2S {
                ty: args.opt_u32(0)?,
                scale: args.opt_u32(1)?,
                value: args.opt_u32(2)?,
            }),
            "GRIB2D" => Ok(Level::Grib2D {
                ty1: args.opt_u32(0)?,
                scale1: args.opt_u32(1)?,
                value1: args.opt_u32(2)?,
                ty2: args.opt_u32(3)?,
                scale2: args.opt_u32(4)?,
                value2: args.opt_u32(5)?,
            }),
            "ODIMH5" => Ok(Level::Odimh5 {
                min: args
                    .opt_i32(0)?
                    .ok_or_else(|| ArkiError::parse("level", "missing min height"))?,
                max: args
                    .opt_i32(1)?
                    .ok_or_else(|| ArkiError::parse("level", "missing max height"))?,
            }),
            other => Err(ArkiError::parse(
                "level",
                format!("unknown level style `{other}`"),
            )),
        }
    }

    pub fn to_structured(&self) -> serde_json::Value {
        match self {
            Level::Grib1 { ty, l1, l2 } => json!({"s": "GRIB1", "lt": ty, "l1": l1, "l2": l2}),
            Level::Grib2S { ty, scale, value } => {
                json!({"s": "GRIB2S", "lt": ty, "sc": scale, "va": value})
            }
            Level::Grib2D {
                ty1,
                scale1,
                value1,
                ty2,
                scale2,
                value2,
            } => json!({
                "s": "GRIB2D",
                "l1": ty1, "s1": scale1, "v1": value1,
                "l2": ty2, "s2": scale2, "v2": value2,
            }),
            Level::Odimh5 { min, max } => json!({"s": "ODIMH5", "mi": min, "ma": max}),
        }
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Level> {
        match structured_style("level", v)? {
            "GRIB1" => Ok(Level::Grib1 {
                ty: structured_opt_u32("level", v, "lt")?,
                l1: structured_opt_u32("level", v, "l1")?,
                l2: structured_opt_u32("level", v, "l2")?,
            }),
            "GRIB2S" => Ok(Level::Grib2S {
                ty: structured_opt_u32("level", v, "lt")?,
                scale: structured_opt_u32("level", v, "sc")?,
                value: structured_opt_u32("level", v, "va")?,
            }),
            "GRIB2D" => Ok(Level::Grib2D {
                ty1: structured_opt_u32("level", v, "l1")?,
                scale1: structured_opt_u32("level", v, "s1")?,
                value1: structured_opt_u32("level", v, "v1")?,
                ty2: structured_opt_u32("level", v, "l2")?,
                scale2: structured_opt_u32("level", v, "s2")?,
                value2: structured_opt_u32("level", v, "v2")?,
            }),
            "ODIMH5" => {
                let min = v.get("mi").and_then(|x| x.as_i64());
                let max = v.get("ma").and_then(|x| x.as_i64());
                match (min, max) {
                    (Some(min), Some(max)) => Ok(Level::Odimh5 {
                        min: min as i32,
                        max: max as i32,
                    }),
                    _ => Err(ArkiError::parse("level", "missing ODIMH5 heights")),
                }
            }
            other => Err(ArkiError::parse(
                "level",
                format!("unknown level style `{other}`"),
            )),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Grib1 { ty, l1, l2 } => {
                write!(f, "GRIB1({})", join_opt_fields(&[*ty, *l1, *l2]))
            }
            Level::Grib2S { ty, scale, value } => {
                write!(f, "GRIB2S({})", join_opt_fields(&[*ty, *scale, *value]))
            }
            Level::Grib2D {
                ty1,
                scale1,
                value1,
                ty2,
                scale2,
                value2,
            } => write!(
                f,
                "GRIB2D({})",
                join_opt_fields(&[*ty1, *scale1, *value1, *ty2, *scale2, *value2])
            ),
            Level::Odimh5 { min, max } => write!(f, "ODIMH5({min}, {max})"),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
