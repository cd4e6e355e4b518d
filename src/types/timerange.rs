//! Time range: forecast step and statistical processing of a datum.

use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::{
    join_opt_fields, outer_parse, structured_opt_u32, structured_style, ArgList,
};

const STYLE_GRIB1: u8 = 1;
const STYLE_GRIB2: u8 = 2;
const STYLE_TIMEDEF: u8 = 3;
const STYLE_BUFR: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Timerange {
    Grib1 {
        ty: Option<u32>,
        unit: Option<u32>,
        p1: Option<u32>,
        p2: Option<u32>,
    },
    Grib2 {
        ty: Option<u32>,
        unit: Option<u32>,
        p1: Option<u32>,
        p2: Option<u32>,
    },
    Timedef {
        step_unit: Option<u32>,
        step_len: Option<u32>,
        stat_type: Option<u32>,
        stat_unit: Option<u32>,
        stat_len: Option<u32>,
    },
    Bufr {
        unit: Option<u32>,
        value: Option<u32>,
    },
}

impl Timerange {
    pub fn grib1(ty: Option<u32>, unit: Option<u32>, p1: Option<u32>, p2: Option<u32>) -> Self {
        Timerange::Grib1 { ty, unit, p1, p2 }
    }

    fn style_name(&self) -> &'static str {
        match self {
            Timerange::Grib1 { .. } => "GRIB1",
            Timerange::Grib2 { .. } => "GRIB2",
            Timerange::Timedef { .. } => "TIMEDEF",
            Timerange::Bufr { .. } => "BUFR",
        }
    }

    fn fields(&self) -> Vec<Option<u32>> {
        match self {
            Timerange::Grib1 { ty, unit, p1, p2 } | Timerange::Grib2 { ty, unit, p1, p2 } => {
                vec![*ty, *unit, *p1, *p2]
            }
            Timerange::Timedef {
                step_unit,
                step_len,
                stat_type,
                stat_unit,
                stat_len,
            } => vec![*step_unit, *step_len, *stat_type, *stat_unit, *stat_len],
            Timerange::Bufr { unit, value } => vec![*unit, *value],
        }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        let style = match self {
            Timerange::Grib1 { .. } => STYLE_GRIB1,
            Timerange::Grib2 { .. } => STYLE_GRIB2,
            Timerange::Timedef { .. } => STYLE_TIMEDEF,
            Timerange::Bufr { .. } => STYLE_BUFR,
        };
        enc.add_u8(style);
        for field in self.fields() {
            enc.add_opt_u32(field);
        }
    }

    pub fn decode(dec: &mut Decoder) -> Result<Timerange> {
        match dec.pop_u8("timerange style")? {
            STYLE_GRIB1 => Ok(Timerange::Grib1 {
                ty: dec.pop_opt_u32("type")?,
                unit: dec.pop_opt_u32("unit")?,
                p1: dec.pop_opt_u32("p1")?,
                p2: dec.pop_opt_u32("p2")?,
            }),
            STYLE_GRIB2 => Ok(Timerange::Grib2 {
                ty: dec.pop_opt_u32("type")?,
                unit: dec.pop_opt_u32("unit")?,
                p1: dec.pop_opt_u32("p1")?,
                p2: dec.pop_opt_u32("p2")?,
            }),
            STYLE_TIMEDEF => Ok(Timerange::Timedef {
                step_unit: dec.pop_opt_u32("step unit")?,
                step_len: dec.pop_opt_u32("step length")?,
                stat_type: dec.pop_opt_u32("statistical type")?,
                stat_unit: dec.pop_opt_u32("statistical unit")?,
                stat_len: dec.pop_opt_u32("statistical length")?,
            }),
            STYLE_BUFR => Ok(Timerange::Bufr {
                unit: dec.pop_opt_u32("unit")?,
                value: dec.pop_opt_u32("value")?,
            }),
            other => Err(ArkiError::parse(
                "timerange",
                format!("unknown timerange style {other}"),
            )),
        }
    }

    pub fn parse(s: &str) -> Result<Timerange> {
        let (style, rest) = outer_parse("timerange", s)?;
        let args = ArgList::new("timerange", rest);
        match style {
            "GRIB1" => Ok(Timerange::Grib1 {
                ty: args.opt_u32(0)?,
                unit: args.opt_u32(1)?,
                p1: args.opt_u32(2)?,
                p2: args.opt_u32(3)?,
            }),
            "GRIB2" => Ok(Timerange::Grib2 {
                ty: args.opt_u32(0)?,
                unit: args.opt_u32(1)?,
                p1: args.opt_u32(2)?,
                p2: args.opt_u32(3)?,
            }),
            "TIMEDEF" => Ok(Timerange::Timedef {
                step_unit: args.opt_u32(0)?,
                step_len: args.opt_u32(1)?,
                stat_type: args.opt_u32(2)?,
                stat_unit: args.opt_u32(3)?,
                stat_len: args.opt_u32(4)?,
            }),
            "BUFR" => Ok(Timerange::Bufr {
                unit: args.opt_u32(0)?,
                value: args.opt_u32(1)?,
            }),
            other => Err(ArkiError::parse(
                "timerange",
                format!("unknown timerange style `{other}`"),
            )),
        }
    }

    pub fn to_structured(&self) -> serde_json::Value {
        match self {
            Timerange::Grib1 { ty, unit, p1, p2 } => {
                json!({"s": "GRIB1", "ty": ty, "un": unit, "p1": p1, "p2": p2})
            }
            Timerange::Grib2 { ty, unit, p1, p2 } => {
                json!({"s": "GRIB2", "ty": ty, "un": unit, "p1": p1, "p2": p2})
            }
            Timerange::Timedef {
                step_unit,
                step_len,
                stat_type,
                stat_unit,
                stat_len,
            } => json!({
                "s": "TIMEDEF",
                "su": step_unit, "sl": step_len,
                "pt": stat_type, "pu": stat_unit, "pl": stat_len,
            }),
            Timerange::Bufr { unit, value } => json!({"s": "BUFR", "un": unit, "va": value}),
        }
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Timerange> {
        let w = "timerange";
        match structured_style(w, v)? {
            "GRIB1" => Ok(Timerange::Grib1 {
                ty: structured_opt_u32(w, v, "ty")?,
                unit: structured_opt_u32(w, v, "un")?,
                p1: structured_opt_u32(w, v, "p1")?,
                p2: structured_opt_u32(w, v, "p2")?,
            }),
            "GRIB2" => Ok(Timerange::Grib2 {
                ty: structured_opt_u32(w, v, "ty")?,
                unit: structured_opt_u32(w, v, "un")?,
                p1: structured_opt_u32(w, v, "p1")?,
                p2: structured_opt_u32(w, v, "p2")?,
            }),
            "TIMEDEF" => Ok(Timerange::Timedef {
                step_unit: structured_opt_u32(w, v, "su")?,
                step_len: structured_opt_u32(w, v, "sl")?,
                stat_type: structured_opt_u32(w, v, "pt")?,
                stat_unit: structured_opt_u32(w, v, "pu")?,
                stat_len: structured_opt_u32(w, v, "pl")?,
            }),
            "BUFR" => Ok(Timerange::Bufr {
                unit: structured_opt_u32(w, v, "un")?,
                value: structured_opt_u32(w, v, "va")?,
            }),
            other => Err(ArkiError::parse(w, format!("unknown timerange style `{other}`"))),
        }
    }
}

impl fmt::Display for Timerange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.style_name(), join_opt_fields(&self.fields()))
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(t: &Timerange) {
        let mut buf = Vec::new();
        t.encode(&mut Encoder::new(&mut buf));
        assert_eq!(&Timerange::decode(&mut Decoder::new("test", &buf)).unwrap(), t);
        assert_eq!(&Timerange::parse(&t.to_string()).unwrap(), t);
        assert_eq!(&Timerange::from_structured(&t.to_structured()).unwrap(), t);
    }

    #[test]
    fn test_roundtrips() {
        roundtrip(&Timerange::grib1(Some(0), Some(254), Some(0), Some(0)));
        roundtrip(&Timerange::grib1(Some(2), Some(1), Some(0), Some(12)));
        roundtrip(&Timerange::Grib2 {
            ty: Some(8),
            unit: Some(1),
            p1: Some(0),
            p2: Some(24),
        });
        roundtrip(&Timerange::Timedef {
            step_unit: Some(1),
            step_len: Some(6),
            stat_type: Some(0),
            stat_unit: Some(1),
            stat_len: Some(6),
        });
        roundtrip(&Timerange::Bufr {
            unit: Some(1),
            value: None,
        });
    }
}
