//! Origin of a datum: the generating centre and process.

use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::{
    join_opt_fields, outer_parse, structured_opt_u32, structured_str, structured_style, ArgList,
};

const STYLE_GRIB1: u8 = 1;
const STYLE_GRIB2: u8 = 2;
const STYLE_BUFR: u8 = 3;
const STYLE_ODIMH5: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Origin {
    Grib1 {
        centre: Option<u32>,
        subcentre: Option<u32>,
        process: Option<u32>,
    },
    Grib2 {
        centre: Option<u32>,
        subcentre: Option<u32>,
        processtype: Option<u32>,
        bgprocessid: Option<u32>,
        processid: Option<u32>,
    },
    Bufr {
        centre: Option<u32>,
        subcentre: Option<u32>,
    },
    Odimh5 {
        wmo: String,
        rad: String,
        plc: String,
    },
}

impl Origin {
    pub fn grib1(centre: Option<u32>, subcentre: Option<u32>, process: Option<u32>) -> Self {
        Origin::Grib1 {
            centre,
            subcentre,
            process,
        }
    }

    pub fn bufr(centre: Option<u32>, subcentre: Option<u32>) -> Self {
        Origin::Bufr { centre, subcentre }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Origin::Grib1 {
                centre,
                subcentre,
                process,
            } => {
                enc.add_u8(STYLE_GRIB1);
                enc.add_opt_u32(*centre);
                enc.add_opt_u32(*subcentre);
                enc.add_opt_u32(*process);
            }
            Origin::Grib2 {
                centre,
                subcentre,
                processtype,
                bgprocessid,
                processid,
            } => {
                enc.add_u8(STYLE_GRIB2);
                enc.add_opt_u32(*centre);
                enc.add_opt_u32(*subcentre);
                enc.add_opt_u32(*processtype);
                enc.add_opt_u32(*bgprocessid);
                enc.add_opt_u32(*processid);
            }
            Origin::Bufr { centre, subcentre } => {
                enc.add_u8(STYLE_BUFR);
                enc.add_opt_u32(*centre);
                enc.add_opt_u32(*subcentre);
            }
            Origin::Odimh5 { wmo, rad, plc } => {
                enc.add_u8(STYLE_ODIMH5);
                enc.add_str8(wmo);
                enc.add_str8(rad);
                enc.add_str8(plc);
            }
        }
    }

    pub fn decode(dec: &mut Decoder) -> Result<Origin> {
        match dec.pop_u8("origin style")? {
            STYLE_GRIB1 => Ok(Origin::Grib1 {
                centre: dec.pop_opt_u32("centre")?,
                subcentre: dec.pop_opt_u32("subcentre")?,
                process: dec.pop_opt_u32("process")?,
            }),
            STYLE_GRIB2 => Ok(Origin::Grib2 {
                centre: dec.pop_opt_u32("centre")?,
                subcentre: dec.pop_opt_u32("subcentre")?,
                processtype: dec.pop_opt_u32("processtype")?,
                bgprocessid: dec.pop_opt_u32("bgprocessid")?,
                processid: dec.pop_opt_u32("processid")?,
            }),
            STYLE_BUFR => Ok(Origin::Bufr {
                centre: dec.pop_opt_u32("centre")?,
                subcentre: dec.pop_opt_u32("subcentre")?,
            }),
            STYLE_ODIMH5 => Ok(Origin::Odimh5 {
                wmo: dec.pop_str8("wmo")?,
                rad: dec.pop_str8("rad")?,
                plc: dec.pop_str8("plc")?,
            }),
            other => Err(ArkiError::parse(
                "origin",
                format!("unknown origin style {other}"),
            )),
        }
    }

    pub fn parse(s: &str) -> Result<Origin> {
        let (style, rest) = outer_parse("origin", s)?;
        let args = ArgList::new("origin", rest);
        match style {
            "GRIB1" => Ok(Origin::Grib1 {
                centre: args.opt_u32(0)?,
                subcentre: args.opt_u32(1)?,
                process: args.opt_u32(2)?,
            }),
            "GRIB2" => Ok(Origin::Grib2 {
                centre: args.opt_u32(0)?,
                subcentre: args.opt_u32(1)?,
                processtype: args.opt_u32(2)?,
                bgprocessid: args.opt_u32(3)?,
                processid: args.opt_u32(4)?,
            }),
            "BUFR" => Ok(Origin::Bufr {
                centre: args.opt_u32(0)?,
                subcentre: args.opt_u32(1)?,
            }),
            "ODIMH5" => Ok(Origin::Odimh5 {
                wmo: args.string(0)?.to_string(),
                rad: args.string(1)?.to_string(),
                plc: args.string(2)?.to_string(),
            }),
            other => Err(ArkiError::parse(
                "origin",
                format!("unknown origin style `{other}`"),
            )),
        }
    }

    pub fn to_structured(&self) -> serde_json::Value {
        match self {
            Origin::Grib1 {
                centre,
                subcentre,
                process,
            } => json!({
                "s": "GRIB1",
                "ce": centre,
                "sc": subcentre,
                "pr": process,
            }),
            Origin::Grib2 {
                centre,
                subcentre,
                processtype,
                bgprocessid,
                processid,
            } => json!({
                "s": "GRIB2",
                "ce": centre,
                "sc": subcentre,
                "pt": processtype,
                "bi": bgprocessid,
                "pi": processid,
            }),
            Origin::Bufr { centre, subcentre } => json!({
                "s": "BUFR",
                "ce": centre,
                "sc": subcentre,
            }),
            Origin::Odimh5 { wmo, rad, plc } => json!({
                "s": "ODIMH5",
                "wmo": wmo,
                "rad": rad,
                "plc": plc,
            }),
        }
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Origin> {
        match structured_style("origin", v)? {
            "GRIB1" => Ok(Origin::Grib1 {
                centre: structured_opt_u32("origin", v, "ce")?,
                subcentre: structured_opt_u32("origin", v, "sc")?,
                process: structured_opt_u32("origin", v, "pr")?,
            }),
            "GRIB2" => Ok(Origin::Grib2 {
                centre: structured_opt_u32("origin", v, "ce")?,
                subcentre: structured_opt_u32("origin", v, "sc")?,
                processtype: structured_opt_u32("origin", v, "pt")?,
                bgprocessid: structured_opt_u32("origin", v, "bi")?,
                processid: structured_opt_u32("origin", v, "pi")?,
            }),
            "BUFR" => Ok(Origin::Bufr {
                centre: structured_opt_u32("origin", v, "ce")?,
                subcentre: structured_opt_u32("origin", v, "sc")?,
            }),
            "ODIMH5" => Ok(Origin::Odimh5 {
                wmo: structured_str("origin", v, "wmo")?.to_string(),
                rad: structured_str("origin", v, "rad")?.to_string(),
                plc: structured_str("origin", v, "plc")?.to_string(),
            }),
            other => Err(ArkiError::parse(
                "origin",
                format!("unknown origin style `{other}`"),
            )),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Grib1 {
                centre,
                subcentre,
                process,
            } => write!(
                f,
                "GRIB1({})",
                join_opt_fields(&[*centre, *subcentre, *process])
            ),
            Origin::Grib2 {
                centre,
                subcentre,
                processtype,
                bgprocessid,
                processid,
            } => write!(
                f,
                "GRIB2({})",
                join_opt_fields(&[*centre, *subcentre, *processtype, *bgprocessid, *processid])
            ),
            Origin::Bufr { centre, subcentre } => {
                write!(f, "BUFR({})", join_opt_fields(&[*centre, *subcentre]))
            }
            Origin::Odimh5 { wmo, rad, plc } => write!(f, "ODIMH5({wmo}, {rad}, {plc})"),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(o: &Origin) {
        let mut buf = Vec::new();
        o.encode(&mut Encoder::new(&mut buf));
        let back = Origin::decode(&mut Decoder::new("test", &buf)).unwrap();
        assert_eq!(&back, o, "binary roundtrip");

        let s = o.to_string();
        assert_eq!(&Origin::parse(&s).unwrap(), o, "string roundtrip of `{s}`");

        let js = o.to_structured();
        assert_eq!(&Origin::from_structured(&js).unwrap(), o, "structured roundtrip");
    }

    #[test]
    fn test_grib1_roundtrips() {
        roundtrip(&Origin::grib1(Some(200), Some(0), Some(101)));
        roundtrip(&Origin::grib1(Some(98), None, Some(12)));
        roundtrip(&Origin::grib1(Some(98), None, None));
        roundtrip(&Origin::grib1(None, None, None));
    }

    #[test]
    fn test_other_styles_roundtrip() {
        roundtrip(&Origin::Grib2 {
            centre: Some(98),
            subcentre: Some(1),
            processtype: Some(2),
            bgprocessid: Some(3),
            processid: Some(4),
        });
        roundtrip(&Origin::bufr(Some(80), Some(255)));
        roundtrip(&Origin::Odimh5 {
            wmo: "wmo".into(),
            rad: "rad".into(),
            plc: "plc".into(),
        });
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(
            Origin::grib1(Some(200), Some(0), Some(101)).to_string(),
            "GRIB1(200, 0, 101)"
        );
        assert_eq!(Origin::grib1(Some(98), None, None).to_string(), "GRIB1(98)");
        assert_eq!(
            Origin::grib1(Some(98), None, Some(1)).to_string(),
            "GRIB1(98, -, 1)"
        );
        // Tolerant parse: 0 to 3 integer fields.
        assert_eq!(
            Origin::parse("GRIB1,200").is_err(),
            true,
            "matcher syntax is not item syntax"
        );
        assert_eq!(
            Origin::parse("GRIB1(200)").unwrap(),
            Origin::grib1(Some(200), None, None)
        );
        assert_eq!(Origin::parse("GRIB1").unwrap(), Origin::grib1(None, None, None));
    }

    #[test]
    fn test_undefined_orders_before_defined() {
        let undef = Origin::grib1(None, Some(0), Some(0));
        let defined = Origin::grib1(Some(0), Some(0), Some(0));
        assert!(undef < defined);
    }

    #[test]
    fn test_unknown_style_fails() {
        assert!(Origin::parse("MAGIC(1)").is_err());
        let buf = [9u8, 0, 0, 0, 0];
        assert!(Origin::decode(&mut Decoder::new("test", &buf)).is_err());
    }
}
