//! Origin matcher: `GRIB1,centre,subcentre,process` with wildcard slots.

use std::fmt;

use crate::error::{ArkiError, Result};
use crate::matcher::{split_style, OptList};
use crate::types::Origin;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOrigin {
    Grib1(OptList),
    Grib2(OptList),
    Bufr(OptList),
    Odimh5 {
        wmo: Option<String>,
        rad: Option<String>,
        plc: Option<String>,
    },
}

impl MatchOrigin {
    pub fn parse(pattern: &str) -> Result<MatchOrigin> {
        let (style, rest) = split_style(pattern);
        match style {
            "GRIB1" => Ok(MatchOrigin::Grib1(OptList::parse("origin", rest)?)),
            "GRIB2" => Ok(MatchOrigin::Grib2(OptList::parse("origin", rest)?)),
            "BUFR" => Ok(MatchOrigin::Bufr(OptList::parse("origin", rest)?)),
            "ODIMH5" => {
                let mut fields = rest.splitn(3, ',').map(|s| {
                    let s = s.trim();
                    if s.is_empty() {
                        None
                    } else {
                        Some(s.to_string())
                    }
                });
                Ok(MatchOrigin::Odimh5 {
                    wmo: fields.next().flatten(),
                    rad: fields.next().flatten(),
                    plc: fields.next().flatten(),
                })
            }
            other => Err(ArkiError::parse(
                "origin",
                format!("unsupported origin style `{other}`"),
            )),
        }
    }

    pub fn matches(&self, origin: &Origin) -> bool {
        match (self, origin) {
            (
                MatchOrigin::Grib1(want),
                Origin::Grib1 {
                    centre,
                    subcentre,
                    process,
                },
            ) => want.matches(&[*centre, *subcentre, *process]),
            (
                MatchOrigin::Grib2(want),
                Origin::Grib2 {
                    centre,
                    subcentre,
                    processtype,
                    bgprocessid,
                    processid,
                },
            ) => want.matches(&[*centre, *subcentre, *processtype, *bgprocessid, *processid]),
            (MatchOrigin::Bufr(want), Origin::Bufr { centre, subcentre }) => {
                want.matches(&[*centre, *subcentre])
            }
            (
                MatchOrigin::Odimh5 {
                    wmo: want_wmo,
                    rad: want_rad,
                    plc: want_plc,
                },
                Origin::Odimh5 { wmo, rad, plc },
            ) => {
                want_wmo.as_deref().map_or(true, |w| w == wmo)
                    && want_rad.as_deref().map_or(true, |w| w == rad)
                    && want_plc.as_deref().map_or(true, |w| w == plc)
            }
            _ => false,
        }
    }
}

impl fmt::Display for MatchOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOrigin::Grib1(list) => list.fmt_after("GRIB1", f),
            MatchOrigin::Grib2(list) => list.fmt_after("GRIB2", f),
            MatchOrigin::Bufr(list) => list.fmt_after("BUFR", f),
            MatchOrigin::Odimh5 { wmo, rad, plc } => {
                write!(
                    f,
                    "ODIMH5,{},{},{}",
                    wmo.as_deref().unwrap_or(""),
                    rad.as_deref().unwrap_or(""),
                    plc.as_deref().unwrap_or("")
                )
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grib1_wildcards() {
        let origin = Origin::grib1(Some(200), Some(0), Some(101));
        assert!(MatchOrigin::parse("GRIB1").unwrap().matches(&origin));
        assert!(MatchOrigin::parse("GRIB1,200").unwrap().matches(&origin));
        assert!(MatchOrigin::parse("GRIB1,200,,101").unwrap().matches(&origin));
        assert!(!MatchOrigin::parse("GRIB1,80").unwrap().matches(&origin));
        assert!(!MatchOrigin::parse("GRIB1,200,1").unwrap().matches(&origin));
        assert!(!MatchOrigin::parse("BUFR,200").unwrap().matches(&origin));
    }

    #[test]
    fn test_odimh5_fields() {
        let origin = Origin::Odimh5 {
            wmo: "02954".into(),
            rad: "FI44".into(),
            plc: "Anjalankoski".into(),
        };
        assert!(MatchOrigin::parse("ODIMH5,02954").unwrap().matches(&origin));
        assert!(MatchOrigin::parse("ODIMH5,,FI44").unwrap().matches(&origin));
        assert!(!MatchOrigin::parse("ODIMH5,02955").unwrap().matches(&origin));
    }

    #[test]
    fn test_display_roundtrip() {
        for text in ["GRIB1,200", "GRIB1,200,,101", "BUFR,80,255"] {
            let m = MatchOrigin::parse(text).unwrap();
            assert_eq!(m.to_string(), text);
        }
    }
}
