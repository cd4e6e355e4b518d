//! Time range matcher.

use std::fmt;

use crate::error::{ArkiError, Result};
use crate::matcher::{split_style, OptList};
use crate::types::Timerange;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchTimerange {
    Grib1(OptList),
    Grib2(OptList),
    Timedef(OptList),
    Bufr(OptList),
}

impl MatchTimerange {
    pub fn parse(pattern: &str) -> Result<MatchTimerange> {
        let (style, rest) = split_style(pattern);
        match style {
            "GRIB1" => Ok(MatchTimerange::Grib1(OptList::parse("timerange", rest)?)),
            "GRIB2" => Ok(MatchTimerange::Grib2(OptList::parse("timerange", rest)?)),
            "TIMEDEF" => Ok(MatchTimerange::Timedef(OptList::parse("timerange", rest)?)),
            "BUFR" => Ok(MatchTimerange::Bufr(OptList::parse("timerange", rest)?)),
            other => Err(ArkiError::parse(
                "timerange",
                format!("unsupported timerange style `{other}`"),
            )),
        }
    }

    pub fn matches(&self, tr: &Timerange) -> bool {
        match (self, tr) {
            (MatchTimerange::Grib1(want), Timerange::Grib1 { ty, unit, p1, p2 }) => {
                want.matches(&[*ty, *unit, *p1, *p2])
            }
            (MatchTimerange::Grib2(want), Timerange::Grib2 { ty, unit, p1, p2 }) => {
                want.matches(&[*ty, *unit, *p1, *p2])
            }
            (
                MatchTimerange::Timedef(want),
                Timerange::Timedef {
                    step_unit,
                    step_len,
                    stat_type,
                    stat_unit,
                    stat_len,
                },
            ) => want.matches(&[*step_unit, *step_len, *stat_type, *stat_unit, *stat_len]),
            (MatchTimerange::Bufr(want), Timerange::Bufr { unit, value }) => {
                want.matches(&[*unit, *value])
            }
            _ => false,
        }
    }
}

impl fmt::Display for MatchTimerange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchTimerange::Grib1(list) => list.fmt_after("GRIB1", f),
            MatchTimerange::Grib2(list) => list.fmt_after("GRIB2", f),
            MatchTimerange::Timedef(list) => list.fmt_after("TIMEDEF", f),
            MatchTimerange::Bufr(list) => list.fmt_after("BUFR", f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grib1() {
        let tr = Timerange::grib1(Some(2), Some(1), Some(0), Some(12));
        assert!(MatchTimerange::parse("GRIB1,2").unwrap().matches(&tr));
        assert!(MatchTimerange::parse("GRIB1,2,1,0,12").unwrap().matches(&tr));
        assert!(!MatchTimerange::parse("GRIB1,0").unwrap().matches(&tr));
    }
}
