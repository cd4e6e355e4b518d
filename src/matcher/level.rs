//! Level matcher.

use std::fmt;

use crate::error::{ArkiError, Result};
use crate::matcher::{split_style, OptList};
use crate::types::Level;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchLevel {
    Grib1(OptList),
    Grib2S(OptList),
    Grib2D(OptList),
    Odimh5 {
        min: Option<i32>,
        max: Option<i32>,
    },
}

impl MatchLevel {
    pub fn parse(pattern: &str) -> Result<MatchLevel> {
        let (style, rest) = split_style(pattern);
        match style {
            "GRIB1" => Ok(MatchLevel::Grib1(OptList::parse("level", rest)?)),
            "GRIB2S" => Ok(MatchLevel::Grib2S(OptList::parse("level", rest)?)),
            "GRIB2D" => Ok(MatchLevel::Grib2D(OptList::parse("level", rest)?)),
            "ODIMH5" => {
                let mut fields = rest.splitn(2, ',').map(|s| -> Result<Option<i32>> {
                    let s = s.trim();
                    if s.is_empty() {
                        Ok(None)
                    } else {
                        s.parse::<i32>().map(Some).map_err(|_| {
                            ArkiError::parse("level", format!("`{s}` is not an integer"))
                        })
                    }
                });
                Ok(MatchLevel::Odimh5 {
                    min: fields.next().transpose()?.flatten(),
                    max: fields.next().transpose()?.flatten(),
                })
            }
            other => Err(ArkiError::parse(
                "level",
                format!("unsupported level style `{other}`"),
            )),
        }
    }

    pub fn matches(&self, level: &Level) -> bool {
        match (self, level) {
            (MatchLevel::Grib1(want), Level::Grib1 { ty, l1, l2 }) => {
                want.matches(&[*ty, *l1, *l2])
            }
            (MatchLevel::Grib2S(want), Level::Grib2S { ty, scale, value }) => {
                want.matches(&[*ty, *scale, *value])
            }
            (
                MatchLevel::Grib2D(want),
                Level::Grib2D {
                    ty1,
                    scale1,
                    value1,
                    ty2,
                    scale2,
                    value2,
                },
            ) => want.matches(&[*ty1, *scale1, *value1, *ty2, *scale2, *value2]),
            (
                MatchLevel::Odimh5 {
                    min: want_min,
                    max: want_max,
                },
                Level::Odimh5 { min, max },
            ) => {
                want_min.map_or(true, |w| w == *min) && want_max.map_or(true, |w| w == *max)
            }
            _ => false,
        }
    }
}

impl fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchLevel::Grib1(list) => list.fmt_after("GRIB1", f),
            MatchLevel::Grib2S(list) => list.fmt_after("GRIB2S", f),
            MatchLevel::Grib2D(list) => list.fmt_after("GRIB2D", f),
            MatchLevel::Odimh5 { min, max } => {
                f.write_str("ODIMH5")?;
                if let Some(min) = min {
                    write!(f, ",{min}")?;
                } else if max.is_some() {
                    f.write_str(",")?;
                }
                if let Some(max) = max {
                    write!(f, ",{max}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grib1() {
        let l = Level::grib1(Some(110), Some(12), Some(13));
        assert!(MatchLevel::parse("GRIB1,110").unwrap().matches(&l));
        assert!(MatchLevel::parse("GRIB1,110,12,13").unwrap().matches(&l));
        assert!(!MatchLevel::parse("GRIB1,1").unwrap().matches(&l));
        assert!(!MatchLevel::parse("GRIB2S,110").unwrap().matches(&l));
    }
}
