//! Bounding box of a datum's area.
//!
//! Coordinates are in hundredths of a degree, so the textual forms
//! `POINT(44, 11)` and `BOX(42, 42.5, 10, 11)` parse exactly. Geometry is
//! limited to points and axis-aligned boxes.

use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::{outer_parse, structured_style};

const STYLE_INVALID: u8 = 1;
const STYLE_POINT: u8 = 2;
const STYLE_BOX: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bbox {
    Invalid,
    Point {
        lat: i32,
        lon: i32,
    },
    /// `BOX(latmin, latmax, lonmin, lonmax)`.
    Box {
        latmin: i32,
        latmax: i32,
        lonmin: i32,
        lonmax: i32,
    },
}

impl Bbox {
    /// True iff every point of `other` lies within `self`.
    pub fn covers(&self, other: &Bbox) -> bool {
        match (self, other) {
            (
                Bbox::Box {
                    latmin,
                    latmax,
                    lonmin,
                    lonmax,
                },
                Bbox::Point { lat, lon },
            ) => lat >= latmin && lat <= latmax && lon >= lonmin && lon <= lonmax,
            (
                Bbox::Box {
                    latmin,
                    latmax,
                    lonmin,
                    lonmax,
                },
                Bbox::Box {
                    latmin: olatmin,
                    latmax: olatmax,
                    lonmin: olonmin,
                    lonmax: olonmax,
                },
            ) => {
                olatmin >= latmin && olatmax <= latmax && olonmin >= lonmin && olonmax <= lonmax
            }
            (Bbox::Point { lat, lon }, Bbox::Point { lat: olat, lon: olon }) => {
                lat == olat && lon == olon
            }
            _ => false,
        }
    }

    /// True iff the two geometries share at least one point.
    pub fn intersects(&self, other: &Bbox) -> bool {
        fn span(b: &Bbox) -> Option<(i32, i32, i32, i32)> {
            match b {
                Bbox::Point { lat, lon } => Some((*lat, *lat, *lon, *lon)),
                Bbox::Box {
                    latmin,
                    latmax,
                    lonmin,
                    lonmax,
                } => Some((*latmin, *latmax, *lonmin, *lonmax)),
                Bbox::Invalid => None,
            }
        }
        match (span(self), span(other)) {
            (Some((alat0, alat1, alon0, alon1)), Some((blat0, blat1, blon0, blon1))) => {
                alat0 <= blat1 && blat0 <= alat1 && alon0 <= blon1 && blon0 <= alon1
            }
            _ => false,
        }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Bbox::Invalid => {
                enc.add_u8(STYLE_INVALID);
            }
            Bbox::Point { lat, lon } => {
                enc.add_u8(STYLE_POINT);
                enc.add_u32(*lat as u32);
                enc.add_u32(*lon as u32);
            }
            Bbox::Box {
                latmin,
                latmax,
                lonmin,
                lonmax,
            } => {
                enc.add_u8(STYLE_BOX);
                enc.add_u32(*latmin as u32);
                enc.add_u32(*latmax as u32);
                enc.add_u32(*lonmin as u32);
                enc.add_u32(*lonmax as u32);
            }
        }
    }

    pub fn decode(dec: &mut Decoder) -> Result<Bbox> {
        match dec.pop_u8("bbox style")? {
            STYLE_INVALID => Ok(Bbox::Invalid),
            STYLE_POINT => Ok(Bbox::Point {
                lat: dec.pop_u32("lat")? as i32,
                lon: dec.pop_u32("lon")? as i32,
            }),
            STYLE_BOX => Ok(Bbox::Box {
                latmin: dec.pop_u32("latmin")? as i32,
                latmax: dec.pop_u32("latmax")? as i32,
                lonmin: dec.pop_u32("lonmin")? as i32,
                lonmax: dec.pop_u32("lonmax")? as i32,
            }),
            other => Err(ArkiError::parse("bbox", format!("unknown bbox style {other}"))),
        }
    }

    /// Parse `POINT(lat, lon)` / `BOX(latmin, latmax, lonmin, lonmax)` /
    /// `INVALID`, with coordinates in (possibly fractional) degrees.
    pub fn parse(s: &str) -> Result<Bbox> {
        let (style, rest) = outer_parse("bbox", s)?;
        let coords: Vec<i32> = if rest.trim().is_empty() {
            Vec::new()
        } else {
            rest.split(',')
                .map(parse_degrees)
                .collect::<Result<Vec<_>>>()?
        };
        match (style, coords.as_slice()) {
            ("INVALID", []) => Ok(Bbox::Invalid),
            ("POINT", [lat, lon]) => Ok(Bbox::Point {
                lat: *lat,
                lon: *lon,
            }),
            ("BOX", [latmin, latmax, lonmin, lonmax]) => Ok(Bbox::Box {
                latmin: *latmin,
                latmax: *latmax,
                lonmin: *lonmin,
                lonmax: *lonmax,
            }),
            _ => Err(ArkiError::parse(
                "bbox",
                format!("cannot parse bbox `{}`", s.trim()),
            )),
        }
    }

    pub fn to_structured(&self) -> serde_json::Value {
        match self {
            Bbox::Invalid => json!({"s": "INVALID"}),
            Bbox::Point { lat, lon } => json!({"s": "POINT", "lat": lat, "lon": lon}),
            Bbox::Box {
                latmin,
                latmax,
                lonmin,
                lonmax,
            } => json!({
                "s": "BOX",
                "latmin": latmin, "latmax": latmax,
                "lonmin": lonmin, "lonmax": lonmax,
            }),
        }
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Bbox> {
        let get = |key: &str| -> Result<i32> {
            v.get(key)
                .and_then(|x| x.as_i64())
                .map(|x| x as i32)
                .ok_or_else(|| ArkiError::parse("bbox", format!("missing field {key}")))
        };
        match structured_style("bbox", v)? {
            "INVALID" => Ok(Bbox::Invalid),
            "POINT" => Ok(Bbox::Point {
                lat: get("lat")?,
                lon: get("lon")?,
            }),
            "BOX" => Ok(Bbox::Box {
                latmin: get("latmin")?,
                latmax: get("latmax")?,
                lonmin: get("lonmin")?,
                lonmax: get("lonmax")?,
            }),
            other => Err(ArkiError::parse("bbox", format!("unknown bbox style `{other}`"))),
        }
    }
}

/// Parse a degree value with up to two decimals into hundredths.
fn parse_degrees(s: &str) -> Result<i32> {
    let s = s.trim();
    let negative = s.starts_with('-');
    let body = s.strip_prefix('-').unwrap_or(s);
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    let int: i64 = int_part
        .parse()
        .map_err(|_| ArkiError::parse("bbox", format!("invalid coordinate `{s}`")))?;
    let mut frac: i64 = 0;
    let mut scale = 10;
    for c in frac_part.chars().take(2) {
        let d = c
            .to_digit(10)
            .ok_or_else(|| ArkiError::parse("bbox", format!("invalid coordinate `{s}`")))?;
        frac += d as i64 * scale;
        scale /= 10;
    }
    let v = int * 100 + frac;
    Ok(if negative { -v as i32 } else { v as i32 })
}

/// Render hundredths of a degree without trailing zeros.
fn fmt_degrees(v: i32) -> String {
    if v % 100 == 0 {
        format!("{}", v / 100)
    } else if v % 10 == 0 {
        format!("{}.{}", v / 100, (v.abs() % 100) / 10)
    } else {
        format!("{}.{:02}", v / 100, v.abs() % 100)
    }
}

impl fmt::Display for Bbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bbox::Invalid => write!(f, "INVALID"),
            Bbox::Point { lat, lon } => {
                write!(f, "POINT({}, {})", fmt_degrees(*lat), fmt_degrees(*lon))
            }
            Bbox::Box {
                latmin,
                latmax,
                lonmin,
                lonmax,
            } => write!(
                f,
                "BOX({}, {}, {}, {})",
                fmt_degrees(*latmin),
                fmt_degrees(*latmax),
                fmt_degrees(*lonmin),
                fmt_degrees(*lonmax)
            ),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_degrees() {
        assert_eq!(parse_degrees("44").unwrap(), 4400);
        assert_eq!(parse_degrees("42.5").unwrap(), 4250);
        assert_eq!(parse_degrees("10.25").unwrap(), 1025);
        assert_eq!(parse_degrees("-1.5").unwrap(), -150);
        assert!(parse_degrees("x").is_err());
    }

    #[test]
    fn test_roundtrips() {
        for b in [
            Bbox::Invalid,
            Bbox::Point { lat: 4400, lon: 1100 },
            Bbox::Box {
                latmin: 4200,
                latmax: 4250,
                lonmin: 1000,
                lonmax: 1100,
            },
        ] {
            let mut buf = Vec::new();
            b.encode(&mut Encoder::new(&mut buf));
            assert_eq!(Bbox::decode(&mut Decoder::new("test", &buf)).unwrap(), b);
            assert_eq!(Bbox::parse(&b.to_string()).unwrap(), b);
            assert_eq!(Bbox::from_structured(&b.to_structured()).unwrap(), b);
        }
    }

    #[test]
    fn test_display_fractions() {
        assert_eq!(
            Bbox::Box {
                latmin: 4200,
                latmax: 4250,
                lonmin: 1000,
                lonmax: 1100
            }
            .to_string(),
            "BOX(42, 42.5, 10, 11)"
        );
    }

    #[test]
    fn test_covers_point() {
        let wide = Bbox::parse("BOX(43, 45, 10, 12)").unwrap();
        let narrow = Bbox::parse("BOX(42, 42.5, 10, 11)").unwrap();
        let point = Bbox::parse("POINT(44, 11)").unwrap();
        assert!(wide.covers(&point));
        assert!(!narrow.covers(&point));
    }

    #[test]
    fn test_covers_box() {
        let outer = Bbox::parse("BOX(40, 50, 5, 15)").unwrap();
        let inner = Bbox::parse("BOX(43, 45, 10, 12)").unwrap();
        assert!(outer.covers(&inner));
        assert!(!inner.covers(&outer));
    }

    #[test]
    fn test_intersects() {
        let a = Bbox::parse("BOX(40, 45, 5, 10)").unwrap();
        let b = Bbox::parse("BOX(44, 50, 9, 15)").unwrap();
        let c = Bbox::parse("BOX(46, 50, 11, 15)").unwrap();
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert!(!Bbox::Invalid.intersects(&a));
    }
}
