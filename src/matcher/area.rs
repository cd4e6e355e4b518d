//! Area matcher.
//!
//! Two families of syntax:
//!  - value matching: `GRIB:lat=4400,lon=1100` — the area's parameter bag
//!    must contain every listed pair;
//!  - geometry matching: `bbox covers POINT(44, 11)` — the bounding box
//!    derived from the area is tested against the given geometry.

use std::fmt;

use crate::error::{ArkiError, Result};
use crate::types::{Area, Bbox};
use crate::values::ValueBag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BboxVerb {
    Equals,
    Covers,
    Intersects,
}

impl BboxVerb {
    fn parse(s: &str) -> Result<BboxVerb> {
        match s {
            "equals" => Ok(BboxVerb::Equals),
            // `contains` is the original spelling, `covers` the GEOS one.
            "covers" | "contains" => Ok(BboxVerb::Covers),
            "intersects" => Ok(BboxVerb::Intersects),
            other => Err(ArkiError::parse(
                "area",
                format!("unknown bbox verb `{other}`"),
            )),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            BboxVerb::Equals => "equals",
            BboxVerb::Covers => "covers",
            BboxVerb::Intersects => "intersects",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchArea {
    Grib(ValueBag),
    Odimh5(ValueBag),
    Vm2 { station_id: Option<u32> },
    Bbox { verb: BboxVerb, geom: Bbox },
}

impl MatchArea {
    pub fn parse(pattern: &str) -> Result<MatchArea> {
        let pattern = pattern.trim();
        if let Some(rest) = pattern.strip_prefix("bbox ") {
            let rest = rest.trim();
            let (verb, geom) = rest
                .split_once(' ')
                .ok_or_else(|| ArkiError::parse("area", "missing bbox geometry"))?;
            return Ok(MatchArea::Bbox {
                verb: BboxVerb::parse(verb.trim())?,
                geom: Bbox::parse(geom.trim())?,
            });
        }
        if let Some(rest) = pattern.strip_prefix("GRIB:") {
            return Ok(MatchArea::Grib(ValueBag::parse(rest)?));
        }
        if let Some(rest) = pattern.strip_prefix("ODIMH5:") {
            return Ok(MatchArea::Odimh5(ValueBag::parse(rest)?));
        }
        if let Some(rest) = pattern.strip_prefix("VM2") {
            let rest = rest.trim_start_matches(',').trim();
            let station_id = if rest.is_empty() {
                None
            } else {
                Some(rest.parse::<u32>().map_err(|_| {
                    ArkiError::parse("area", format!("invalid VM2 station `{rest}`"))
                })?)
            };
            return Ok(MatchArea::Vm2 { station_id });
        }
        Err(ArkiError::parse(
            "area",
            format!("unsupported area expression `{pattern}`"),
        ))
    }

    pub fn matches(&self, area: &Area) -> bool {
        match (self, area) {
            (MatchArea::Grib(want), Area::Grib(values)) => values.contains(want),
            (MatchArea::Odimh5(want), Area::Odimh5(values)) => values.contains(want),
            (MatchArea::Vm2 { station_id: want }, Area::Vm2 { station_id }) => {
                want.map_or(true, |w| w == *station_id)
            }
            (MatchArea::Bbox { verb, geom }, area) => match area.bbox() {
                Some(area_bbox) => match verb {
                    BboxVerb::Equals => area_bbox == *geom,
                    BboxVerb::Covers => area_bbox.covers(geom),
                    BboxVerb::Intersects => area_bbox.intersects(geom),
                },
                None => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for MatchArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchArea::Grib(want) => write!(f, "GRIB:{want}"),
            MatchArea::Odimh5(want) => write!(f, "ODIMH5:{want}"),
            MatchArea::Vm2 { station_id } => match station_id {
                Some(id) => write!(f, "VM2,{id}"),
                None => f.write_str("VM2"),
            },
            MatchArea::Bbox { verb, geom } => write!(f, "bbox {} {}", verb.as_str(), geom),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
