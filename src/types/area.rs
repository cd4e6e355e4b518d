//! Geographical area of a datum, as an opaque bag of grid parameters.

use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::bbox::Bbox;
use crate::types::{outer_parse, structured_style};
use crate::values::{Value, ValueBag};

const STYLE_GRIB: u8 = 1;
const STYLE_ODIMH5: u8 = 2;
const STYLE_VM2: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Area {
    Grib(ValueBag),
    Odimh5(ValueBag),
    Vm2 { station_id: u32 },
}

impl Area {
    pub fn grib(values: ValueBag) -> Self {
        Area::Grib(values)
    }

    pub fn vm2(station_id: u32) -> Self {
        Area::Vm2 { station_id }
    }

    /// The grid parameter bag, if this style has one.
    pub fn values(&self) -> Option<&ValueBag> {
        match self {
            Area::Grib(v) | Area::Odimh5(v) => Some(v),
            Area::Vm2 { .. } => None,
        }
    }

    /// Derive a bounding box from conventional keys in the parameter bag:
    /// `latmin`/`latmax`/`lonmin`/`lonmax` for a box, `lat`/`lon` for a
    /// point, all in hundredths of a degree.
    pub fn bbox(&self) -> Option<Bbox> {
        let values = self.values()?;
        let get = |key: &str| match values.get(key) {
            Some(Value::Int(v)) => Some(*v as i32),
            _ => None,
        };
        if let (Some(latmin), Some(latmax), Some(lonmin), Some(lonmax)) =
            (get("latmin"), get("latmax"), get("lonmin"), get("lonmax"))
        {
            return Some(Bbox::Box {
                latmin,
                latmax,
                lonmin,
                lonmax,
            });
        }
        if let (Some(lat), Some(lon)) = (get("lat"), get("lon")) {
            return Some(Bbox::Point { lat, lon });
        }
        None
    }

    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Area::Grib(values) => {
                enc.add_u8(STYLE_GRIB);
                values.encode(enc);
            }
            Area::Odimh5(values) => {
                enc.add_u8(STYLE_ODIMH5);
                values.encode(enc);
            }
            Area::Vm2 { station_id } => {
                enc.add_u8(STYLE_VM2);
                enc.add_u32(*station_id);
            }
        }
    }

    pub fn decode(dec: &mut Decoder) -> Result<Area> {
        match dec.pop_u8("area style")? {
            STYLE_GRIB => Ok(Area::Grib(ValueBag::decode(dec)?)),
            STYLE_ODIMH5 => Ok(Area::Odimh5(ValueBag::decode(dec)?)),
            STYLE_VM2 => Ok(Area::Vm2 {
                station_id: dec.pop_u32("station id")?,
            }),
            other => Err(ArkiError::parse("area", format!("unknown area style {other}"))),
        }
    }

    pub fn parse(s: &str) -> Result<Area> {
        let (style, rest) = outer_parse("area", s)?;
        match style {
            "GRIB" => Ok(Area::Grib(ValueBag::parse(rest)?)),
            "ODIMH5" => Ok(Area::Odimh5(ValueBag::parse(rest)?)),
            "VM2" => {
                let id = rest.trim().parse::<u32>().map_err(|_| {
                    ArkiError::parse("area", format!("invalid VM2 station id `{rest}`"))
                })?;
                Ok(Area::Vm2 { station_id: id })
            }
            other => Err(ArkiError::parse("area", format!("unknown area style `{other}`"))),
        }
    }

    pub fn to_structured(&self) -> serde_json::Value {
        match self {
            Area::Grib(values) => json!({"s": "GRIB", "va": values.to_structured()}),
            Area::Odimh5(values) => json!({"s": "ODIMH5", "va": values.to_structured()}),
            Area::Vm2 { station_id } => json!({"s": "VM2", "id": station_id}),
        }
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Area> {
        match structured_style("area", v)? {
            "GRIB" => Ok(Area::Grib(ValueBag::from_structured(
                v.get("va").unwrap_or(&serde_json::Value::Null),
            )?)),
            "ODIMH5" => Ok(Area::Odimh5(ValueBag::from_structured(
                v.get("va").unwrap_or(&serde_json::Value::Null),
            )?)),
            "VM2" => {
                let id = v
                    .get("id")
                    .and_then(|x| x.as_u64())
                    .ok_or_else(|| ArkiError::parse("area", "missing VM2 station id"))?;
                Ok(Area::Vm2 {
                    station_id: id as u32,
                })
            }
            other => Err(ArkiError::parse("area", format!("unknown area style `{other}`"))),
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Area::Grib(values) => write!(f, "GRIB({values})"),
            Area::Odimh5(values) => write!(f, "ODIMH5({values})"),
            Area::Vm2 { station_id } => write!(f, "VM2({station_id})"),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(pairs: &[(&str, i64)]) -> ValueBag {
        let mut values = ValueBag::new();
        for (k, v) in pairs {
            values.set(*k, Value::Int(*v));
        }
        values
    }

    fn roundtrip(a: &Area) {
        let mut buf = Vec::new();
        a.encode(&mut Encoder::new(&mut buf));
        assert_eq!(&Area::decode(&mut Decoder::new("test", &buf)).unwrap(), a);
        assert_eq!(&Area::parse(&a.to_string()).unwrap(), a);
        assert_eq!(&Area::from_structured(&a.to_structured()).unwrap(), a);
    }

    #[test]
    fn test_roundtrips() {
        roundtrip(&Area::grib(bag(&[("type", 255), ("lat", 4550), ("lon", 1120)])));
        roundtrip(&Area::Odimh5(bag(&[("radar", 1)])));
        roundtrip(&Area::vm2(22));
    }

    #[test]
    fn test_bbox_from_box_keys() {
        let area = Area::grib(bag(&[
            ("latmin", 4300),
            ("latmax", 4500),
            ("lonmin", 1000),
            ("lonmax", 1200),
        ]));
        assert_eq!(
            area.bbox(),
            Some(Bbox::Box {
                latmin: 4300,
                latmax: 4500,
                lonmin: 1000,
                lonmax: 1200,
            })
        );
    }

    #[test]
    fn test_bbox_from_point_keys() {
        let area = Area::grib(bag(&[("lat", 4400), ("lon", 1100)]));
        assert_eq!(area.bbox(), Some(Bbox::Point { lat: 4400, lon: 1100 }));
    }

    #[test]
    fn test_bbox_absent() {
        assert_eq!(Area::vm2(1).bbox(), None);
        assert_eq!(Area::grib(bag(&[("type", 1)])).bbox(), None);
    }
}
