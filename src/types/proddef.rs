//! Product definition: ensemble and post-processing parameters.

use std::fmt;

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::{outer_parse, structured_style};
use crate::values::ValueBag;

const STYLE_GRIB: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Proddef {
    Grib(ValueBag),
}

impl Proddef {
    pub fn grib(values: ValueBag) -> Self {
        Proddef::Grib(values)
    }

    pub fn values(&self) -> &ValueBag {
        let Proddef::Grib(values) = self;
        values
    }

    pub fn encode(&self, enc: &mut Encoder) {
        let Proddef::Grib(values) = self;
        enc.add_u8(STYLE_GRIB);
        values.encode(enc);
    }

    pub fn decode(dec: &mut Decoder) -> Result<Proddef> {
        match dec.pop_u8("proddef style")? {
            STYLE_GRIB => Ok(Proddef::Grib(ValueBag::decode(dec)?)),
            other => Err(ArkiError::parse(
                "proddef",
                format!("unknown proddef style {other}"),
            )),
        }
    }

    pub fn parse(s: &str) -> Result<Proddef> {
        let (style, rest) = outer_parse("proddef", s)?;
        match style {
            "GRIB" => Ok(Proddef::Grib(ValueBag::parse(rest)?)),
            other => Err(ArkiError::parse(
                "proddef",
                format!("unknown proddef style `{other}`"),
            )),
        }
    }

    pub fn to_structured(&self) -> serde_json::Value {
        let Proddef::Grib(values) = self;
        json!({"s": "GRIB", "va": values.to_structured()})
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Proddef> {
        match structured_style("proddef", v)? {
            "GRIB" => Ok(Proddef::Grib(ValueBag::from_structured(
                v.get("va").unwrap_or(&serde_json::Value::Null),
            )?)),
            other => Err(ArkiError::parse(
                "proddef",
                format!("unknown proddef style `{other}`"),
            )),
        }
    }
}

impl fmt::Display for Proddef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Proddef::Grib(values) = self;
        write!(f, "GRIB({values})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::Value;

    #[test]
    fn test_roundtrip() {
        let mut values = ValueBag::new();
        values.set("ld", Value::Int(1));
        values.set("mt", Value::Int(9));
        values.set("nn", Value::Int(0));
        let p = Proddef::grib(values);

        let mut buf = Vec::new();
        p.encode(&mut Encoder::new(&mut buf));
        assert_eq!(Proddef::decode(&mut Decoder::new("test", &buf)).unwrap(), p);
        assert_eq!(Proddef::parse(&p.to_string()).unwrap(), p);
        assert_eq!(Proddef::from_structured(&p.to_structured()).unwrap(), p);
        assert_eq!(p.to_string(), "GRIB(ld=1, mt=9, nn=0)");
    }
}
