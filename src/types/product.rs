//! Product: what physical variable the datum contains.

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
const STYLE_VM2: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Product {
    Grib1 {
        origin: Option<u32>,
        table: Option<u32>,
        product: Option<u32>,
    },
    Grib2 {
        centre: Option<u32>,
        discipline: Option<u32>,
        category: Option<u32>,
        number: Option<u32>,
    },
    Bufr {
        ty: Option<u32>,
        subtype: Option<u32>,
        localsubtype: Option<u32>,
    },
    Odimh5 {
        object: String,
        product: String,
    },
    Vm2 {
        variable_id: u32,
    },
}

impl Product {
    pub fn grib1(origin: Option<u32>, table: Option<u32>, product: Option<u32>) -> Self {
        Product::Grib1 {
            origin,
            table,
            product,
        }
    }

    pub fn bufr(ty: Option<u32>, subtype: Option<u32>, localsubtype: Option<u32>) -> Self {
        Product::Bufr {
            ty,
            subtype,
            localsubtype,
        }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Product::Grib1 {
                origin,
                table,
                product,
            } => {
                enc.add_u8(STYLE_GRIB1);
                enc.add_opt_u32(*origin);
                enc.add_opt_u32(*table);
                enc.add_opt_u32(*product);
            }
            Product::Grib2 {
                centre,
                discipline,
                category,
                number,
            } => {
                enc.add_u8(STYLE_GRIB2);
                enc.add_opt_u32(*centre);
                enc.add_opt_u32(*discipline);
                enc.add_opt_u32(*category);
                enc.add_opt_u32(*number);
            }
            Product::Bufr {
                ty,
                subtype,
                localsubtype,
            } => {
                enc.add_u8(STYLE_BUFR);
                enc.add_opt_u32(*ty);
                enc.add_opt_u32(*subtype);
                enc.add_opt_u32(*localsubtype);
            }
            Product::Odimh5 { object, product } => {
                enc.add_u8(STYLE_ODIMH5);
                enc.add_str8(object);
                enc.add_str8(product);
            }
            Product::Vm2 { variable_id } => {
                enc.add_u8(STYLE_VM2);
                enc.add_u32(*variable_id);
            }
        }
    }

    pub fn decode(dec: &mut Decoder) -> Result<Product> {
        match dec.pop_u8("product style")? {
            STYLE_GRIB1 => Ok(Product::Grib1 {
                origin: dec.pop_opt_u32("origin")?,
                table: dec.pop_opt_u32("table")?,
                product: dec.pop_opt_u32("product")?,
            }),
            STYLE_GRIB2 => Ok(Product::Grib2 {
                centre: dec.pop_opt_u32("centre")?,
                discipline: dec.pop_opt_u32("discipline")?,
                category: dec.pop_opt_u32("category")?,
                number: dec.pop_opt_u32("number")?,
            }),
            STYLE_BUFR => Ok(Product::Bufr {
                ty: dec.pop_opt_u32("type")?,
                subtype: dec.pop_opt_u32("subtype")?,
                localsubtype: dec.pop_opt_u32("localsubtype")?,
            }),
            STYLE_ODIMH5 => Ok(Product::Odimh5 {
                object: dec.pop_str8("object")?,
                product: dec.pop_str8("product")?,
            }),
            STYLE_VM2 => Ok(Product::Vm2 {
                variable_id: dec.pop_u32("variable id")?,
            }),
            other => Err(ArkiError::parse(
                "product",
                format!("unknown product style {other}"),
            )),
        }
    }

    pub fn parse(s: &str) -> Result<Product> {
        let (style, rest) = outer_parse("product", s)?;
        let args = ArgList::new("product", rest);
        match style {
            "GRIB1" => Ok(Product::Grib1 {
                origin: args.opt_u32(0)?,
                table: args.opt_u32(1)?,
                product: args.opt_u32(2)?,
            }),
            "GRIB2" => Ok(Product::Grib2 {
                centre: args.opt_u32(0)?,
                discipline: args.opt_u32(1)?,
                category: args.opt_u32(2)?,
                number: args.opt_u32(3)?,
            }),
            "BUFR" => Ok(Product::Bufr {
                ty: args.opt_u32(0)?,
                subtype: args.opt_u32(1)?,
                localsubtype: args.opt_u32(2)?,
            }),
            "ODIMH5" => Ok(Product::Odimh5 {
                object: args.string(0)?.to_string(),
                product: args.string(1)?.to_string(),
            }),
            "VM2" => Ok(Product::Vm2 {
                variable_id: args.u32(0)?,
            }),
            other => Err(ArkiError::parse(
                "product",
                format!("unknown product style `{other}`"),
            )),
        }
    }

    pub fn to_structured(&self) -> serde_json::Value {
        match self {
            Product::Grib1 {
                origin,
                table,
                product,
            } => json!({"s": "GRIB1", "or": origin, "ta": table, "pr": product}),
            Product::Grib2 {
                centre,
                discipline,
                category,
                number,
            } => json!({"s": "GRIB2", "ce": centre, "di": discipline, "ca": category, "no": number}),
            Product::Bufr {
                ty,
                subtype,
                localsubtype,
            } => json!({"s": "BUFR", "ty": ty, "st": subtype, "ls": localsubtype}),
            Product::Odimh5 { object, product } => {
                json!({"s": "ODIMH5", "ob": object, "pr": product})
            }
            Product::Vm2 { variable_id } => json!({"s": "VM2", "id": variable_id}),
        }
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Product> {
        match structured_style("product", v)? {
            "GRIB1" => Ok(Product::Grib1 {
                origin: structured_opt_u32("product", v, "or")?,
                table: structured_opt_u32("product", v, "ta")?,
                product: structured_opt_u32("product", v, "pr")?,
            }),
            "GRIB2" => Ok(Product::Grib2 {
                centre: structured_opt_u32("product", v, "ce")?,
                discipline: structured_opt_u32("product", v, "di")?,
                category: structured_opt_u32("product", v, "ca")?,
                number: structured_opt_u32("product", v, "no")?,
            }),
            "BUFR" => Ok(Product::Bufr {
                ty: structured_opt_u32("product", v, "ty")?,
                subtype: structured_opt_u32("product", v, "st")?,
                localsubtype: structured_opt_u32("product", v, "ls")?,
            }),
            "ODIMH5" => Ok(Product::Odimh5 {
                object: structured_str("product", v, "ob")?.to_string(),
                product: structured_str("product", v, "pr")?.to_string(),
            }),
            "VM2" => Ok(Product::Vm2 {
                variable_id: structured_opt_u32("product", v, "id")?
                    .ok_or_else(|| ArkiError::parse("product", "missing VM2 variable id"))?,
            }),
            other => Err(ArkiError::parse(
                "product",
                format!("unknown product style `{other}`"),
            )),
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Product::Grib1 {
                origin,
                table,
                product,
            } => write!(f, "GRIB1({})", join_opt_fields(&[*origin, *table, *product])),
            Product::Grib2 {
                centre,
                discipline,
                category,
                number,
            } => write!(
                f,
                "GRIB2({})",
                join_opt_fields(&[*centre, *discipline, *category, *number])
            ),
            Product::Bufr {
                ty,
                subtype,
                localsubtype,
            } => write!(f, "BUFR({})", join_opt_fields(&[*ty, *subtype, *localsubtype])),
            Product::Odimh5 { object, product } => write!(f, "ODIMH5({object}, {product})"),
            Product::Vm2 { variable_id } => write!(f, "VM2({variable_id})"),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(p: &Product) {
        let mut buf = Vec::new();
        p.encode(&mut Encoder::new(&mut buf));
        assert_eq!(&Product::decode(&mut Decoder::new("test", &buf)).unwrap(), p);
        assert_eq!(&Product::parse(&p.to_string()).unwrap(), p);
        assert_eq!(&Product::from_structured(&p.to_structured()).unwrap(), p);
    }

    #[test]
    fn test_roundtrips() {
        roundtrip(&Product::grib1(Some(200), Some(140), Some(229)));
        roundtrip(&Product::grib1(Some(200), None, Some(229)));
        roundtrip(&Product::Grib2 {
            centre: Some(98),
            discipline: Some(0),
            category: Some(2),
            number: Some(22),
        });
        roundtrip(&Product::bufr(Some(0), Some(255), Some(1)));
        roundtrip(&Product::Odimh5 {
            object: "PVOL".into(),
            product: "SCAN".into(),
        });
        roundtrip(&Product::Vm2 { variable_id: 227 });
    }

    #[test]
    fn test_partial_string_form() {
        assert_eq!(
            Product::parse("GRIB1(, 2, 3)").unwrap(),
            Product::grib1(None, Some(2), Some(3))
        );
        assert_eq!(
            Product::grib1(None, Some(2), Some(3)).to_string(),
            "GRIB1(-, 2, 3)"
        );
    }
}
