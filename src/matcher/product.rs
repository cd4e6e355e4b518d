//! Product matcher.

use std::fmt;

use crate::error::{ArkiError, Result};
use crate::matcher::{split_style, OptList};
use crate::types::Product;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchProduct {
    Grib1(OptList),
    Grib2(OptList),
    Bufr(OptList),
    Odimh5 {
        object: Option<String>,
        product: Option<String>,
    },
    Vm2 {
        variable_id: Option<u32>,
    },
}

impl MatchProduct {
    pub fn parse(pattern: &str) -> Result<MatchProduct> {
        let (style, rest) = split_style(pattern);
        match style {
            "GRIB1" => Ok(MatchProduct::Grib1(OptList::parse("product", rest)?)),
            "GRIB2" => Ok(MatchProduct::Grib2(OptList::parse("product", rest)?)),
            "BUFR" => Ok(MatchProduct::Bufr(OptList::parse("product", rest)?)),
            "ODIMH5" => {
                let mut fields = rest.splitn(2, ',').map(|s| {
                    let s = s.trim();
                    if s.is_empty() {
                        None
                    } else {
                        Some(s.to_string())
                    }
                });
                Ok(MatchProduct::Odimh5 {
                    object: fields.next().flatten(),
                    product: fields.next().flatten(),
                })
            }
            "VM2" => {
                let rest = rest.trim();
                let variable_id = if rest.is_empty() {
                    None
                } else {
                    Some(rest.parse::<u32>().map_err(|_| {
                        ArkiError::parse("product", format!("invalid VM2 id `{rest}`"))
                    })?)
                };
                Ok(MatchProduct::Vm2 { variable_id })
            }
            other => Err(ArkiError::parse(
                "product",
                format!("unsupported product style `{other}`"),
            )),
        }
    }

    pub fn matches(&self, product: &Product) -> bool {
        match (self, product) {
            (
                MatchProduct::Grib1(want),
                Product::Grib1 {
                    origin,
                    table,
                    product,
                },
            ) => want.matches(&[*origin, *table, *product]),
            (
                MatchProduct::Grib2(want),
                Product::Grib2 {
                    centre,
                    discipline,
                    category,
                    number,
                },
            ) => want.matches(&[*centre, *discipline, *category, *number]),
            (
                MatchProduct::Bufr(want),
                Product::Bufr {
                    ty,
                    subtype,
                    localsubtype,
                },
            ) => want.matches(&[*ty, *subtype, *localsubtype]),
            (
                MatchProduct::Odimh5 {
                    object: want_object,
                    product: want_product,
                },
                Product::Odimh5 { object, product },
            ) => {
                want_object.as_deref().map_or(true, |w| w == object)
                    && want_product.as_deref().map_or(true, |w| w == product)
            }
            (MatchProduct::Vm2 { variable_id: want }, Product::Vm2 { variable_id }) => {
                want.map_or(true, |w| w == *variable_id)
            }
            _ => false,
        }
    }
}

impl fmt::Display for MatchProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchProduct::Grib1(list) => list.fmt_after("GRIB1", f),
            MatchProduct::Grib2(list) => list.fmt_after("GRIB2", f),
            MatchProduct::Bufr(list) => list.fmt_after("BUFR", f),
            MatchProduct::Odimh5 { object, product } => write!(
                f,
                "ODIMH5,{},{}",
                object.as_deref().unwrap_or(""),
                product.as_deref().unwrap_or("")
            ),
            MatchProduct::Vm2 { variable_id } => match variable_id {
                Some(id) => write!(f, "VM2,{id}"),
                None => f.write_str("VM2"),
            },
        }
    }
}
