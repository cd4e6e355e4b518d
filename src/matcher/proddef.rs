//! Product definition matcher: value containment on the parameter bag.

use std::fmt;

use crate::error::{ArkiError, Result};
use crate::types::Proddef;
use crate::values::ValueBag;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchProddef {
    Grib(ValueBag),
}

impl MatchProddef {
    pub fn parse(pattern: &str) -> Result<MatchProddef> {
        match pattern.trim().strip_prefix("GRIB:") {
            Some(rest) => Ok(MatchProddef::Grib(ValueBag::parse(rest)?)),
            None => Err(ArkiError::parse(
                "proddef",
                format!("unsupported proddef expression `{pattern}`"),
            )),
        }
    }

    pub fn matches(&self, proddef: &Proddef) -> bool {
        let MatchProddef::Grib(want) = self;
        proddef.values().contains(want)
    }
}

impl fmt::Display for MatchProddef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let MatchProddef::Grib(want) = self;
        write!(f, "GRIB:{want}")
    }
}
