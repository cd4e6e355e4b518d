//! Quantity matcher: all listed quantities must be present.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{ArkiError, Result};
use crate::types::Quantity;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchQuantity {
    values: BTreeSet<String>,
}

impl MatchQuantity {
    pub fn parse(pattern: &str) -> Result<MatchQuantity> {
        let values: BTreeSet<String> = pattern
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            return Err(ArkiError::parse("quantity", "empty quantity list"));
        }
        Ok(MatchQuantity { values })
    }

    pub fn matches(&self, quantity: &Quantity) -> bool {
        self.values.iter().all(|v| quantity.values.contains(v))
    }
}

impl fmt::Display for MatchQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.values.iter().map(|s| s.as_str()).collect();
        f.write_str(&joined.join(","))
    }
}
