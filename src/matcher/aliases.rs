//! Matcher alias database.
//!
//! A configuration file maps short names to matcher fragments, one section
//! per item type:
//!
//! ```text
//! [origin]
//! arpa = GRIB1,200
//! main = arpa or GRIB1,80
//! ```
//!
//! Aliases expand recursively during matcher parsing, with a bounded depth
//! so definition cycles are reported instead of looping.

use std::collections::HashMap;

use crate::config::ConfigFile;
use crate::error::{ArkiError, Result};
use crate::types::Code;

/// Maximum alias expansion depth before a cycle is assumed.
pub const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct AliasDatabase {
    /// (code, lowercase alias name) → expansion text.
    entries: HashMap<(Code, String), String>,
}

impl AliasDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &ConfigFile) -> Result<AliasDatabase> {
        let mut db = AliasDatabase::new();
        for section in cfg.sections() {
            let code = Code::from_name(&section.name).map_err(|_| {
                ArkiError::parse(
                    "aliases",
                    format!("section `{}` is not an item type", section.name),
                )
            })?;
            for (name, expansion) in section.iter() {
                db.entries
                    .insert((code, name.to_ascii_lowercase()), expansion.clone());
            }
        }
        Ok(db)
    }

    pub fn get(&self, code: Code, name: &str) -> Option<&str> {
        self.entries
            .get(&(code, name.to_ascii_lowercase()))
            .map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialise back to the configuration format, for `GET /config`-style
    /// interchange with remote servers.
    pub fn to_config(&self) -> ConfigFile {
        let mut by_code: HashMap<Code, Vec<(&String, &String)>> = HashMap::new();
        for ((code, name), expansion) in &self.entries {
            by_code.entry(*code).or_default().push((name, expansion));
        }
        let mut cfg = ConfigFile::new();
        let mut codes: Vec<Code> = by_code.keys().copied().collect();
        codes.sort();
        for code in codes {
            let mut section = crate::config::Section::new(code.name());
            let mut pairs = by_code.remove(&code).unwrap();
            pairs.sort();
            for (name, expansion) in pairs {
                section.set(name.clone(), expansion.clone());
            }
            cfg.push(section);
        }
        cfg
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let cfg = ConfigFile::parse("[origin]\nArpa = GRIB1,200\n").unwrap();
        let db = AliasDatabase::from_config(&cfg).unwrap();
        assert_eq!(db.get(Code::Origin, "arpa"), Some("GRIB1,200"));
        assert_eq!(db.get(Code::Origin, "ARPA"), Some("GRIB1,200"));
        assert_eq!(db.get(Code::Product, "arpa"), None);
        assert_eq!(db.get(Code::Origin, "other"), None);
    }

    #[test]
    fn test_bad_section_rejected() {
        let cfg = ConfigFile::parse("[nosuchtype]\nx = y\n").unwrap();
        assert!(AliasDatabase::from_config(&cfg).is_err());
    }

    #[test]
    fn test_to_config_roundtrip() {
        let cfg = ConfigFile::parse("[origin]\narpa = GRIB1,200\n\n[product]\nt2m = GRIB1,200,2,11\n").unwrap();
        let db = AliasDatabase::from_config(&cfg).unwrap();
        let back = AliasDatabase::from_config(&db.to_config()).unwrap();
        assert_eq!(back.get(Code::Origin, "arpa"), Some("GRIB1,200"));
        assert_eq!(back.get(Code::Product, "t2m"), Some("GRIB1,200,2,11"));
    }
}
