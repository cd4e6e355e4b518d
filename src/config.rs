//! INI-like multi-section configuration.
//!
//! Dataset pools, alias databases and per-dataset `config` files all share
//! this format: `[section]` headers, `key = value` lines, `#` or `;`
//! comments. Section and key order is preserved so a merged configuration
//! round-trips deterministically.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ArkiError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    values: BTreeMap<String, String>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }

    /// Parse a boolean-ish value (`yes`/`true`/`1`).
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(str::trim),
            Some("yes") | Some("true") | Some("1")
        )
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<u32>().map(Some).map_err(|_| {
                ArkiError::parse(
                    "config",
                    format!("value of `{key}` is not an integer: `{raw}`"),
                )
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    sections: Vec<Section>,
}

impl ConfigFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<ConfigFile> {
        let mut cfg = ConfigFile::new();
        let mut current: Option<Section> = None;
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[') {
                let name = header.strip_suffix(']').ok_or_else(|| {
                    ArkiError::parse_at("config", format!("unterminated section header `{raw}`"), lineno + 1)
                })?;
                if let Some(done) = current.take() {
                    cfg.sections.push(done);
                }
                current = Some(Section::new(name.trim()));
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                ArkiError::parse_at("config", format!("missing `=` in `{raw}`"), lineno + 1)
            })?;
            let section = current.as_mut().ok_or_else(|| {
                ArkiError::parse_at("config", format!("`{raw}` outside any section"), lineno + 1)
            })?;
            section.set(key.trim(), value.trim());
        }
        if let Some(done) = current.take() {
            cfg.sections.push(done);
        }
        Ok(cfg)
    }

    pub fn read_file(path: &Path) -> Result<ConfigFile> {
        let text = std::fs::read_to_string(path).map_err(|e| ArkiError::io(path, e))?;
        ConfigFile::parse(&text)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn push(&mut self, section: Section) {
        self.sections.push(section);
    }

    /// Merge sections from `other`; same-name sections are replaced.
    pub fn merge(&mut self, other: ConfigFile) {
        for section in other.sections {
            match self.sections.iter_mut().find(|s| s.name == section.name) {
                Some(existing) => *existing = section,
                None => self.sections.push(section),
            }
        }
    }
}

impl std::fmt::Display for ConfigFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (n, section) in self.sections.iter().enumerate() {
            if n > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in section.iter() {
                writeln!(f, "{key} = {value}")?;
            }
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────
