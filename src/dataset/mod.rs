//! Datasets: named archives with a uniform acquisition policy.
//!
//! A dataset is configured by one section of the pool configuration; its
//! `type` selects the implementation. Writers acquire scanned metadata into
//! segments (batched, transactional), readers answer data and summary
//! queries, checkers drive maintenance.

use std::path::PathBuf;

use crate::config::Section;
use crate::error::{ArkiError, Result};
use crate::index::DataQuery;
use crate::matcher::Matcher;
use crate::metadata::Metadata;
use crate::summary::Summary;
use crate::types::Code;

pub mod archive;
pub mod discard;
pub mod file;
pub mod iseg;
pub mod maintenance;
pub mod memory;
pub mod merged;
pub mod outbound;
pub mod pool;
pub mod remote;
pub mod simple;
pub mod step;

pub use pool::Pool;
pub use step::Step;

// ── Configuration ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Iseg,
    Simple,
    Ondisk2,
    Error,
    Outbound,
    Discard,
    File,
    Remote,
}

impl DatasetKind {
    pub fn parse(s: &str) -> Result<DatasetKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iseg" => Ok(DatasetKind::Iseg),
            "simple" | "local" | "test" => Ok(DatasetKind::Simple),
            "ondisk2" | "ondisk" => Ok(DatasetKind::Ondisk2),
            "error" => Ok(DatasetKind::Error),
            "outbound" => Ok(DatasetKind::Outbound),
            "discard" | "duplicates" => Ok(DatasetKind::Discard),
            "file" => Ok(DatasetKind::File),
            "remote" | "http" => Ok(DatasetKind::Remote),
            other => Err(ArkiError::parse(
                "dataset config",
                format!("unknown dataset type `{other}`"),
            )),
        }
    }
}

/// Parsed configuration of one dataset section.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub name: String,
    pub kind: DatasetKind,
    pub path: PathBuf,
    pub step: Step,
    pub filter: Matcher,
    pub replace: bool,
    pub indexed: Vec<Code>,
    pub archive_age_days: Option<u32>,
    pub delete_age_days: Option<u32>,
}

impl DatasetConfig {
    pub fn from_section(section: &Section) -> Result<DatasetConfig> {
        let kind = DatasetKind::parse(section.get("type").unwrap_or("iseg"))?;
        let path = PathBuf::from(section.get("path").unwrap_or(&section.name));
        let step = match section.get("step") {
            Some(s) => Step::parse(s)?,
            None => Step::Daily,
        };
        let filter = match section.get("filter") {
            Some(f) => Matcher::parse(f)?,
            None => Matcher::empty(),
        };
        let indexed = match section.get("index") {
            Some(spec) => {
                let mut codes = Vec::new();
                for name in spec.split(',') {
                    codes.push(Code::from_name(name)?);
                }
                codes
            }
            None => crate::index::DEFAULT_INDEXED.to_vec(),
        };
        Ok(DatasetConfig {
            name: section.name.clone(),
            kind,
            path,
            step,
            filter,
            replace: section.get_bool("replace"),
            indexed,
            archive_age_days: section.get_u32("archive age")?,
            delete_age_days: section.get_u32("delete age")?,
        })
    }

    /// True if this dataset is the fallback for messages failing dispatch.
    pub fn is_error(&self) -> bool {
        self.kind == DatasetKind::Error
    }

    /// Render back to a configuration section (served by `GET /config`).
    pub fn to_section(&self) -> Section {
        let mut section = Section::new(self.name.clone());
        let kind = match self.kind {
            DatasetKind::Iseg => "iseg",
            DatasetKind::Simple => "simple",
            DatasetKind::Ondisk2 => "ondisk2",
            DatasetKind::Error => "error",
            DatasetKind::Outbound => "outbound",
            DatasetKind::Discard => "discard",
            DatasetKind::File => "file",
            DatasetKind::Remote => "remote",
        };
        section.set("type", kind);
        section.set("path", self.path.to_string_lossy().into_owned());
        section.set("step", self.step.name());
        if !self.filter.is_empty() {
            section.set("filter", self.filter.to_string());
        }
        if self.replace {
            section.set("replace", "yes");
        }
        if let Some(age) = self.archive_age_days {
            section.set("archive age", age.to_string());
        }
        if let Some(age) = self.delete_age_days {
            section.set("delete age", age.to_string());
        }
        section
    }
}

// ── Traits ─────────────────────────────────────────────────────────

/// Outcome of acquiring one metadata into a writable dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Stored; the metadata now points into the dataset.
    Acquired,
    /// Rejected by the uniqueness predicate (and replace is off).
    Duplicate,
}

pub trait Writer: Send {
    fn name(&self) -> &str;

    /// Stage one datum into the dataset. On success the metadata's source
    /// points at its new location and ASSIGNEDDATASET records the move.
    /// Nothing is durable until `flush`.
    fn acquire(&mut self, md: &mut Metadata) -> Result<AcquireOutcome>;

    /// Commit everything staged since the last flush.
    fn flush(&mut self) -> Result<()>;

    /// Roll back everything staged since the last flush.
    fn discard(&mut self) -> Result<()>;
}

pub trait Reader: Send + Sync {
    fn name(&self) -> &str;

    fn query_data(
        &self,
        query: &DataQuery,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()>;

    fn query_summary(&self, matcher: &Matcher, summary: &mut Summary) -> Result<()>;
}

// ── Factories ──────────────────────────────────────────────────────

pub fn open_writer(cfg: &DatasetConfig) -> Result<Box<dyn Writer>> {
    match cfg.kind {
        DatasetKind::Iseg | DatasetKind::Ondisk2 => Ok(Box::new(iseg::IsegWriter::open(cfg)?)),
        DatasetKind::Simple | DatasetKind::Error => {
            Ok(Box::new(simple::SimpleWriter::open(cfg)?))
        }
        DatasetKind::Outbound => Ok(Box::new(outbound::OutboundWriter::open(cfg)?)),
        DatasetKind::Discard => Ok(Box::new(discard::DiscardWriter::new(cfg))),
        DatasetKind::File | DatasetKind::Remote => Err(ArkiError::Consistency(format!(
            "dataset {} is read-only",
            cfg.name
        ))),
    }
}

pub fn open_reader(cfg: &DatasetConfig) -> Result<Box<dyn Reader>> {
    match cfg.kind {
        DatasetKind::Iseg => Ok(Box::new(iseg::IsegReader::open(cfg)?)),
        DatasetKind::Ondisk2 => Ok(Box::new(archive::ArchivingReader::open(cfg)?)),
        DatasetKind::Simple | DatasetKind::Error => {
            Ok(Box::new(simple::SimpleReader::open(cfg)?))
        }
        DatasetKind::File => Ok(Box::new(file::FileReader::open(cfg)?)),
        DatasetKind::Remote => Ok(Box::new(remote::RemoteReader::open(cfg)?)),
        DatasetKind::Outbound | DatasetKind::Discard => Err(ArkiError::Consistency(format!(
            "dataset {} cannot be queried",
            cfg.name
        ))),
    }
}

// ── Shared helpers ─────────────────────────────────────────────────

/// Identity key of a metadata for cross-dataset deduplication: the encoded
/// items excluding provenance.
pub fn identity_key(md: &Metadata) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut enc = crate::core::codec::Encoder::new(&mut buf);
    for (code, item) in md.items() {
        if matches!(code, Code::Source | Code::Assigneddataset) {
            continue;
        }
        item.encode_with_envelope(&mut enc);
    }
    buf
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;

    #[test]
    fn test_config_from_section() {
        let cfg = ConfigFile::parse(
            "[test200]\ntype = iseg\nstep = daily\nfilter = origin:GRIB1,200\npath = /tmp/ds\narchive age = 7\n",
        )
        .unwrap();
        let ds = DatasetConfig::from_section(cfg.section("test200").unwrap()).unwrap();
        assert_eq!(ds.name, "test200");
        assert_eq!(ds.kind, DatasetKind::Iseg);
        assert_eq!(ds.step, Step::Daily);
        assert_eq!(ds.path, PathBuf::from("/tmp/ds"));
        assert_eq!(ds.archive_age_days, Some(7));
        assert_eq!(ds.delete_age_days, None);
        assert!(!ds.replace);
        assert!(!ds.is_error());
    }

    #[test]
    fn test_error_dataset_defaults() {
        let cfg = ConfigFile::parse("[error]\ntype = error\npath = /tmp/err\n").unwrap();
        let ds = DatasetConfig::from_section(cfg.section("error").unwrap()).unwrap();
        assert!(ds.is_error());
        assert!(ds.filter.is_empty());
    }

    #[test]
    fn test_to_section_roundtrip() {
        let cfg = ConfigFile::parse(
            "[x]\ntype = iseg\nstep = monthly\nfilter = origin:GRIB1,200\npath = /ds/x\nreplace = yes\n",
        )
        .unwrap();
        let ds = DatasetConfig::from_section(cfg.section("x").unwrap()).unwrap();
        let section = ds.to_section();
        let again = DatasetConfig::from_section(&section).unwrap();
        assert_eq!(again.step, Step::Monthly);
        assert!(again.replace);
        assert_eq!(again.filter.to_string(), ds.filter.to_string());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let cfg = ConfigFile::parse("[x]\ntype = cloud\n").unwrap();
        assert!(DatasetConfig::from_section(cfg.section("x").unwrap()).is_err());
    }
}
