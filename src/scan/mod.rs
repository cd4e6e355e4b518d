//! Format scanners.
//!
//! Scanning turns a raw data file into metadata with blob sources pointing
//! back into it. Full format understanding (GRIB tables, BUFR descriptors)
//! belongs to external scanners registered at startup; built in here are
//! the self-describing formats: VM2 text lines and arkimet metadata
//! bundles, plus envelope splitters for GRIB and BUFR that recover record
//! boundaries without decoding the payloads.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use tracing::warn;

use crate::error::{ArkiError, Result};
use crate::metadata::{Collection, Metadata};

pub mod vm2;

pub trait Scanner: Send + Sync {
    /// Scan a data file into metadata with sources relative to the file's
    /// parent directory.
    fn scan(&self, path: &Path) -> Result<Collection>;
}

type Registry = HashMap<String, Box<dyn Scanner>>;

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut reg: Registry = HashMap::new();
        reg.insert("vm2".to_string(), Box::new(vm2::Vm2Scanner));
        reg.insert("arkimet".to_string(), Box::new(BundleScanner));
        reg.insert("grib".to_string(), Box::new(EnvelopeScanner::grib()));
        reg.insert("bufr".to_string(), Box::new(EnvelopeScanner::bufr()));
        Mutex::new(reg)
    })
}

/// Register (or override) the scanner for a format.
pub fn register(format: &str, scanner: Box<dyn Scanner>) {
    registry()
        .lock()
        .unwrap()
        .insert(format.to_string(), scanner);
}

/// Scan `path` as `format` through the registry.
pub fn scan_file(path: &Path, format: &str) -> Result<Collection> {
    let registry = registry().lock().unwrap();
    let scanner = registry
        .get(format)
        .ok_or_else(|| ArkiError::Format(format!("no scanner registered for format `{format}`")))?;
    scanner.scan(path)
}

// ── Bundle scanner ─────────────────────────────────────────────────

/// Scanner for `.arkimet` metadata bundles: the metadata is the content.
struct BundleScanner;

impl Scanner for BundleScanner {
    fn scan(&self, path: &Path) -> Result<Collection> {
        let mut coll = Collection::new();
        let parent = path.parent().unwrap_or(Path::new("")).to_path_buf();
        Metadata::read_file(path, &mut |mut md| {
            md.set_basedir_if_empty(&parent);
            coll.push(md);
            Ok(true)
        })?;
        Ok(coll)
    }
}

// ── Envelope scanner ───────────────────────────────────────────────

/// Splits a GRIB or BUFR file into records using the section-0 envelope
/// (magic + 3-byte total length), yielding metadata that carries only the
/// source range. A registered format scanner replaces this with one that
/// also extracts the typed attributes.
struct EnvelopeScanner {
    magic: &'static [u8; 4],
    format: &'static str,
}

impl EnvelopeScanner {
    fn grib() -> EnvelopeScanner {
        EnvelopeScanner {
            magic: b"GRIB",
            format: "grib",
        }
    }

    fn bufr() -> EnvelopeScanner {
        EnvelopeScanner {
            magic: b"BUFR",
            format: "bufr",
        }
    }
}

impl Scanner for EnvelopeScanner {
    fn scan(&self, path: &Path) -> Result<Collection> {
        let raw = std::fs::read(path).map_err(|e| ArkiError::io(path, e))?;
        let basedir = path.parent().unwrap_or(Path::new("")).to_string_lossy().into_owned();
        let relpath = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut coll = Collection::new();
        let mut pos = 0usize;
        while pos + 8 <= raw.len() {
            if &raw[pos..pos + 4] != self.magic {
                // Resynchronize: skip to the next magic, warning once per hole.
                match find_magic(&raw[pos + 1..], self.magic) {
                    Some(skip) => {
                        warn!(
                            "{}: skipping {} unscannable bytes at offset {pos}",
                            path.display(),
                            skip + 1
                        );
                        pos += skip + 1;
                        continue;
                    }
                    None => break,
                }
            }
            let total = u32::from_be_bytes([0, raw[pos + 4], raw[pos + 5], raw[pos + 6]]) as usize;
            if total < 8 || pos + total > raw.len() {
                return Err(ArkiError::Format(format!(
                    "{}: record at offset {pos} declares {total} bytes",
                    path.display()
                )));
            }
            let mut md = Metadata::new();
            md.set_source(crate::types::Source::blob(
                self.format,
                basedir.clone(),
                relpath.clone(),
                pos as u64,
                total as u64,
            ));
            coll.push(md);
            pos += total;
        }
        Ok(coll)
    }
}

fn find_magic(haystack: &[u8], magic: &[u8]) -> Option<usize> {
    haystack
        .windows(magic.len())
        .position(|window| window == magic)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Origin, Reftime, Source, Time};

    #[test]
    fn test_bundle_scanner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbound.arkimet");
        let mut buf = Vec::new();
        let mut md = Metadata::new();
        md.set(Origin::grib1(Some(200), Some(0), Some(101)));
        md.set(Reftime::position(Time::new(2007, 7, 8, 13, 0, 0)));
        md.make_inline(b"GRIB-data".to_vec());
        md.write_bundle(&mut buf).unwrap();
        std::fs::write(&path, buf).unwrap();

        let coll = scan_file(&path, "arkimet").unwrap();
        assert_eq!(coll.len(), 1);
        assert_eq!(coll.get(0).unwrap().get_data().unwrap(), b"GRIB-data");
    }

    #[test]
    fn test_envelope_scanner_splits_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.grib");
        let mut raw = Vec::new();
        for filler in [10u8, 20] {
            let total = 32u32;
            raw.extend_from_slice(b"GRIB");
            raw.extend_from_slice(&total.to_be_bytes()[1..]);
            raw.push(1); // edition
            raw.extend(std::iter::repeat(filler).take(24));
        }
        std::fs::write(&path, &raw).unwrap();

        let coll = scan_file(&path, "grib").unwrap();
        assert_eq!(coll.len(), 2);
        match coll.get(1).unwrap().source() {
            Some(Source::Blob { offset, size, .. }) => {
                assert_eq!(*offset, 32);
                assert_eq!(*size, 32);
            }
            other => panic!("unexpected source: {other:?}"),
        }
        assert_eq!(&coll.get(0).unwrap().get_data().unwrap()[8..], &[10u8; 24]);
    }

    #[test]
    fn test_envelope_scanner_resyncs_after_junk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirty.grib");
        let mut raw = Vec::new();
        raw.extend_from_slice(b"junk-bytes");
        let total = 16u32;
        raw.extend_from_slice(b"GRIB");
        raw.extend_from_slice(&total.to_be_bytes()[1..]);
        raw.push(1);
        raw.extend(std::iter::repeat(7u8).take(8));
        std::fs::write(&path, &raw).unwrap();

        let coll = scan_file(&path, "grib").unwrap();
        assert_eq!(coll.len(), 1);
        match coll.get(0).unwrap().source() {
            Some(Source::Blob { offset, .. }) => assert_eq!(*offset, 10),
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_format() {
        let err = scan_file(Path::new("x.bin"), "marbles").unwrap_err();
        assert!(matches!(err, ArkiError::Format(_)));
    }

    #[test]
    fn test_truncated_record_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.grib");
        let mut raw = Vec::new();
        raw.extend_from_slice(b"GRIB");
        raw.extend_from_slice(&100u32.to_be_bytes()[1..]);
        raw.push(1);
        std::fs::write(&path, &raw).unwrap();
        assert!(scan_file(&path, "grib").is_err());
    }
}
