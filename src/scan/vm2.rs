//! VM2 scanner: one observation per text line.
//!
//! Line format: `YYYYMMDDHHMM[SS],station,variable,value1,value2,value3,flags`.
//! The reference time, station area and variable product become typed
//! items; everything after the variable is preserved verbatim in the VALUE
//! item so the original line can be reconstructed.

use std::path::Path;

use tracing::warn;

use crate::error::{ArkiError, Result};
use crate::metadata::{Collection, Metadata};
use crate::types::{Area, Product, Reftime, Source, Time, ValueItem};

use super::Scanner;

pub struct Vm2Scanner;

impl Scanner for Vm2Scanner {
    fn scan(&self, path: &Path) -> Result<Collection> {
        let raw = std::fs::read_to_string(path).map_err(|e| ArkiError::io(path, e))?;
        let basedir = path.parent().unwrap_or(Path::new("")).to_string_lossy().into_owned();
        let relpath = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut coll = Collection::new();
        let mut offset = 0u64;
        for (lineno, line) in raw.lines().enumerate() {
            // Byte length of the line plus its newline.
            let consumed = line.len() as u64 + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                offset += consumed;
                continue;
            }
            match scan_line(trimmed) {
                Ok(mut md) => {
                    md.set_source(Source::blob(
                        "vm2",
                        basedir.clone(),
                        relpath.clone(),
                        offset,
                        line.len() as u64,
                    ));
                    coll.push(md);
                }
                Err(e) => {
                    // Malformed lines are skipped, not fatal: the caller
                    // resynchronizes on the next line.
                    warn!("{}:{}: {e}", path.display(), lineno + 1);
                }
            }
            offset += consumed;
        }
        Ok(coll)
    }
}

/// Parse one VM2 line into (reftime, area, product, value).
pub fn scan_line(line: &str) -> Result<Metadata> {
    let mut fields = line.splitn(4, ',');
    let date = fields
        .next()
        .ok_or_else(|| ArkiError::parse("vm2", "missing date field"))?;
    let station = fields
        .next()
        .ok_or_else(|| ArkiError::parse("vm2", "missing station field"))?;
    let variable = fields
        .next()
        .ok_or_else(|| ArkiError::parse("vm2", "missing variable field"))?;
    let rest = fields.next().unwrap_or("");

    let reftime = parse_date(date)?;
    let station: u32 = station
        .trim()
        .parse()
        .map_err(|_| ArkiError::parse("vm2", format!("invalid station id `{station}`")))?;
    let variable: u32 = variable
        .trim()
        .parse()
        .map_err(|_| ArkiError::parse("vm2", format!("invalid variable id `{variable}`")))?;

    let mut md = Metadata::new();
    md.set(Reftime::position(reftime));
    md.set(Area::vm2(station));
    md.set(Product::Vm2 {
        variable_id: variable,
    });
    md.set(ValueItem::new(rest));
    Ok(md)
}

/// `YYYYMMDDHHMM` with optional trailing seconds.
fn parse_date(s: &str) -> Result<Time> {
    let s = s.trim();
    if s.len() != 12 && s.len() != 14 {
        return Err(ArkiError::parse(
            "vm2",
            format!("date `{s}` is not YYYYMMDDHHMM[SS]"),
        ));
    }
    let digit = |range: std::ops::Range<usize>| -> Result<u32> {
        s[range.clone()]
            .parse()
            .map_err(|_| ArkiError::parse("vm2", format!("invalid date `{s}`")))
    };
    let se = if s.len() == 14 { digit(12..14)? } else { 0 };
    Ok(Time::new(
        digit(0..4)? as i32,
        digit(4..6)?,
        digit(6..8)?,
        digit(8..10)?,
        digit(10..12)?,
        se,
    ))
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Code;

    #[test]
    fn test_scan_line() {
        let md = scan_line("200707081300,22,227,1.2,,,000000000").unwrap();
        assert_eq!(
            md.reftime_interval().unwrap().0,
            Time::new(2007, 7, 8, 13, 0, 0)
        );
        match md.get(Code::Area) {
            Some(crate::types::Item::Area(Area::Vm2 { station_id })) => {
                assert_eq!(*station_id, 22)
            }
            other => panic!("unexpected area: {other:?}"),
        }
        match md.get(Code::Value) {
            Some(crate::types::Item::Value(v)) => assert_eq!(v.content, "1.2,,,000000000"),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_scan_file_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.vm2");
        std::fs::write(
            &path,
            "200707081300,22,227,1.2,,,000000000\n200707081330,22,228,3,,,000000000\n",
        )
        .unwrap();

        let coll = super::super::scan_file(&path, "vm2").unwrap();
        assert_eq!(coll.len(), 2);
        // The blob range of each record reproduces its line.
        assert_eq!(
            coll.get(0).unwrap().get_data().unwrap(),
            b"200707081300,22,227,1.2,,,000000000"
        );
        assert_eq!(
            coll.get(1).unwrap().get_data().unwrap(),
            b"200707081330,22,228,3,,,000000000"
        );
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirty.vm2");
        std::fs::write(
            &path,
            "not-a-line\n200707081300,22,227,1.2,,,000000000\n",
        )
        .unwrap();
        let coll = super::super::scan_file(&path, "vm2").unwrap();
        assert_eq!(coll.len(), 1);
    }

    #[test]
    fn test_bad_dates() {
        assert!(parse_date("2007").is_err());
        assert!(parse_date("20070x081300").is_err());
        assert_eq!(
            parse_date("20070708130005").unwrap(),
            Time::new(2007, 7, 8, 13, 0, 5)
        );
    }
}
