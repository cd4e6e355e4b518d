//! Provenance of a datum: where its bytes live.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};
use crate::types::{outer_parse, structured_str, structured_style};

const STYLE_BLOB: u8 = 1;
const STYLE_URL: u8 = 2;
const STYLE_INLINE: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    /// Byte range `[offset, offset+size)` in the file `basedir/relpath`.
    /// An empty basedir means relative to the stream location.
    Blob {
        format: String,
        basedir: String,
        relpath: String,
        offset: u64,
        size: u64,
    },
    /// Datum retrievable over HTTP.
    Url { format: String, url: String },
    /// Datum immediately follows the metadata in the stream.
    Inline { format: String, size: u64 },
}

impl Source {
    pub fn blob(
        format: impl Into<String>,
        basedir: impl Into<String>,
        relpath: impl Into<String>,
        offset: u64,
        size: u64,
    ) -> Self {
        Source::Blob {
            format: format.into(),
            basedir: basedir.into(),
            relpath: relpath.into(),
            offset,
            size,
        }
    }

    pub fn inline(format: impl Into<String>, size: u64) -> Self {
        Source::Inline {
            format: format.into(),
            size,
        }
    }

    pub fn url(format: impl Into<String>, url: impl Into<String>) -> Self {
        Source::Url {
            format: format.into(),
            url: url.into(),
        }
    }

    pub fn format(&self) -> &str {
        match self {
            Source::Blob { format, .. }
            | Source::Url { format, .. }
            | Source::Inline { format, .. } => format,
        }
    }

    /// Size of the datum, if the source knows it.
    pub fn size(&self) -> Option<u64> {
        match self {
            Source::Blob { size, .. } | Source::Inline { size, .. } => Some(*size),
            Source::Url { .. } => None,
        }
    }

    /// Absolute path of the file a blob source points into.
    pub fn blob_path(&self) -> Option<PathBuf> {
        match self {
            Source::Blob {
                basedir, relpath, ..
            } => {
                if basedir.is_empty() {
                    Some(PathBuf::from(relpath))
                } else {
                    Some(Path::new(basedir).join(relpath))
                }
            }
            _ => None,
        }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Source::Blob {
                format,
                basedir,
                relpath,
                offset,
                size,
            } => {
                enc.add_u8(STYLE_BLOB);
                enc.add_str8(format);
                enc.add_str16(basedir);
                enc.add_str16(relpath);
                enc.add_u64(*offset);
                enc.add_u64(*size);
            }
            Source::Url { format, url } => {
                enc.add_u8(STYLE_URL);
                enc.add_str8(format);
                enc.add_str16(url);
            }
            Source::Inline { format, size } => {
                enc.add_u8(STYLE_INLINE);
                enc.add_str8(format);
                enc.add_u64(*size);
            }
        }
    }

    pub fn decode(dec: &mut Decoder) -> Result<Source> {
        match dec.pop_u8("source style")? {
            STYLE_BLOB => Ok(Source::Blob {
                format: dec.pop_str8("format")?,
                basedir: dec.pop_str16("basedir")?,
                relpath: dec.pop_str16("relpath")?,
                offset: dec.pop_u64("offset")?,
                size: dec.pop_u64("size")?,
            }),
            STYLE_URL => Ok(Source::Url {
                format: dec.pop_str8("format")?,
                url: dec.pop_str16("url")?,
            }),
            STYLE_INLINE => Ok(Source::Inline {
                format: dec.pop_str8("format")?,
                size: dec.pop_u64("size")?,
            }),
            other => Err(ArkiError::parse(
                "source",
                format!("unknown source style {other}"),
            )),
        }
    }

    /// `BLOB(fmt,basedir,relpath:offset+size)`, `URL(fmt,url)`,
    /// `INLINE(fmt,size)`.
    pub fn parse(s: &str) -> Result<Source> {
        let (style, rest) = outer_parse("source", s)?;
        match style {
            "BLOB" => {
                let mut parts = rest.splitn(3, ',');
                let format = parts
                    .next()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| ArkiError::parse("source", "missing blob format"))?;
                let basedir = parts
                    .next()
                    .map(str::trim)
                    .ok_or_else(|| ArkiError::parse("source", "missing blob basedir"))?;
                let tail = parts
                    .next()
                    .map(str::trim)
                    .ok_or_else(|| ArkiError::parse("source", "missing blob location"))?;
                let (relpath, span) = tail
                    .rsplit_once(':')
                    .ok_or_else(|| ArkiError::parse("source", "missing `:offset+size`"))?;
                let (offset, size) = span
                    .split_once('+')
                    .ok_or_else(|| ArkiError::parse("source", "missing `+size`"))?;
                Ok(Source::Blob {
                    format: format.to_string(),
                    basedir: basedir.to_string(),
                    relpath: relpath.trim().to_string(),
                    offset: offset.trim().parse().map_err(|_| {
                        ArkiError::parse("source", format!("invalid offset `{offset}`"))
                    })?,
                    size: size.trim().parse().map_err(|_| {
                        ArkiError::parse("source", format!("invalid size `{size}`"))
                    })?,
                })
            }
            "URL" => {
                let (format, url) = rest
                    .split_once(',')
                    .ok_or_else(|| ArkiError::parse("source", "missing url"))?;
                Ok(Source::url(format.trim(), url.trim()))
            }
            "INLINE" => {
                let (format, size) = rest
                    .split_once(',')
                    .ok_or_else(|| ArkiError::parse("source", "missing inline size"))?;
                Ok(Source::inline(
                    format.trim(),
                    size.trim().parse().map_err(|_| {
                        ArkiError::parse("source", format!("invalid size `{size}`"))
                    })?,
                ))
            }
            other => Err(ArkiError::parse(
                "source",
                format!("unknown source style `{other}`"),
            )),
        }
    }

    pub fn to_structured(&self) -> serde_json::Value {
        match self {
            Source::Blob {
                format,
                basedir,
                relpath,
                offset,
                size,
            } => json!({
                "s": "BLOB",
                "f": format, "b": basedir, "file": relpath,
                "ofs": offset, "sz": size,
            }),
            Source::Url { format, url } => json!({"s": "URL", "f": format, "url": url}),
            Source::Inline { format, size } => json!({"s": "INLINE", "f": format, "sz": size}),
        }
    }

    pub fn from_structured(v: &serde_json::Value) -> Result<Source> {
        let w = "source";
        let get_u64 = |key: &str| -> Result<u64> {
            v.get(key)
                .and_then(|x| x.as_u64())
                .ok_or_else(|| ArkiError::parse(w, format!("missing field {key}")))
        };
        match structured_style(w, v)? {
            "BLOB" => Ok(Source::Blob {
                format: structured_str(w, v, "f")?.to_string(),
                basedir: v.get("b").and_then(|x| x.as_str()).unwrap_or("").to_string(),
                relpath: structured_str(w, v, "file")?.to_string(),
                offset: get_u64("ofs")?,
                size: get_u64("sz")?,
            }),
            "URL" => Ok(Source::url(
                structured_str(w, v, "f")?,
                structured_str(w, v, "url")?,
            )),
            "INLINE" => Ok(Source::inline(structured_str(w, v, "f")?, get_u64("sz")?)),
            other => Err(ArkiError::parse(w, format!("unknown source style `{other}`"))),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Blob {
                format,
                basedir,
                relpath,
                offset,
                size,
            } => write!(f, "BLOB({format},{basedir},{relpath}:{offset}+{size})"),
            Source::Url { format, url } => write!(f, "URL({format},{url})"),
            Source::Inline { format, size } => write!(f, "INLINE({format},{size})"),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(s: &Source) {
        let mut buf = Vec::new();
        s.encode(&mut Encoder::new(&mut buf));
        assert_eq!(&Source::decode(&mut Decoder::new("test", &buf)).unwrap(), s);
        assert_eq!(&Source::parse(&s.to_string()).unwrap(), s);
        assert_eq!(&Source::from_structured(&s.to_structured()).unwrap(), s);
    }

    #[test]
    fn test_roundtrips() {
        roundtrip(&Source::blob("grib1", "/ds/test200", "2007/07-08.grib1", 0, 7218));
        roundtrip(&Source::blob("bufr", "", "inbound/test.bufr", 194, 194));
        roundtrip(&Source::url("grib1", "http://localhost:7117/dataset/test"));
        roundtrip(&Source::inline("vm2", 37));
    }

    #[test]
    fn test_blob_path() {
        let s = Source::blob("grib1", "/ds", "2007/x.grib1", 0, 10);
        assert_eq!(s.blob_path().unwrap(), PathBuf::from("/ds/2007/x.grib1"));
        let rel = Source::blob("grib1", "", "x.grib1", 0, 10);
        assert_eq!(rel.blob_path().unwrap(), PathBuf::from("x.grib1"));
        assert_eq!(Source::inline("vm2", 1).blob_path(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Source::blob("grib1", "/ds", "2007/x.grib1", 100, 50).to_string(),
            "BLOB(grib1,/ds,2007/x.grib1:100+50)"
        );
    }
}
