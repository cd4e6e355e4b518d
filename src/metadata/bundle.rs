//! Binary bundle framing shared by metadata and summary streams.
//!
//! A bundle is a sequence of records `{magic: 2 bytes}{version: u16 BE}
//! {length: u32 BE}{body: length bytes}`. Magics: `MD` metadata, `!D`
//! metadata with inline data following the record, `SU` summary, `MG`
//! metadata group (a body of concatenated `MD`/`!D` records).

use std::io::{ErrorKind, Read, Write};

use crate::error::{ArkiError, Result};

pub const MAGIC_METADATA: [u8; 2] = *b"MD";
pub const MAGIC_INLINE: [u8; 2] = *b"!D";
pub const MAGIC_SUMMARY: [u8; 2] = *b"SU";
pub const MAGIC_GROUP: [u8; 2] = *b"MG";

/// Envelope versions this build can decode.
pub const MIN_VERSION: u16 = 1;
pub const MAX_VERSION: u16 = 2;

/// Version written by this build.
pub const WRITE_VERSION: u16 = 2;

/// One framed record, with its body still undecoded.
#[derive(Debug, Clone)]
pub struct Record {
    pub magic: [u8; 2],
    pub version: u16,
    pub body: Vec<u8>,
}

impl Record {
    /// Read the next record. `Ok(None)` on clean end of stream; a partial
    /// header or body is a format error.
    pub fn read(reader: &mut impl Read) -> Result<Option<Record>> {
        let mut head = [0u8; 8];
        match reader.read_exact(&mut head[..1]) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        reader
            .read_exact(&mut head[1..])
            .map_err(|e| truncated("record header", e))?;

        let magic = [head[0], head[1]];
        if ![MAGIC_METADATA, MAGIC_INLINE, MAGIC_SUMMARY, MAGIC_GROUP].contains(&magic) {
            return Err(ArkiError::Format(format!(
                "unknown envelope magic {:?}",
                String::from_utf8_lossy(&magic)
            )));
        }
        let version = u16::from_be_bytes([head[2], head[3]]);
        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(ArkiError::Format(format!(
                "unsupported envelope version {version}"
            )));
        }
        let length = u32::from_be_bytes([head[4], head[5], head[6], head[7]]) as usize;
        let mut body = vec![0u8; length];
        reader
            .read_exact(&mut body)
            .map_err(|e| truncated("record body", e))?;
        Ok(Some(Record {
            magic,
            version,
            body,
        }))
    }

    /// Write a record with the current envelope version.
    pub fn write(writer: &mut impl Write, magic: [u8; 2], body: &[u8]) -> Result<()> {
        writer.write_all(&magic)?;
        writer.write_all(&WRITE_VERSION.to_be_bytes())?;
        writer.write_all(&(body.len() as u32).to_be_bytes())?;
        writer.write_all(body)?;
        Ok(())
    }
}

fn truncated(what: &str, e: std::io::Error) -> ArkiError {
    if e.kind() == ErrorKind::UnexpectedEof {
        ArkiError::Format(format!("truncated {what}"))
    } else {
        e.into()
    }
}

// ── Tests ──────────────────────────────────────────────────────────
