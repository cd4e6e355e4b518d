//! Server-side verbs of the HTTP wire protocol.
//!
//! `DatasetServer` maps each protocol verb onto a byte sink; the HTTP layer
//! proper (routing, multipart parsing) is a thin external adapter over
//! these calls. Responses are the same binary bundle streams the engine
//! stores on disk.

use std::io::Write;

use crate::dataset::{Pool, Reader as _};
use crate::dispatcher::Dispatcher;
use crate::error::{ArkiError, Result};
use crate::index::DataQuery;
use crate::matcher::Matcher;
use crate::metadata::Metadata;
use crate::summary::Summary;

/// How a query response is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStyle {
    /// Stream of metadata records.
    Data,
    /// One summary record.
    Summary,
    /// Raw datum bytes, concatenated.
    Bytes,
}

impl QueryStyle {
    pub fn parse(s: &str) -> Result<QueryStyle> {
        match s {
            "data" => Ok(QueryStyle::Data),
            "summary" => Ok(QueryStyle::Summary),
            "bytes" => Ok(QueryStyle::Bytes),
            other => Err(ArkiError::parse(
                "query style",
                format!("unknown style `{other}`"),
            )),
        }
    }
}

pub trait DatasetServer {
    /// `GET /config`: the pool configuration as INI text.
    fn config(&self, out: &mut dyn Write) -> Result<()>;

    /// `POST /dataset/{name}/summary`.
    fn summary(&self, dataset: &str, query: &str, out: &mut dyn Write) -> Result<()>;

    /// `POST /dataset/{name}/querydata`.
    fn query_data(
        &self,
        dataset: &str,
        matcher: &str,
        with_data: bool,
        sorter: Option<&str>,
        out: &mut dyn Write,
    ) -> Result<()>;

    /// `POST /dataset/{name}/query` with a style selector.
    fn query(
        &self,
        dataset: &str,
        matcher: &str,
        style: QueryStyle,
        out: &mut dyn Write,
    ) -> Result<()>;

    /// `POST /inbound/scan`: metadata stream for an uploaded file.
    fn inbound_scan(&self, file: &str, format: &str, out: &mut dyn Write) -> Result<()>;

    /// `POST /inbound/dispatch`: dispatch an uploaded file, streaming back
    /// the metadata with ASSIGNEDDATASET set.
    fn inbound_dispatch(&self, file: &str, format: &str, out: &mut dyn Write) -> Result<()>;
}

/// The local implementation over a dataset pool.
pub struct LocalServer {
    pool: Pool,
}

impl LocalServer {
    pub fn new(pool: Pool) -> LocalServer {
        LocalServer { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl DatasetServer for LocalServer {
    fn config(&self, out: &mut dyn Write) -> Result<()> {
        out.write_all(self.pool.config().to_string().as_bytes())?;
        Ok(())
    }

    fn summary(&self, dataset: &str, query: &str, out: &mut dyn Write) -> Result<()> {
        let matcher = Matcher::parse(query)?;
        let reader = self.pool.reader(dataset)?;
        let mut summary = Summary::new();
        reader.query_summary(&matcher, &mut summary)?;
        summary.write(&mut sink_adapter(out))
    }

    fn query_data(
        &self,
        dataset: &str,
        matcher: &str,
        with_data: bool,
        sorter: Option<&str>,
        out: &mut dyn Write,
    ) -> Result<()> {
        let query = DataQuery {
            matcher: Matcher::parse(matcher)?,
            with_data,
            sorter: sorter.map(str::to_string),
        };
        let reader = self.pool.reader(dataset)?;
        let mut out = sink_adapter(out);
        reader.query_data(&query, &mut |mut md| {
            if !with_data {
                // Blob paths are meaningless on the client side.
                md.strip_source_path();
            }
            md.write_bundle(&mut out)?;
            Ok(true)
        })
    }

    fn query(
        &self,
        dataset: &str,
        matcher: &str,
        style: QueryStyle,
        out: &mut dyn Write,
    ) -> Result<()> {
        match style {
            QueryStyle::Data => self.query_data(dataset, matcher, true, None, out),
            QueryStyle::Summary => self.summary(dataset, matcher, out),
            QueryStyle::Bytes => {
                let query = DataQuery::new(Matcher::parse(matcher)?);
                let reader = self.pool.reader(dataset)?;
                let mut out = sink_adapter(out);
                reader.query_data(&query, &mut |md| {
                    let data = md.get_data()?;
                    out.write_all(&data)?;
                    Ok(true)
                })
            }
        }
    }

    fn inbound_scan(&self, file: &str, format: &str, out: &mut dyn Write) -> Result<()> {
        let coll = crate::scan::scan_file(std::path::Path::new(file), format)?;
        let mut out = sink_adapter(out);
        for md in coll.iter() {
            md.write_bundle(&mut out)?;
        }
        Ok(())
    }

    fn inbound_dispatch(&self, file: &str, format: &str, out: &mut dyn Write) -> Result<()> {
        let coll = crate::scan::scan_file(std::path::Path::new(file), format)?;
        let mut dispatcher = Dispatcher::from_config(self.pool.config())?;
        let mut out = sink_adapter(out);
        for md in coll {
            let mut md: Metadata = md;
            dispatcher.dispatch(&mut md)?;
            md.write_bundle(&mut out)?;
        }
        dispatcher.flush()?;
        Ok(())
    }
}

/// `&mut dyn Write` does not implement `Write` by itself for the bundle
/// helpers that want `impl Write`; this adapter bridges the gap.
fn sink_adapter(out: &mut dyn Write) -> impl Write + '_ {
    struct Adapter<'a>(&'a mut dyn Write);
    impl Write for Adapter<'_> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            self.0.flush()
        }
    }
    Adapter(out)
}

/// Filename for the `Content-Disposition: attachment` response header.
pub fn attachment_filename(dataset: &str, style: QueryStyle) -> String {
    match style {
        QueryStyle::Summary => format!("{dataset}-summary.arkimet"),
        _ => format!("{dataset}.arkimet"),
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use crate::dataset::iseg::tests::{inline_md, test_config};
    use crate::dataset::iseg::IsegWriter;
    use crate::dataset::Writer as _;

    fn server_with_data(dir: &std::path::Path) -> LocalServer {
        let cfg = test_config(dir, "served");
        let mut writer = IsegWriter::open(&cfg).unwrap();
        let mut md = inline_md(200, 8, b"GRIB-served");
        writer.acquire(&mut md).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let text = format!(
            "[served]\ntype = iseg\nstep = daily\npath = {}\n",
            dir.join("served").display()
        );
        let pool = Pool::from_config(ConfigFile::parse(&text).unwrap()).unwrap();
        LocalServer::new(pool)
    }

    #[test]
    fn test_config_verb() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with_data(dir.path());
        let mut out = Vec::new();
        server.config(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[served]"));
        assert!(text.contains("type = iseg"));
    }

    #[test]
    fn test_querydata_verb_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with_data(dir.path());
        let mut out = Vec::new();
        server
            .query_data("served", "origin:GRIB1,200", true, None, &mut out)
            .unwrap();

        let mut seen = Vec::new();
        Metadata::read_stream(&mut std::io::Cursor::new(out), &mut |md| {
            seen.push(md);
            Ok(true)
        })
        .unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get_data().unwrap(), b"GRIB-served");
    }

    #[test]
    fn test_query_bytes_verb() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with_data(dir.path());
        let mut out = Vec::new();
        server
            .query("served", "", QueryStyle::Bytes, &mut out)
            .unwrap();
        assert_eq!(out, b"GRIB-served");
    }

    #[test]
    fn test_summary_verb() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with_data(dir.path());
        let mut out = Vec::new();
        server.summary("served", "", &mut out).unwrap();
        let summary = Summary::read(&mut std::io::Cursor::new(out)).unwrap().unwrap();
        assert_eq!(summary.count(), 1);
    }

    #[test]
    fn test_query_style_parse() {
        assert_eq!(QueryStyle::parse("data").unwrap(), QueryStyle::Data);
        assert!(QueryStyle::parse("pdf").is_err());
        assert_eq!(
            attachment_filename("test200", QueryStyle::Data),
            "test200.arkimet"
        );
    }
}
