//! Remote datasets: clients of an arkimet HTTP server.
//!
//! The dataset `path` is the server-side dataset URL; queries are posted as
//! form requests and the response streams are the same binary bundles the
//! local engine writes.

use url::Url;

use crate::error::{ArkiError, Result};
use crate::index::DataQuery;
use crate::matcher::Matcher;
use crate::metadata::Metadata;
use crate::summary::Summary;

use super::DatasetConfig;

pub struct RemoteReader {
    name: String,
    base: Url,
}

impl RemoteReader {
    pub fn open(cfg: &DatasetConfig) -> Result<RemoteReader> {
        let base = Url::parse(&cfg.path.to_string_lossy())
            .map_err(|e| ArkiError::Http(format!("invalid dataset url: {e}")))?;
        Ok(RemoteReader {
            name: cfg.name.clone(),
            base,
        })
    }

    fn endpoint(&self, verb: &str) -> Result<Url> {
        // The dataset url names a directory: keep its path and append.
        let mut url = self.base.clone();
        let path = format!("{}/{}", url.path().trim_end_matches('/'), verb);
        url.set_path(&path);
        Ok(url)
    }

    fn post(&self, verb: &str, form: &[(&str, &str)]) -> Result<Box<dyn std::io::Read + Send>> {
        let url = self.endpoint(verb)?;
        let response = ureq::post(url.as_str())
            .send_form(form)
            .map_err(|e| ArkiError::Http(format!("POST {url}: {e}")))?;
        Ok(Box::new(response.into_reader()))
    }
}

impl super::Reader for RemoteReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn query_data(
        &self,
        query: &DataQuery,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        let matcher = query.matcher.to_string_expanded();
        let withdata = if query.with_data { "1" } else { "0" };
        let mut form = vec![("matcher", matcher.as_str()), ("withdata", withdata)];
        if let Some(sorter) = &query.sorter {
            form.push(("sorter", sorter.as_str()));
        }
        let mut reader = self.post("querydata", &form)?;
        Metadata::read_stream(&mut reader, consumer)
    }

    fn query_summary(&self, matcher: &Matcher, summary: &mut Summary) -> Result<()> {
        let query = matcher.to_string_expanded();
        let mut reader = self.post("summary", &[("query", query.as_str())])?;
        match Summary::read(&mut reader)? {
            Some(remote) => {
                summary.merge(&remote);
                Ok(())
            }
            None => Err(ArkiError::Http("empty summary response".into())),
        }
    }
}

impl RemoteReader {
    /// Raw data bytes of everything matching, concatenated.
    pub fn query_bytes(&self, matcher: &Matcher, out: &mut dyn std::io::Write) -> Result<()> {
        let query = matcher.to_string_expanded();
        let mut reader = self.post("querybytes", &[("matcher", query.as_str())])?;
        std::io::copy(&mut reader, out).map_err(|e| ArkiError::Http(e.to_string()))?;
        Ok(())
    }

    /// Fetch the server-side dataset configuration.
    pub fn fetch_config(base: &str) -> Result<crate::config::ConfigFile> {
        let url = format!("{}/config", base.trim_end_matches('/'));
        let response = ureq::get(&url)
            .call()
            .map_err(|e| ArkiError::Http(format!("GET {url}: {e}")))?;
        let text = response
            .into_string()
            .map_err(|e| ArkiError::Http(e.to_string()))?;
        crate::config::ConfigFile::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;

    #[test]
    fn test_endpoint_construction() {
        let text = "[remote]\ntype = remote\npath = http://example.org/dataset/test200\n";
        let cfg = ConfigFile::parse(text).unwrap();
        let cfg = DatasetConfig::from_section(cfg.section("remote").unwrap()).unwrap();
        let reader = RemoteReader::open(&cfg).unwrap();
        assert_eq!(
            reader.endpoint("querydata").unwrap().as_str(),
            "http://example.org/dataset/test200/querydata"
        );
    }

    #[test]
    fn test_bad_url_rejected() {
        let text = "[remote]\ntype = remote\npath = not-a-url\n";
        let cfg = ConfigFile::parse(text).unwrap();
        let cfg = DatasetConfig::from_section(cfg.section("remote").unwrap()).unwrap();
        assert!(RemoteReader::open(&cfg).is_err());
    }
}
