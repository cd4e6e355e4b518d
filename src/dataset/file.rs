//! File datasets: one external data file wrapped as a readonly dataset.
//!
//! The file is scanned on open; queries run over the scan result.

use crate::error::Result;
use crate::index::DataQuery;
use crate::matcher::Matcher;
use crate::metadata::Metadata;
use crate::segment;
use crate::summary::Summary;

use super::memory::MemoryDataset;
use super::{DatasetConfig, Reader};

pub struct FileReader {
    inner: MemoryDataset,
}

impl FileReader {
    pub fn open(cfg: &DatasetConfig) -> Result<FileReader> {
        let format = segment::format_from_path(&cfg.path).ok_or_else(|| {
            crate::error::ArkiError::Format(format!(
                "cannot tell the format of {}",
                cfg.path.display()
            ))
        })?;
        let coll = crate::scan::scan_file(&cfg.path, format)?;
        Ok(FileReader {
            inner: MemoryDataset::from_collection(cfg.name.clone(), coll),
        })
    }
}

impl Reader for FileReader {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn query_data(
        &self,
        query: &DataQuery,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        self.inner.query_data(query, consumer)
    }

    fn query_summary(&self, matcher: &Matcher, summary: &mut Summary) -> Result<()> {
        self.inner.query_summary(matcher, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use crate::dataset::Reader as _;

    #[test]
    fn test_wraps_a_vm2_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.vm2");
        std::fs::write(
            &path,
            "200707081300,22,227,1.2,,,000000000\n200707081330,23,227,3,,,000000000\n",
        )
        .unwrap();

        let text = format!("[obs]\ntype = file\npath = {}\n", path.display());
        let cfg = ConfigFile::parse(&text).unwrap();
        let cfg = DatasetConfig::from_section(cfg.section("obs").unwrap()).unwrap();

        let reader = FileReader::open(&cfg).unwrap();
        let mut results = Vec::new();
        reader
            .query_data(
                &DataQuery::new(Matcher::parse("area:VM2,22").unwrap()),
                &mut |md| {
                    results.push(md);
                    Ok(true)
                },
            )
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
