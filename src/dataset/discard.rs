//! Discard datasets: acknowledge and drop.

use crate::error::Result;
use crate::metadata::Metadata;

use super::{AcquireOutcome, DatasetConfig, Writer};

pub struct DiscardWriter {
    name: String,
}

impl DiscardWriter {
    pub fn new(cfg: &DatasetConfig) -> DiscardWriter {
        DiscardWriter {
            name: cfg.name.clone(),
        }
    }
}

impl Writer for DiscardWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&mut self, md: &mut Metadata) -> Result<AcquireOutcome> {
        md.set_assigned_dataset(&self.name);
        Ok(AcquireOutcome::Acquired)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use crate::dataset::iseg::tests::inline_md;

    #[test]
    fn test_accepts_everything_stores_nothing() {
        let cfg = ConfigFile::parse("[sink]\ntype = discard\n").unwrap();
        let cfg = DatasetConfig::from_section(cfg.section("sink").unwrap()).unwrap();
        let mut writer = DiscardWriter::new(&cfg);
        let mut md = inline_md(200, 8, b"GRIB-gone");
        assert_eq!(writer.acquire(&mut md).unwrap(), AcquireOutcome::Acquired);
        assert_eq!(md.assigned_dataset().unwrap().name, "sink");
        writer.flush().unwrap();
    }
}
