//! Dataset pool: lazily instantiated datasets from a multi-section
//! configuration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::ConfigFile;
use crate::error::{ArkiError, Result};

use super::{open_reader, open_writer, DatasetConfig, Reader, Writer};

pub struct Pool {
    config: ConfigFile,
    datasets: Vec<DatasetConfig>,
    readers: Mutex<HashMap<String, Arc<dyn Reader>>>,
}

impl Pool {
    pub fn from_config(config: ConfigFile) -> Result<Pool> {
        let mut datasets = Vec::new();
        for section in config.sections() {
            datasets.push(DatasetConfig::from_section(section)?);
        }
        Ok(Pool {
            config,
            datasets,
            readers: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn datasets(&self) -> &[DatasetConfig] {
        &self.datasets
    }

    pub fn dataset(&self, name: &str) -> Result<&DatasetConfig> {
        self.datasets
            .iter()
            .find(|ds| ds.name == name)
            .ok_or_else(|| ArkiError::parse("pool", format!("no dataset named `{name}`")))
    }

    /// Shared reader handle, created on first use.
    pub fn reader(&self, name: &str) -> Result<Arc<dyn Reader>> {
        if let Some(reader) = self.readers.lock().unwrap().get(name) {
            return Ok(reader.clone());
        }
        let cfg = self.dataset(name)?;
        let reader: Arc<dyn Reader> = Arc::from(open_reader(cfg)?);
        self.readers
            .lock()
            .unwrap()
            .insert(name.to_string(), reader.clone());
        Ok(reader)
    }

    /// Fresh writer handle; writers are stateful, so they are not shared.
    pub fn writer(&self, name: &str) -> Result<Box<dyn Writer>> {
        open_writer(self.dataset(name)?)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
