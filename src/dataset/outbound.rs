//! Outbound datasets: write-only export spools.
//!
//! Data is stored in segments chosen by the step function, with no index
//! and no sidecars; the dataset cannot be queried back.

use tracing::warn;

use crate::core::transaction::TransactionChain;
use crate::error::{ArkiError, Result};
use crate::metadata::Metadata;
use crate::segment::data::AppendSession;

use super::{AcquireOutcome, DatasetConfig, Writer};

pub struct OutboundWriter {
    cfg: DatasetConfig,
    sessions: Vec<AppendSession>,
}

impl OutboundWriter {
    pub fn open(cfg: &DatasetConfig) -> Result<OutboundWriter> {
        std::fs::create_dir_all(&cfg.path).map_err(|e| ArkiError::io(&cfg.path, e))?;
        Ok(OutboundWriter {
            cfg: cfg.clone(),
            sessions: Vec::new(),
        })
    }
}

impl Writer for OutboundWriter {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn acquire(&mut self, md: &mut Metadata) -> Result<AcquireOutcome> {
        let data = md.get_data()?;
        let (reftime, _) = md.reftime_interval().ok_or_else(|| {
            ArkiError::Consistency("cannot acquire a metadata without a reference time".into())
        })?;
        let format = md
            .source()
            .map(|s| s.format().to_string())
            .ok_or_else(|| ArkiError::Consistency("cannot acquire a metadata without a source".into()))?;
        let relpath = self.cfg.step.target_file(&reftime, &format);

        let session = match self.sessions.iter().position(|s| s.relpath() == relpath) {
            Some(pos) => &mut self.sessions[pos],
            None => {
                self.sessions
                    .push(AppendSession::open(&self.cfg.path, &relpath, &format)?);
                self.sessions.last_mut().unwrap()
            }
        };
        session.append(md, &data)?;
        md.set_assigned_dataset(&self.cfg.name);
        Ok(AcquireOutcome::Acquired)
    }

    fn flush(&mut self) -> Result<()> {
        let mut chain = TransactionChain::new();
        for session in self.sessions.drain(..) {
            chain.push(Box::new(session.into_transaction()));
        }
        chain.into_pending().commit()
    }

    fn discard(&mut self) -> Result<()> {
        let mut chain = TransactionChain::new();
        for session in self.sessions.drain(..) {
            chain.push(Box::new(session.into_transaction()));
        }
        chain.into_pending().rollback()
    }
}

impl Drop for OutboundWriter {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            if let Err(e) = self.discard() {
                warn!(dataset = %self.cfg.name, "discarding unflushed batch failed: {e}");
            }
        }
    }
}
