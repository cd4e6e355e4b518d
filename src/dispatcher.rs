//! Dispatcher: route scanned metadata into writable datasets by filter.
//!
//! Every non-error dataset's filter is evaluated in declared order. One
//! match acquires there; several matches acquire into the first with a note
//! recording the ambiguity; none, or duplicates everywhere, fall back to
//! the error dataset. Flushing commits the touched datasets newest-first.

use tracing::warn;

use crate::config::ConfigFile;
use crate::dataset::{self, AcquireOutcome, DatasetConfig, Writer};
use crate::error::{ArkiError, Result};
use crate::metadata::Metadata;

/// Where one metadata ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// Stored in the named dataset.
    Acquired(String),
    /// Rejected as duplicate everywhere it matched; stored in the error
    /// dataset.
    Duplicate,
    /// Matched nothing, or every acquire failed; stored in the error
    /// dataset.
    InErrorDataset,
    /// Could not be stored anywhere, not even in the error dataset.
    NotImported,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub successful: usize,
    pub duplicates: usize,
    pub in_error_dataset: usize,
    pub not_imported: usize,
}

struct Route {
    cfg: DatasetConfig,
    writer: Box<dyn Writer>,
}

pub struct Dispatcher {
    routes: Vec<Route>,
    error_route: Option<Box<dyn Writer>>,
    /// Names in order of first use, for newest-first flushing.
    touched: Vec<String>,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Build a dispatcher from a pool configuration: every writable
    /// non-error section becomes a route, the error section the fallback.
    pub fn from_config(config: &ConfigFile) -> Result<Dispatcher> {
        let mut routes = Vec::new();
        let mut error_route = None;
        for section in config.sections() {
            let cfg = DatasetConfig::from_section(section)?;
            if cfg.is_error() {
                if error_route.is_some() {
                    return Err(ArkiError::parse(
                        "dispatcher",
                        "more than one error dataset configured",
                    ));
                }
                error_route = Some(dataset::open_writer(&cfg)?);
                continue;
            }
            match dataset::open_writer(&cfg) {
                Ok(writer) => routes.push(Route { cfg, writer }),
                // Readonly kinds (file, remote) take no part in dispatch.
                Err(_) => continue,
            }
        }
        Ok(Dispatcher {
            routes,
            error_route,
            touched: Vec::new(),
            stats: DispatchStats::default(),
        })
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    fn mark_touched(&mut self, name: &str) {
        if !self.touched.iter().any(|t| t == name) {
            self.touched.push(name.to_string());
        }
    }

    fn acquire_into_error(&mut self, md: &mut Metadata) -> Result<bool> {
        let writer = match &mut self.error_route {
            Some(writer) => writer,
            None => return Ok(false),
        };
        let name = writer.name().to_string();
        let outcome = writer.acquire(md);
        match outcome {
            Ok(AcquireOutcome::Acquired) => {
                self.mark_touched(&name);
                Ok(true)
            }
            Ok(AcquireOutcome::Duplicate) => Ok(false),
            Err(e) => {
                warn!("error dataset refused a message: {e}");
                Ok(false)
            }
        }
    }

    /// Route one metadata. The metadata's ASSIGNEDDATASET names the
    /// destination on return.
    pub fn dispatch(&mut self, md: &mut Metadata) -> Result<DispatchResult> {
        let matches: Vec<usize> = self
            .routes
            .iter()
            .enumerate()
            .filter(|(_, route)| route.cfg.filter.matches(md))
            .map(|(n, _)| n)
            .collect();

        if matches.is_empty() {
            md.add_note("Message could not be assigned to any dataset");
            return if self.acquire_into_error(md)? {
                self.stats.in_error_dataset += 1;
                Ok(DispatchResult::InErrorDataset)
            } else {
                self.stats.not_imported += 1;
                Ok(DispatchResult::NotImported)
            };
        }

        if matches.len() > 1 {
            let names: Vec<&str> = matches
                .iter()
                .map(|n| self.routes[*n].cfg.name.as_str())
                .collect();
            md.add_note(format!(
                "Message matched multiple datasets: {}",
                names.join(", ")
            ));
        }

        let mut saw_duplicate = false;
        for n in matches {
            let name = self.routes[n].cfg.name.clone();
            match self.routes[n].writer.acquire(md) {
                Ok(AcquireOutcome::Acquired) => {
                    self.mark_touched(&name);
                    self.stats.successful += 1;
                    return Ok(DispatchResult::Acquired(name));
                }
                Ok(AcquireOutcome::Duplicate) => {
                    saw_duplicate = true;
                    continue;
                }
                Err(e) => {
                    md.add_note(format!("Acquire into {name} failed: {e}"));
                    continue;
                }
            }
        }

        // Every match refused the message.
        if saw_duplicate {
            md.add_note("Message was already present in every matching dataset");
        }
        if self.acquire_into_error(md)? {
            if saw_duplicate {
                self.stats.duplicates += 1;
                Ok(DispatchResult::Duplicate)
            } else {
                self.stats.in_error_dataset += 1;
                Ok(DispatchResult::InErrorDataset)
            }
        } else {
            self.stats.not_imported += 1;
            Ok(DispatchResult::NotImported)
        }
    }

    /// Commit all outstanding batches, most recently touched dataset first.
    pub fn flush(&mut self) -> Result<()> {
        let order = std::mem::take(&mut self.touched);
        for name in order.iter().rev() {
            if let Some(writer) = &mut self.error_route {
                if writer.name() == name {
                    writer.flush()?;
                    continue;
                }
            }
            if let Some(route) = self.routes.iter_mut().find(|r| r.cfg.name == *name) {
                route.writer.flush()?;
            }
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::iseg::tests::inline_md;
    use crate::dataset::Reader as _;
    use crate::index::DataQuery;
    use crate::matcher::Matcher;

    fn three_dataset_config(root: &std::path::Path) -> ConfigFile {
        let text = format!(
            "\
[test200]
type = iseg
step = daily
filter = origin:GRIB1,200
path = {root}/test200

[test80]
type = iseg
step = daily
filter = origin:GRIB1,80
path = {root}/test80

[error]
type = error
step = daily
path = {root}/error
",
            root = root.display()
        );
        ConfigFile::parse(&text).unwrap()
    }

    #[test]
    fn test_dispatch_to_three_datasets_by_origin() {
        let dir = tempfile::tempdir().unwrap();
        let config = three_dataset_config(dir.path());
        let mut dispatcher = Dispatcher::from_config(&config).unwrap();

        // Three messages with origins 200, 80, 98.
        let mut md200 = inline_md(200, 8, b"GRIB-200");
        let mut md80 = inline_md(80, 8, b"GRIB-80-");
        let mut md98 = inline_md(98, 8, b"GRIB-98-");

        assert_eq!(
            dispatcher.dispatch(&mut md200).unwrap(),
            DispatchResult::Acquired("test200".into())
        );
        assert_eq!(
            dispatcher.dispatch(&mut md80).unwrap(),
            DispatchResult::Acquired("test80".into())
        );
        assert_eq!(
            dispatcher.dispatch(&mut md98).unwrap(),
            DispatchResult::InErrorDataset
        );
        dispatcher.flush().unwrap();

        // Each metadata records its destination.
        assert_eq!(md200.assigned_dataset().unwrap().name, "test200");
        assert_eq!(md80.assigned_dataset().unwrap().name, "test80");
        assert_eq!(md98.assigned_dataset().unwrap().name, "error");

        let stats = dispatcher.stats();
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.in_error_dataset, 1);
        assert_eq!(stats.not_imported, 0);

        // One datum in each target dataset.
        let pool = crate::dataset::Pool::from_config(config).unwrap();
        for (name, expect) in [("test200", 1), ("test80", 1), ("error", 1)] {
            let mut count = 0;
            pool.reader(name)
                .unwrap()
                .query_data(&DataQuery::new(Matcher::empty()), &mut |_| {
                    count += 1;
                    Ok(true)
                })
                .unwrap();
            assert_eq!(count, expect, "dataset {name}");
        }
    }

    #[test]
    fn test_duplicates_reroute_to_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = three_dataset_config(dir.path());
        let mut dispatcher = Dispatcher::from_config(&config).unwrap();

        let mut first = inline_md(200, 8, b"GRIB-dup");
        let mut second = inline_md(200, 8, b"GRIB-dup");
        assert_eq!(
            dispatcher.dispatch(&mut first).unwrap(),
            DispatchResult::Acquired("test200".into())
        );
        assert_eq!(
            dispatcher.dispatch(&mut second).unwrap(),
            DispatchResult::Duplicate
        );
        dispatcher.flush().unwrap();

        let stats = dispatcher.stats();
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.duplicates, 1);
        // The duplicate carries a note explaining the reroute.
        assert!(second
            .notes()
            .iter()
            .any(|n| n.content.contains("already present")));
        assert_eq!(second.assigned_dataset().unwrap().name, "error");
    }

    #[test]
    fn test_no_error_dataset_means_not_imported() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!(
            "[only]\ntype = iseg\nstep = daily\nfilter = origin:GRIB1,200\npath = {}\n",
            dir.path().join("only").display()
        );
        let config = ConfigFile::parse(&text).unwrap();
        let mut dispatcher = Dispatcher::from_config(&config).unwrap();

        let mut md = inline_md(98, 8, b"GRIB-lost");
        assert_eq!(
            dispatcher.dispatch(&mut md).unwrap(),
            DispatchResult::NotImported
        );
        assert_eq!(dispatcher.stats().not_imported, 1);
    }

    #[test]
    fn test_ambiguous_match_goes_to_first_with_note() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!(
            "\
[wide]
type = iseg
step = daily
filter = origin:GRIB1
path = {root}/wide

[narrow]
type = iseg
step = daily
filter = origin:GRIB1,200
path = {root}/narrow
",
            root = dir.path().display()
        );
        let config = ConfigFile::parse(&text).unwrap();
        let mut dispatcher = Dispatcher::from_config(&config).unwrap();

        let mut md = inline_md(200, 8, b"GRIB-ambi");
        assert_eq!(
            dispatcher.dispatch(&mut md).unwrap(),
            DispatchResult::Acquired("wide".into())
        );
        assert!(md
            .notes()
            .iter()
            .any(|n| n.content.contains("matched multiple datasets")));
        dispatcher.flush().unwrap();
    }
}
