//! In-RAM scratch dataset over a metadata collection.

use crate::error::Result;
use crate::index::DataQuery;
use crate::matcher::Matcher;
use crate::metadata::{Collection, Metadata};
use crate::summary::Summary;

pub struct MemoryDataset {
    name: String,
    items: Collection,
}

impl MemoryDataset {
    pub fn new(name: impl Into<String>) -> MemoryDataset {
        MemoryDataset {
            name: name.into(),
            items: Collection::new(),
        }
    }

    pub fn from_collection(name: impl Into<String>, items: Collection) -> MemoryDataset {
        MemoryDataset {
            name: name.into(),
            items,
        }
    }

    pub fn push(&mut self, md: Metadata) {
        self.items.push(md);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl super::Reader for MemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn query_data(
        &self,
        query: &DataQuery,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        let mut matched: Vec<&Metadata> = self
            .items
            .iter()
            .filter(|md| query.matcher.matches(md))
            .collect();
        if let Some(expr) = &query.sorter {
            let cmp = crate::metadata::sort::Comparator::parse(expr)?;
            matched.sort_by(|a, b| cmp.compare(a, b));
        }
        for md in matched {
            let mut md = md.clone();
            if query.with_data {
                md.inline_from_source()?;
            }
            if !consumer(md)? {
                break;
            }
        }
        Ok(())
    }

    fn query_summary(&self, matcher: &Matcher, summary: &mut Summary) -> Result<()> {
        for md in self.items.iter() {
            if matcher.matches(md) {
                summary.add(md);
            }
        }
        Ok(())
    }
}
