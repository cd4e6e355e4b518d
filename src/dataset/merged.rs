//! Merged dataset: the union of several readonly datasets.
//!
//! Queries fan out to every member; results are deduplicated by metadata
//! identity (the typed items, ignoring provenance) so the same datum
//! archived in two places is returned once.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::index::DataQuery;
use crate::matcher::Matcher;
use crate::metadata::Metadata;
use crate::summary::Summary;

use super::{identity_key, Reader};

pub struct MergedDataset {
    name: String,
    members: Vec<Arc<dyn Reader>>,
}

impl MergedDataset {
    pub fn new(name: impl Into<String>, members: Vec<Arc<dyn Reader>>) -> MergedDataset {
        MergedDataset {
            name: name.into(),
            members,
        }
    }
}

impl Reader for MergedDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn query_data(
        &self,
        query: &DataQuery,
        consumer: &mut dyn FnMut(Metadata) -> Result<bool>,
    ) -> Result<()> {
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut dedup = |md: Metadata| -> Result<bool> {
            if seen.insert(identity_key(&md)) {
                consumer(md)
            } else {
                Ok(true)
            }
        };

        match &query.sorter {
            None => {
                for member in &self.members {
                    member.query_data(query, &mut dedup)?;
                }
                Ok(())
            }
            Some(expr) => {
                let cmp = crate::metadata::sort::Comparator::parse(expr)?;
                let inner = DataQuery {
                    matcher: query.matcher.clone(),
                    with_data: query.with_data,
                    sorter: None,
                };
                let mut all = Vec::new();
                for member in &self.members {
                    member.query_data(&inner, &mut |md| {
                        all.push(md);
                        Ok(true)
                    })?;
                }
                all.sort_by(|a, b| cmp.compare(a, b));
                for md in all {
                    if !dedup(md)? {
                        break;
                    }
                }
                Ok(())
            }
        }
    }

    fn query_summary(&self, matcher: &Matcher, summary: &mut Summary) -> Result<()> {
        for member in &self.members {
            member.query_summary(matcher, summary)?;
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::iseg::tests::inline_md;
    use crate::dataset::memory::MemoryDataset;

    #[test]
    fn test_union_with_dedup() {
        let mut a = MemoryDataset::new("a");
        a.push(inline_md(200, 8, b"GRIB-shared"));
        a.push(inline_md(200, 9, b"GRIB-only-a"));
        let mut b = MemoryDataset::new("b");
        b.push(inline_md(200, 8, b"GRIB-shared"));
        b.push(inline_md(80, 9, b"GRIB-only-b"));

        let merged = MergedDataset::new("merged", vec![Arc::new(a), Arc::new(b)]);
        let mut results = Vec::new();
        merged
            .query_data(&DataQuery::new(Matcher::empty()), &mut |md| {
                results.push(md);
                Ok(true)
            })
            .unwrap();
        // The shared datum appears once.
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_summary_merges_members() {
        let mut a = MemoryDataset::new("a");
        a.push(inline_md(200, 8, b"GRIB-1"));
        let mut b = MemoryDataset::new("b");
        b.push(inline_md(80, 9, b"GRIB-22"));

        let merged = MergedDataset::new("merged", vec![Arc::new(a), Arc::new(b)]);
        let mut summary = Summary::new();
        merged.query_summary(&Matcher::empty(), &mut summary).unwrap();
        assert_eq!(summary.count(), 2);
        assert_eq!(summary.size(), 6 + 7);
    }
}
