//! In-memory metadata collections and the `.metadata` sidecar files.

use std::path::Path;

use crate::error::Result;
use crate::metadata::Metadata;
use crate::summary::Summary;
use crate::utils;

/// An owned, ordered collection of metadata. Backs the `.metadata` sidecar
/// of a segment and the in-RAM scratch dataset.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    items: Vec<Metadata>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
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

    pub fn iter(&self) -> impl Iterator<Item = &Metadata> {
        self.items.iter()
    }

    pub fn get(&self, n: usize) -> Option<&Metadata> {
        self.items.get(n)
    }

    pub fn into_vec(self) -> Vec<Metadata> {
        self.items
    }

    pub fn as_slice(&self) -> &[Metadata] {
        &self.items
    }

    /// A consumer that appends into this collection; handy for query APIs.
    pub fn inserter(&mut self) -> impl FnMut(Metadata) -> Result<bool> + '_ {
        |md| {
            self.items.push(md);
            Ok(true)
        }
    }

    /// Read a `.metadata` sidecar.
    pub fn read_from_file(path: &Path) -> Result<Collection> {
        let mut coll = Collection::new();
        Metadata::read_file(path, &mut |md| {
            coll.items.push(md);
            Ok(true)
        })?;
        Ok(coll)
    }

    /// Write a `.metadata` sidecar atomically.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        for md in &self.items {
            md.write_bundle(&mut buf)?;
        }
        utils::write_atomically(path, &buf)
    }

    /// Aggregate a summary over the collection.
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::new();
        for md in &self.items {
            summary.add(md);
        }
        summary
    }

    /// Sort in place with a comparator DSL expression.
    pub fn sort_by_expr(&mut self, expr: &str) -> Result<()> {
        let cmp = super::sort::Comparator::parse(expr)?;
        self.items.sort_by(|a, b| cmp.compare(a, b));
        Ok(())
    }

    /// Sort by the canonical metadata order.
    pub fn sort(&mut self) {
        self.items.sort();
    }
}

impl FromIterator<Metadata> for Collection {
    fn from_iter<T: IntoIterator<Item = Metadata>>(iter: T) -> Self {
        Collection {
            items: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Collection {
    type Item = Metadata;
    type IntoIter = std::vec::IntoIter<Metadata>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

// ── Tests ──────────────────────────────────────────────────────────
