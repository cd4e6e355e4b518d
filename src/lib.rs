//! Arkimet: an archive and dispatch engine for meteorological and
//! observational data.
//!
//! Incoming messages are scanned into a small typed metadata tuple,
//! dispatched into datasets by matcher expressions, stored in append-only
//! segments, indexed in SQLite and retrieved by query. The crate provides:
//!
//! - the typed metadata model ([`types`], [`values`], [`metadata`],
//!   [`summary`]): sum-typed items with canonical binary, string and
//!   structured encodings and a total order;
//! - the [`matcher`] engine: textual queries compiled into in-memory
//!   predicates and index constraints;
//! - the [`segment`] layer: immutable append-only data files with metadata
//!   and summary sidecars, transactional append, compression and a state
//!   machine driving maintenance;
//! - the SQLite-backed [`index`] with attribute interning, an aggregate
//!   table and a time-bucketed summary cache;
//! - [`dataset`] kinds, the [`dispatcher`] and the maintenance agents;
//! - the wire [`server`] verbs the HTTP front-end adapts onto.

pub mod config;
pub mod core;
pub mod dataset;
pub mod dispatcher;
pub mod error;
pub mod index;
pub mod matcher;
pub mod metadata;
pub mod runtime;
pub mod scan;
pub mod segment;
pub mod server;
pub mod summary;
pub mod types;
pub mod utils;
pub mod values;

pub use error::{ArkiError, Result};
pub use matcher::Matcher;
pub use metadata::Metadata;
pub use summary::Summary;
