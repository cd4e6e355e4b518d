//! Human-readable annotations for metadata items.
//!
//! The annotated YAML output (`--annotate`) appends a short description to
//! each item line. Implementations can consult external tables; the built-in
//! one knows only what can be derived from the item itself.

use crate::types::{Item, Level, Run, Timerange};

pub trait Formatter: Send + Sync {
    /// A short description of `item`, or `None` to leave the line bare.
    fn format(&self, item: &Item) -> Option<String>;
}

/// Built-in formatter with unit-level knowledge of common GRIB1 encodings.
#[derive(Debug, Default)]
pub struct BasicFormatter;

impl Formatter for BasicFormatter {
    fn format(&self, item: &Item) -> Option<String> {
        match item {
            Item::Run(Run::Minute { minute }) => {
                Some(format!("run at {:02}:{:02} UTC", minute / 60, minute % 60))
            }
            Item::Level(Level::Grib1 { ty: Some(1), .. }) => Some("surface".to_string()),
            Item::Level(Level::Grib1 {
                ty: Some(100),
                l1: Some(hpa),
                ..
            }) => Some(format!("isobaric {hpa}hPa")),
            Item::Timerange(Timerange::Grib1 {
                ty: Some(0),
                p1: Some(0),
                ..
            }) => Some("analysis".to_string()),
            Item::Timerange(Timerange::Grib1 {
                ty: Some(0),
                unit: Some(1),
                p1: Some(p1),
                ..
            }) => Some(format!("forecast +{p1}h")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Origin;

    #[test]
    fn test_basic_formatter() {
        let f = BasicFormatter;
        assert_eq!(
            f.format(&Item::Run(Run::minute(12, 0))),
            Some("run at 12:00 UTC".to_string())
        );
        assert_eq!(
            f.format(&Item::Level(Level::grib1(Some(1), None, None))),
            Some("surface".to_string())
        );
        assert_eq!(f.format(&Item::Origin(Origin::grib1(None, None, None))), None);
    }
}
