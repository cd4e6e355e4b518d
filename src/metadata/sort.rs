//! Sort comparators over metadata.
//!
//! The expression syntax is `[interval:][-]key[,[-]key…]` where a key is
//! `reftime` or an item type name and a leading `-` reverses that key.
//! With an interval prefix (`minute`, `hour`, `day`, `month`, `year`) the
//! stream is grouped by truncated reftime and each group sorted on its own.

use std::cmp::Ordering;

use crate::error::{ArkiError, Result};
use crate::metadata::Metadata;
use crate::types::{Code, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl Interval {
    fn parse(s: &str) -> Result<Interval> {
        match s {
            "minute" => Ok(Interval::Minute),
            "hour" => Ok(Interval::Hour),
            "day" => Ok(Interval::Day),
            "month" => Ok(Interval::Month),
            "year" => Ok(Interval::Year),
            other => Err(ArkiError::parse(
                "sort expression",
                format!("unknown interval `{other}`"),
            )),
        }
    }

    /// Truncate a time to this interval's start.
    pub fn truncate(&self, t: &Time) -> Time {
        match self {
            Interval::Minute => Time::new(t.ye, t.mo, t.da, t.ho, t.mi, 0),
            Interval::Hour => Time::new(t.ye, t.mo, t.da, t.ho, 0, 0),
            Interval::Day => Time::new(t.ye, t.mo, t.da, 0, 0, 0),
            Interval::Month => Time::new(t.ye, t.mo, 1, 0, 0, 0),
            Interval::Year => Time::new(t.ye, 1, 1, 0, 0, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Reftime,
    Item(Code),
}

#[derive(Debug, Clone)]
pub struct Comparator {
    keys: Vec<(Key, bool)>,
    interval: Option<Interval>,
}

impl Comparator {
    pub fn parse(expr: &str) -> Result<Comparator> {
        let expr = expr.trim();
        let (interval, keys_part) = match expr.split_once(':') {
            Some((interval, rest)) => (Some(Interval::parse(interval.trim())?), rest),
            None => (None, expr),
        };
        let mut keys = Vec::new();
        for part in keys_part.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, reverse) = match part.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (part, false),
            };
            let key = if name == "reftime" {
                Key::Reftime
            } else {
                Key::Item(Code::from_name(name)?)
            };
            keys.push((key, reverse));
        }
        if keys.is_empty() {
            return Err(ArkiError::parse("sort expression", "no sort keys"));
        }
        Ok(Comparator { keys, interval })
    }

    pub fn interval(&self) -> Option<Interval> {
        self.interval
    }

    pub fn compare(&self, a: &Metadata, b: &Metadata) -> Ordering {
        for (key, reverse) in &self.keys {
            let ord = match key {
                Key::Reftime => {
                    let ta = a.reftime_interval().map(|(begin, _)| begin);
                    let tb = b.reftime_interval().map(|(begin, _)| begin);
                    ta.cmp(&tb)
                }
                Key::Item(code) => a.get(*code).cmp(&b.get(*code)),
            };
            let ord = if *reverse { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Buffering sorter: accumulates metadata, emits them sorted. With an
/// interval, each truncated-reftime group is sorted and flushed on its own,
/// bounding memory to one group.
pub struct Sorter<'a> {
    cmp: Comparator,
    buffer: Vec<Metadata>,
    current_group: Option<Time>,
    consumer: &'a mut dyn FnMut(Metadata) -> Result<bool>,
    done: bool,
}

impl<'a> Sorter<'a> {
    pub fn new(cmp: Comparator, consumer: &'a mut dyn FnMut(Metadata) -> Result<bool>) -> Self {
        Self {
            cmp,
            buffer: Vec::new(),
            current_group: None,
            consumer,
            done: false,
        }
    }

    pub fn add(&mut self, md: Metadata) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        if let Some(interval) = self.cmp.interval() {
            let group = md
                .reftime_interval()
                .map(|(begin, _)| interval.truncate(&begin));
            if group != self.current_group && self.current_group.is_some() {
                self.flush_group()?;
            }
            self.current_group = group;
        }
        self.buffer.push(md);
        Ok(!self.done)
    }

    fn flush_group(&mut self) -> Result<()> {
        let cmp = self.cmp.clone();
        self.buffer.sort_by(|a, b| cmp.compare(a, b));
        for md in self.buffer.drain(..) {
            if !(self.consumer)(md)? {
                self.done = true;
                break;
            }
        }
        Ok(())
    }

    /// Emit everything still buffered.
    pub fn finish(mut self) -> Result<()> {
        self.flush_group()
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Origin, Reftime};

    fn md(centre: u32, ho: u32, mi: u32) -> Metadata {
        let mut md = Metadata::new();
        md.set(Origin::grib1(Some(centre), None, None));
        md.set(Reftime::position(Time::new(2007, 7, 8, ho, mi, 0)));
        md
    }

    #[test]
    fn test_parse_rejects_junk() {
        assert!(Comparator::parse("").is_err());
        assert!(Comparator::parse("banana").is_err());
        assert!(Comparator::parse("fortnight:reftime").is_err());
    }

    #[test]
    fn test_multi_key_compare() {
        let cmp = Comparator::parse("origin,-reftime").unwrap();
        let a = md(80, 1, 0);
        let b = md(200, 0, 0);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);

        let c = md(80, 2, 0);
        // Same origin, later reftime sorts first because of `-reftime`.
        assert_eq!(cmp.compare(&c, &a), Ordering::Less);
    }

    #[test]
    fn test_sorter_without_interval() {
        let mut seen = Vec::new();
        let mut consumer = |m: Metadata| {
            seen.push(m.reftime_interval().unwrap().0);
            Ok(true)
        };
        let mut sorter = Sorter::new(Comparator::parse("reftime").unwrap(), &mut consumer);
        sorter.add(md(200, 2, 0)).unwrap();
        sorter.add(md(200, 0, 0)).unwrap();
        sorter.add(md(200, 1, 0)).unwrap();
        sorter.finish().unwrap();
        assert_eq!(
            seen.iter().map(|t| t.ho).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_sorter_interval_groups_flush_independently() {
        let mut seen = Vec::new();
        let mut consumer = |m: Metadata| {
            let t = m.reftime_interval().unwrap().0;
            seen.push((t.ho, t.mi));
            Ok(true)
        };
        let mut sorter = Sorter::new(Comparator::parse("hour:-reftime").unwrap(), &mut consumer);
        // Hour 0 group arrives unsorted, then hour 1 group.
        sorter.add(md(200, 0, 10)).unwrap();
        sorter.add(md(200, 0, 40)).unwrap();
        sorter.add(md(200, 1, 5)).unwrap();
        sorter.add(md(200, 1, 30)).unwrap();
        sorter.finish().unwrap();
        // Within each hour, minutes descend; hours keep arrival order.
        assert_eq!(seen, vec![(0, 40), (0, 10), (1, 30), (1, 5)]);
    }
}
