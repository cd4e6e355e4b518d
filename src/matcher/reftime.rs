//! Reference time matcher.
//!
//! The pattern is a comma-separated conjunction of constraints, each
//! `(>=|<=|>|<|==|=)` followed by a truncated datetime. A truncated
//! datetime denotes the whole interval it expands to: `>=2010-06` admits
//! any instant from 2010-06-01T00:00:00 inclusive, `<2010-07` any instant
//! strictly before 2010-07-01T00:00:00, and `=2007` the whole of 2007.
//! `today`, `yesterday` and `tomorrow` resolve against the runtime clock at
//! parse time, with day precision.

use std::fmt;

use crate::error::{ArkiError, Result};
use crate::runtime::Runtime;
use crate::types::{PartialTime, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
}

impl Op {
    fn as_str(&self) -> &'static str {
        match self {
            Op::Ge => ">=",
            Op::Gt => ">",
            Op::Le => "<=",
            Op::Lt => "<",
            Op::Eq => "=",
        }
    }
}

/// One constraint, normalised to a half-open interval `[lower, upper)`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DtConstraint {
    op: Op,
    /// The timestamp as written, for display.
    text: String,
    lower: Option<Time>,
    upper: Option<Time>,
}

impl DtConstraint {
    fn parse(tok: &str) -> Result<DtConstraint> {
        let tok = tok.trim();
        let (op, rest) = if let Some(rest) = tok.strip_prefix(">=") {
            (Op::Ge, rest)
        } else if let Some(rest) = tok.strip_prefix("<=") {
            (Op::Le, rest)
        } else if let Some(rest) = tok.strip_prefix("==") {
            (Op::Eq, rest)
        } else if let Some(rest) = tok.strip_prefix('=') {
            (Op::Eq, rest)
        } else if let Some(rest) = tok.strip_prefix('>') {
            (Op::Gt, rest)
        } else if let Some(rest) = tok.strip_prefix('<') {
            (Op::Lt, rest)
        } else {
            (Op::Eq, tok)
        };
        let rest = rest.trim();
        let partial = resolve_partial(rest)?;
        let (lower, upper) = match op {
            Op::Ge => (Some(partial.lower_bound()), None),
            Op::Gt => (Some(partial.upper_bound_exclusive()), None),
            Op::Lt => (None, Some(partial.lower_bound())),
            Op::Le => (None, Some(partial.upper_bound_exclusive())),
            Op::Eq => (
                Some(partial.lower_bound()),
                Some(partial.upper_bound_exclusive()),
            ),
        };
        Ok(DtConstraint {
            op,
            text: rest.to_string(),
            lower,
            upper,
        })
    }

    fn matches(&self, t: &Time) -> bool {
        if let Some(lower) = &self.lower {
            if t < lower {
                return false;
            }
        }
        if let Some(upper) = &self.upper {
            if t >= upper {
                return false;
            }
        }
        true
    }

    /// True iff the constraint admits some instant in `[begin, end]`.
    fn matches_interval(&self, begin: &Time, end: &Time) -> bool {
        if let Some(lower) = &self.lower {
            if end < lower {
                return false;
            }
        }
        if let Some(upper) = &self.upper {
            if begin >= upper {
                return false;
            }
        }
        true
    }

    fn sql(&self, column: &str) -> String {
        let mut parts = Vec::new();
        if let Some(lower) = &self.lower {
            parts.push(format!("{column} >= '{}'", lower.to_sql()));
        }
        if let Some(upper) = &self.upper {
            parts.push(format!("{column} < '{}'", upper.to_sql()));
        }
        match parts.len() {
            0 => "1".to_string(),
            1 => parts.pop().unwrap(),
            _ => format!("({})", parts.join(" AND ")),
        }
    }
}

/// Resolve symbolic day names through the runtime clock, else parse a
/// truncated datetime.
fn resolve_partial(s: &str) -> Result<PartialTime> {
    let day_offset = match s {
        "today" => Some(0i64),
        "yesterday" => Some(-1),
        "tomorrow" => Some(1),
        _ => None,
    };
    match day_offset {
        Some(offset) => {
            let now = Runtime::get().reference_time();
            let date = now
                .to_chrono()
                .ok_or_else(|| ArkiError::parse("reftime", "runtime clock out of range"))?
                .date()
                + chrono::Duration::days(offset);
            let t = Time::from_chrono(date.and_hms_opt(0, 0, 0).unwrap());
            Ok(PartialTime {
                ye: t.ye,
                mo: Some(t.mo),
                da: Some(t.da),
                ho: None,
                mi: None,
                se: None,
            })
        }
        None => PartialTime::parse(s),
    }
}

/// Conjunction of datetime constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchReftime {
    constraints: Vec<DtConstraint>,
}

impl MatchReftime {
    pub fn parse(pattern: &str) -> Result<MatchReftime> {
        let constraints: Vec<DtConstraint> = pattern
            .split(',')
            .filter(|tok| !tok.trim().is_empty())
            .map(DtConstraint::parse)
            .collect::<Result<_>>()?;
        if constraints.is_empty() {
            return Err(ArkiError::parse("reftime", "empty reftime pattern"));
        }
        Ok(MatchReftime { constraints })
    }

    pub fn matches(&self, t: &Time) -> bool {
        self.constraints.iter().all(|c| c.matches(t))
    }

    pub fn matches_interval(&self, begin: &Time, end: &Time) -> bool {
        self.constraints.iter().all(|c| c.matches_interval(begin, end))
    }

    /// Intersection of the constraints: greatest lower bound, least upper
    /// bound (exclusive).
    pub fn date_range(&self) -> (Option<Time>, Option<Time>) {
        let lower = self
            .constraints
            .iter()
            .filter_map(|c| c.lower)
            .max();
        let upper = self
            .constraints
            .iter()
            .filter_map(|c| c.upper)
            .min();
        (lower, upper)
    }

    pub fn sql(&self, column: &str) -> String {
        let parts: Vec<String> = self.constraints.iter().map(|c| c.sql(column)).collect();
        format!("({})", parts.join(" AND "))
    }
}

impl fmt::Display for MatchReftime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, c) in self.constraints.iter().enumerate() {
            if n > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}{}", c.op.as_str(), c.text)?;
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ye: i32, mo: u32, da: u32, ho: u32, mi: u32, se: u32) -> Time {
        Time::new(ye, mo, da, ho, mi, se)
    }

    #[test]
    fn test_year_bounds() {
        let m = MatchReftime::parse(">2006").unwrap();
        assert!(m.matches(&t(2007, 6, 5, 4, 3, 2)));
        assert!(!m.matches(&t(2006, 12, 31, 23, 59, 59)));

        let m = MatchReftime::parse(">2007").unwrap();
        assert!(!m.matches(&t(2007, 6, 5, 4, 3, 2)));
        assert!(m.matches(&t(2008, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn test_month_interval() {
        let m = MatchReftime::parse(">=2010-06,<2010-07").unwrap();
        assert!(m.matches(&t(2010, 6, 1, 0, 0, 0)));
        assert!(m.matches(&t(2010, 6, 30, 23, 59, 59)));
        assert!(!m.matches(&t(2010, 5, 31, 23, 59, 59)));
        assert!(!m.matches(&t(2010, 7, 1, 0, 0, 0)));
    }

    #[test]
    fn test_equality_expands_to_interval() {
        let m = MatchReftime::parse("=2007").unwrap();
        assert!(m.matches(&t(2007, 1, 1, 0, 0, 0)));
        assert!(m.matches(&t(2007, 12, 31, 23, 59, 59)));
        assert!(!m.matches(&t(2008, 1, 1, 0, 0, 0)));

        // Second precision: the interval is one instant.
        let m = MatchReftime::parse("=2010-06-01 12:00:00").unwrap();
        assert!(m.matches(&t(2010, 6, 1, 12, 0, 0)));
        assert!(!m.matches(&t(2010, 6, 1, 12, 0, 1)));
        assert!(!m.matches(&t(2010, 6, 1, 11, 59, 59)));
    }

    #[test]
    fn test_le_includes_whole_interval() {
        let m = MatchReftime::parse("<=2010-06").unwrap();
        assert!(m.matches(&t(2010, 6, 30, 23, 59, 59)));
        assert!(!m.matches(&t(2010, 7, 1, 0, 0, 0)));
    }

    #[test]
    fn test_interval_overlap() {
        let m = MatchReftime::parse("=2007").unwrap();
        assert!(m.matches_interval(&t(2006, 7, 1, 0, 0, 0), &t(2007, 2, 1, 0, 0, 0)));
        assert!(!m.matches_interval(&t(2005, 1, 1, 0, 0, 0), &t(2006, 12, 31, 23, 59, 59)));
    }

    #[test]
    fn test_date_range_intersection() {
        let m = MatchReftime::parse(">=2010-06,<2010-07").unwrap();
        assert_eq!(
            m.date_range(),
            (Some(t(2010, 6, 1, 0, 0, 0)), Some(t(2010, 7, 1, 0, 0, 0)))
        );
        let m = MatchReftime::parse(">=2007").unwrap();
        assert_eq!(m.date_range(), (Some(t(2007, 1, 1, 0, 0, 0)), None));
    }

    #[test]
    fn test_sql_fragment() {
        let m = MatchReftime::parse(">=2010-06,<2010-07").unwrap();
        assert_eq!(
            m.sql("reftime"),
            "(reftime >= '2010-06-01 00:00:00' AND reftime < '2010-07-01 00:00:00')"
        );
    }

    #[test]
    fn test_today_resolves_through_runtime() {
        let _guard = crate::runtime::TEST_CLOCK_LOCK.lock().unwrap();
        let rt = Runtime::get();
        rt.set_reference_time(Some(t(2009, 8, 1, 12, 30, 0)));
        let m = MatchReftime::parse("==today").unwrap();
        assert!(m.matches(&t(2009, 8, 1, 0, 0, 0)));
        assert!(m.matches(&t(2009, 8, 1, 23, 59, 59)));
        assert!(!m.matches(&t(2009, 8, 2, 0, 0, 0)));
        rt.set_reference_time(None);
    }

    #[test]
    fn test_display_roundtrip() {
        for text in [">=2010-06,<2010-07", "=2007", ">2006"] {
            let m = MatchReftime::parse(text).unwrap();
            let again = MatchReftime::parse(&m.to_string()).unwrap();
            assert_eq!(m, again, "via `{}`", m);
        }
    }

    #[test]
    fn test_bad_patterns() {
        assert!(MatchReftime::parse("").is_err());
        assert!(MatchReftime::parse(">=banana").is_err());
    }
}
