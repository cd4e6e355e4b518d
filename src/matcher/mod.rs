//! Query matchers.
//!
//! A matcher is a conjunction of per-type disjunctions:
//! `origin:GRIB1,200 or GRIB1,80; reftime:>=2007`. The part before `:`
//! names the item type; the rest is style-specific syntax parsed by that
//! type's matcher. Aliases from the alias database expand recursively.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ArkiError, Result};
use crate::metadata::Metadata;
use crate::runtime::Runtime;
use crate::types::{Code, Item, Time};

pub mod aliases;
pub mod area;
pub mod level;
pub mod origin;
pub mod proddef;
pub mod product;
pub mod quantity;
pub mod reftime;
pub mod run;
pub mod task;
pub mod timerange;

pub use aliases::AliasDatabase;

// ── Per-type dispatch ──────────────────────────────────────────────

/// One parsed alternative of a per-type clause.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemMatch {
    Origin(origin::MatchOrigin),
    Product(product::MatchProduct),
    Level(level::MatchLevel),
    Timerange(timerange::MatchTimerange),
    Reftime(reftime::MatchReftime),
    Area(area::MatchArea),
    Proddef(proddef::MatchProddef),
    Run(run::MatchRun),
    Quantity(quantity::MatchQuantity),
    Task(task::MatchTask),
}

impl ItemMatch {
    /// Dispatch table from type code to the per-type parser.
    pub fn parse(code: Code, expr: &str) -> Result<ItemMatch> {
        match code {
            Code::Origin => Ok(ItemMatch::Origin(origin::MatchOrigin::parse(expr)?)),
            Code::Product => Ok(ItemMatch::Product(product::MatchProduct::parse(expr)?)),
            Code::Level => Ok(ItemMatch::Level(level::MatchLevel::parse(expr)?)),
            Code::Timerange => Ok(ItemMatch::Timerange(timerange::MatchTimerange::parse(
                expr,
            )?)),
            Code::Reftime => Ok(ItemMatch::Reftime(reftime::MatchReftime::parse(expr)?)),
            Code::Area => Ok(ItemMatch::Area(area::MatchArea::parse(expr)?)),
            Code::Proddef => Ok(ItemMatch::Proddef(proddef::MatchProddef::parse(expr)?)),
            Code::Run => Ok(ItemMatch::Run(run::MatchRun::parse(expr)?)),
            Code::Quantity => Ok(ItemMatch::Quantity(quantity::MatchQuantity::parse(expr)?)),
            Code::Task => Ok(ItemMatch::Task(task::MatchTask::parse(expr)?)),
            other => Err(ArkiError::parse(
                "matcher",
                format!("queries cannot match on `{}`", other.name()),
            )),
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        match (self, item) {
            (ItemMatch::Origin(m), Item::Origin(v)) => m.matches(v),
            (ItemMatch::Product(m), Item::Product(v)) => m.matches(v),
            (ItemMatch::Level(m), Item::Level(v)) => m.matches(v),
            (ItemMatch::Timerange(m), Item::Timerange(v)) => m.matches(v),
            (ItemMatch::Reftime(m), Item::Reftime(v)) => {
                let (begin, end) = v.interval();
                m.matches_interval(&begin, &end)
            }
            (ItemMatch::Area(m), Item::Area(v)) => m.matches(v),
            (ItemMatch::Proddef(m), Item::Proddef(v)) => m.matches(v),
            (ItemMatch::Run(m), Item::Run(v)) => m.matches(v),
            (ItemMatch::Quantity(m), Item::Quantity(v)) => m.matches(v),
            (ItemMatch::Task(m), Item::Task(v)) => m.matches(v),
            _ => false,
        }
    }
}

impl fmt::Display for ItemMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemMatch::Origin(m) => m.fmt(f),
            ItemMatch::Product(m) => m.fmt(f),
            ItemMatch::Level(m) => m.fmt(f),
            ItemMatch::Timerange(m) => m.fmt(f),
            ItemMatch::Reftime(m) => m.fmt(f),
            ItemMatch::Area(m) => m.fmt(f),
            ItemMatch::Proddef(m) => m.fmt(f),
            ItemMatch::Run(m) => m.fmt(f),
            ItemMatch::Quantity(m) => m.fmt(f),
            ItemMatch::Task(m) => m.fmt(f),
        }
    }
}

// ── Per-type clause (OR of alternatives) ───────────────────────────

#[derive(Debug, Clone)]
pub struct OrMatcher {
    code: Code,
    /// The clause text as written, for `to_string` round-tripping.
    raw: String,
    alternatives: Vec<ItemMatch>,
}

impl OrMatcher {
    pub fn code(&self) -> Code {
        self.code
    }

    pub fn alternatives(&self) -> &[ItemMatch] {
        &self.alternatives
    }

    pub fn matches_item(&self, item: &Item) -> bool {
        self.alternatives.iter().any(|alt| alt.matches(item))
    }

    /// For reftime clauses: true iff some alternative admits an instant in
    /// `[begin, end]`.
    pub fn matches_interval(&self, begin: &Time, end: &Time) -> bool {
        self.alternatives.iter().any(|alt| match alt {
            ItemMatch::Reftime(m) => m.matches_interval(begin, end),
            _ => false,
        })
    }

    /// Union of the alternatives' date ranges; `None` bounds mean unbounded.
    pub fn date_range(&self) -> (Option<Time>, Option<Time>) {
        let mut lower: Option<Time> = None;
        let mut upper: Option<Time> = None;
        let mut lower_open = false;
        let mut upper_open = false;
        for alt in &self.alternatives {
            if let ItemMatch::Reftime(m) = alt {
                let (alt_lower, alt_upper) = m.date_range();
                match alt_lower {
                    None => lower_open = true,
                    Some(t) => lower = Some(lower.map_or(t, |c| c.min(t))),
                }
                match alt_upper {
                    None => upper_open = true,
                    Some(t) => upper = Some(upper.map_or(t, |c| c.max(t))),
                }
            }
        }
        (
            if lower_open { None } else { lower },
            if upper_open { None } else { upper },
        )
    }

    /// SQL over an ISO-8601 text column, for reftime clauses.
    pub fn reftime_sql(&self, column: &str) -> Option<String> {
        let parts: Vec<String> = self
            .alternatives
            .iter()
            .filter_map(|alt| match alt {
                ItemMatch::Reftime(m) => Some(m.sql(column)),
                _ => None,
            })
            .collect();
        match parts.len() {
            0 => None,
            1 => Some(parts.into_iter().next().unwrap()),
            _ => Some(format!("({})", parts.join(" OR "))),
        }
    }

    /// The clause with aliases expanded.
    pub fn to_string_expanded(&self) -> String {
        let alts: Vec<String> = self.alternatives.iter().map(|a| a.to_string()).collect();
        format!("{}:{}", self.code.name(), alts.join(" or "))
    }
}

impl fmt::Display for OrMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.code.name(), self.raw)
    }
}

// ── Matcher ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Matcher {
    clauses: BTreeMap<Code, OrMatcher>,
}

impl Matcher {
    /// A matcher with no clauses; it matches everything.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Parse using the process-wide alias database.
    pub fn parse(s: &str) -> Result<Matcher> {
        Runtime::get().with_aliases(|aliases| Matcher::parse_with_aliases(s, aliases))
    }

    pub fn parse_with_aliases(s: &str, aliases: &AliasDatabase) -> Result<Matcher> {
        let mut clauses = BTreeMap::new();
        for part in s.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, expr) = part.split_once(':').ok_or_else(|| {
                ArkiError::parse("matcher", format!("missing `:` after type name in `{part}`"))
            })?;
            let code = Code::from_name(name)?;
            if clauses.contains_key(&code) {
                return Err(ArkiError::parse(
                    "matcher",
                    format!("type `{}` appears in more than one clause", code.name()),
                ));
            }
            let mut alternatives = Vec::new();
            for alt in expr.split(" or ") {
                expand_and_parse(code, alt.trim(), aliases, 0, &mut alternatives)?;
            }
            clauses.insert(
                code,
                OrMatcher {
                    code,
                    raw: normalize_ws(expr),
                    alternatives,
                },
            );
        }
        Ok(Matcher { clauses })
    }

    pub fn clauses(&self) -> impl Iterator<Item = &OrMatcher> {
        self.clauses.values()
    }

    pub fn clause(&self, code: Code) -> Option<&OrMatcher> {
        self.clauses.get(&code)
    }

    /// True iff every clause matches the corresponding item. A clause whose
    /// type is absent from the metadata fails.
    pub fn matches(&self, md: &Metadata) -> bool {
        self.clauses.values().all(|clause| match md.get(clause.code()) {
            Some(item) => clause.matches_item(item),
            None => false,
        })
    }

    /// True iff the summary may contain matching data.
    pub fn matches_summary(&self, summary: &crate::summary::Summary) -> bool {
        summary.matches(self)
    }

    /// Reference time bounds implied by the reftime clause, used to prune
    /// segments and drive the summary cache.
    pub fn date_range(&self) -> (Option<Time>, Option<Time>) {
        match self.clauses.get(&Code::Reftime) {
            Some(clause) => clause.date_range(),
            None => (None, None),
        }
    }

    /// True if the matcher constrains nothing but the reference time.
    pub fn is_reftime_only(&self) -> bool {
        self.clauses.keys().all(|code| *code == Code::Reftime)
    }

    pub fn to_string_expanded(&self) -> String {
        let parts: Vec<String> = self
            .clauses
            .values()
            .map(|c| c.to_string_expanded())
            .collect();
        parts.join("; ")
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.clauses.values().map(|c| c.to_string()).collect();
        f.write_str(&parts.join("; "))
    }
}

/// Expand `alt` through the alias database (recursively, bounded depth) and
/// parse the resulting concrete alternatives.
fn expand_and_parse(
    code: Code,
    alt: &str,
    aliases: &AliasDatabase,
    depth: usize,
    out: &mut Vec<ItemMatch>,
) -> Result<()> {
    if depth > aliases::MAX_DEPTH {
        return Err(ArkiError::parse(
            "matcher",
            format!("alias expansion deeper than {} levels (cycle?)", aliases::MAX_DEPTH),
        ));
    }
    if let Some(expansion) = aliases.get(code, alt) {
        for sub in expansion.split(" or ") {
            expand_and_parse(code, sub.trim(), aliases, depth + 1, out)?;
        }
        return Ok(());
    }
    // Not an alias: parse as concrete syntax. A bare lowercase word that is
    // not valid syntax is reported as an unknown alias.
    match ItemMatch::parse(code, alt) {
        Ok(parsed) => {
            out.push(parsed);
            Ok(())
        }
        Err(e) => {
            if looks_like_alias(alt) {
                Err(ArkiError::parse(
                    "matcher",
                    format!("unknown {} alias `{alt}`", code.name()),
                ))
            } else {
                Err(e)
            }
        }
    }
}

fn looks_like_alias(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Shared helpers for per-type matchers ───────────────────────────

/// Comma-separated optional integer fields: an empty slot is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct OptList {
    vals: Vec<Option<u32>>,
}

impl OptList {
    pub fn parse(what: &'static str, s: &str) -> Result<OptList> {
        let mut vals = Vec::new();
        if !s.trim().is_empty() {
            for tok in s.split(',') {
                let tok = tok.trim();
                if tok.is_empty() {
                    vals.push(None);
                } else {
                    vals.push(Some(tok.parse::<u32>().map_err(|_| {
                        ArkiError::parse(what, format!("`{tok}` is not an integer"))
                    })?));
                }
            }
        }
        while vals.last() == Some(&None) {
            vals.pop();
        }
        Ok(OptList { vals })
    }

    /// Every defined expectation must equal the corresponding actual value.
    pub fn matches(&self, actual: &[Option<u32>]) -> bool {
        self.vals.iter().enumerate().all(|(n, expect)| match expect {
            None => true,
            Some(v) => actual.get(n).copied().flatten() == Some(*v),
        })
    }

    /// Render after a style name: `GRIB1,200,,130`.
    pub fn fmt_after(&self, style: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(style)?;
        for v in &self.vals {
            match v {
                Some(v) => write!(f, ",{v}")?,
                None => f.write_str(",")?,
            }
        }
        Ok(())
    }
}

/// Split a per-type pattern into the style name and the remaining fields:
/// `GRIB1,200,,130` → (`GRIB1`, `200,,130`).
pub(crate) fn split_style(pattern: &str) -> (&str, &str) {
    match pattern.find(',') {
        Some(pos) => (pattern[..pos].trim(), &pattern[pos + 1..]),
        None => (pattern.trim(), ""),
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Origin, Product, Reftime, Run};

    fn sample_md() -> Metadata {
        let mut md = Metadata::new();
        md.set(Origin::grib1(Some(200), Some(0), Some(101)));
        md.set(Product::grib1(Some(200), Some(140), Some(229)));
        md.set(Reftime::position(Time::new(2007, 6, 5, 4, 3, 2)));
        md.set(Run::minute(12, 0));
        md
    }

    #[test]
    fn test_conjunction_of_clauses() {
        let md = sample_md();
        assert!(Matcher::parse("origin:GRIB1,200").unwrap().matches(&md));
        assert!(Matcher::parse("origin:GRIB1,200; run:MINUTE,12")
            .unwrap()
            .matches(&md));
        assert!(!Matcher::parse("origin:GRIB1,200; run:MINUTE,13")
            .unwrap()
            .matches(&md));
        assert!(!Matcher::parse("origin:GRIB1,80").unwrap().matches(&md));
    }

    #[test]
    fn test_or_alternatives() {
        let md = sample_md();
        let m = Matcher::parse("origin:GRIB1,80 or GRIB1,200").unwrap();
        assert!(m.matches(&md));
    }

    #[test]
    fn test_clause_on_absent_type_fails() {
        let md = sample_md();
        assert!(!Matcher::parse("area:GRIB:type=255").unwrap().matches(&md));
    }

    #[test]
    fn test_empty_matcher_matches_everything() {
        assert!(Matcher::empty().matches(&sample_md()));
        assert!(Matcher::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_reftime_scenarios() {
        let md = sample_md();
        assert!(Matcher::parse("reftime:>2006").unwrap().matches(&md));
        assert!(!Matcher::parse("reftime:>2007").unwrap().matches(&md));

        let june = Matcher::parse("reftime:>=2010-06,<2010-07").unwrap();
        let mut in_june = sample_md();
        in_june.set(Reftime::position(Time::new(2010, 6, 15, 0, 0, 0)));
        let mut in_july = sample_md();
        in_july.set(Reftime::position(Time::new(2010, 7, 1, 0, 0, 0)));
        let mut in_may = sample_md();
        in_may.set(Reftime::position(Time::new(2010, 5, 31, 23, 59, 59)));
        assert!(june.matches(&in_june));
        assert!(!june.matches(&in_july));
        assert!(!june.matches(&in_may));
    }

    #[test]
    fn test_to_string_roundtrip() {
        let text = "origin:GRIB1,200 or GRIB1,80; reftime:>=2007";
        let m = Matcher::parse(text).unwrap();
        let rendered = m.to_string();
        let again = Matcher::parse(&rendered).unwrap();
        assert_eq!(again.to_string(), rendered);
        assert!(rendered.contains("origin:GRIB1,200 or GRIB1,80"));
    }

    #[test]
    fn test_duplicate_clause_rejected() {
        assert!(Matcher::parse("origin:GRIB1,1; origin:GRIB1,2").is_err());
    }

    #[test]
    fn test_aliases_expand_recursively() {
        let cfg = crate::config::ConfigFile::parse(
            "[origin]\narpa = GRIB1,200\nmain = arpa or GRIB1,80\n",
        )
        .unwrap();
        let aliases = AliasDatabase::from_config(&cfg).unwrap();
        let m = Matcher::parse_with_aliases("origin:main", &aliases).unwrap();
        assert!(m.matches(&sample_md()));
        assert_eq!(m.to_string(), "origin:main");
        assert_eq!(
            m.to_string_expanded(),
            "origin:GRIB1,200 or GRIB1,80"
        );

        let err = Matcher::parse_with_aliases("origin:nosuch", &aliases).unwrap_err();
        assert!(err.to_string().contains("unknown origin alias"));
    }

    #[test]
    fn test_alias_cycle_detected() {
        let cfg =
            crate::config::ConfigFile::parse("[origin]\na = b\nb = a\n").unwrap();
        let aliases = AliasDatabase::from_config(&cfg).unwrap();
        let err = Matcher::parse_with_aliases("origin:a", &aliases).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_date_range() {
        let m = Matcher::parse("reftime:>=2010-06,<2010-07").unwrap();
        let (lower, upper) = m.date_range();
        assert_eq!(lower, Some(Time::new(2010, 6, 1, 0, 0, 0)));
        assert_eq!(upper, Some(Time::new(2010, 7, 1, 0, 0, 0)));

        let unbounded = Matcher::parse("origin:GRIB1,200").unwrap();
        assert_eq!(unbounded.date_range(), (None, None));
    }

    #[test]
    fn test_is_reftime_only() {
        assert!(Matcher::parse("reftime:=2007").unwrap().is_reftime_only());
        assert!(Matcher::empty().is_reftime_only());
        assert!(!Matcher::parse("origin:GRIB1,200; reftime:=2007")
            .unwrap()
            .is_reftime_only());
    }

    #[test]
    fn test_optlist() {
        let l = OptList::parse("t", "200,,130").unwrap();
        assert!(l.matches(&[Some(200), Some(0), Some(130)]));
        assert!(l.matches(&[Some(200), None, Some(130)]));
        assert!(!l.matches(&[Some(200), Some(0), Some(131)]));
        assert!(!l.matches(&[None, Some(0), Some(130)]));
        // Shorter queries are prefixes with wildcards.
        let short = OptList::parse("t", "200").unwrap();
        assert!(short.matches(&[Some(200), Some(1), Some(2)]));
        assert!(OptList::parse("t", "banana").is_err());
    }
}
