//! Run matcher: `MINUTE,hh[:mm]`.

use std::fmt;

use crate::error::{ArkiError, Result};
use crate::matcher::split_style;
use crate::types::Run;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchRun {
    Minute { minute: Option<u32> },
}

impl MatchRun {
    pub fn parse(pattern: &str) -> Result<MatchRun> {
        let (style, rest) = split_style(pattern);
        if style != "MINUTE" {
            return Err(ArkiError::parse(
                "run",
                format!("unsupported run style `{style}`"),
            ));
        }
        let rest = rest.trim();
        if rest.is_empty() {
            return Ok(MatchRun::Minute { minute: None });
        }
        let minute = match rest.split_once(':') {
            Some((hour, min)) => {
                parse_num(hour)? * 60 + parse_num(min)?
            }
            None => parse_num(rest)? * 60,
        };
        Ok(MatchRun::Minute {
            minute: Some(minute),
        })
    }

    pub fn matches(&self, run: &Run) -> bool {
        let MatchRun::Minute { minute: want } = self;
        let Run::Minute { minute } = run;
        want.map_or(true, |w| w == *minute)
    }
}

fn parse_num(s: &str) -> Result<u32> {
    s.trim()
        .parse::<u32>()
        .map_err(|_| ArkiError::parse("run", format!("`{s}` is not a number")))
}

impl fmt::Display for MatchRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let MatchRun::Minute { minute } = self;
        match minute {
            Some(m) => write!(f, "MINUTE,{:02}:{:02}", m / 60, m % 60),
            None => f.write_str("MINUTE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_and_minute_forms() {
        let run = Run::minute(12, 0);
        assert!(MatchRun::parse("MINUTE").unwrap().matches(&run));
        assert!(MatchRun::parse("MINUTE,12").unwrap().matches(&run));
        assert!(MatchRun::parse("MINUTE,12:00").unwrap().matches(&run));
        assert!(!MatchRun::parse("MINUTE,13").unwrap().matches(&run));
        assert!(!MatchRun::parse("MINUTE,12:01").unwrap().matches(&run));
    }
}
