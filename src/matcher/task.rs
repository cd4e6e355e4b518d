//! Task matcher: case-insensitive substring.

use std::fmt;

use crate::error::{ArkiError, Result};
use crate::types::Task;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchTask {
    pattern: String,
}

impl MatchTask {
    pub fn parse(pattern: &str) -> Result<MatchTask> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(ArkiError::parse("task", "empty task pattern"));
        }
        Ok(MatchTask {
            pattern: pattern.to_string(),
        })
    }

    pub fn matches(&self, task: &Task) -> bool {
        task.name
            .to_ascii_lowercase()
            .contains(&self.pattern.to_ascii_lowercase())
    }
}

impl fmt::Display for MatchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_case_insensitive() {
        let task = Task::new("ZZZ Volume Scan");
        assert!(MatchTask::parse("volume").unwrap().matches(&task));
        assert!(MatchTask::parse("ZZZ").unwrap().matches(&task));
        assert!(!MatchTask::parse("doppler").unwrap().matches(&task));
    }
}
