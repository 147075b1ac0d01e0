use std::fmt;

use serde::{Deserialize, Serialize};

/// A substring matched against a process's full command line. Patterns are
/// configuration-owned; ordering between patterns is irrelevant.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NamePattern(String);

impl NamePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        NamePattern(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, command_line: &str) -> bool {
        command_line.contains(&self.0)
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NamePattern {
    fn from(pattern: &str) -> Self {
        NamePattern::new(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_substring_anywhere_in_command() {
        let pattern = NamePattern::new("job-x");
        assert!(pattern.matches("/usr/local/bin/job-x --verbose"));
        assert!(pattern.matches("bash -c 'exec job-x'"));
        assert!(!pattern.matches("/usr/local/bin/job-y"));
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let pattern = NamePattern::new("Job-X");
        assert!(!pattern.matches("/usr/bin/job-x"));
    }

    #[test]
    fn test_serde_transparent_round_trip() {
        let pattern = NamePattern::new("bash test");
        let encoded = serde_json::to_string(&pattern).unwrap();
        assert_eq!(encoded, "\"bash test\"");

        let decoded: NamePattern = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, pattern);
    }
}
