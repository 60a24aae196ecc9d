use crate::cache;
use crate::matcher::canonical::canonicalize;
use crate::matcher::errors::MatcherError;
use regex::{Captures, Regex};
use std::collections::HashMap;

/// A single regex match with its capture groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Byte range of the entire match
    pub byte_start: usize,
    pub byte_end: usize,
    /// The matched text
    pub text: String,
    /// Positional groups, index 0 is group 1. Unmatched optional groups are `None`.
    pub groups: Vec<Option<String>>,
    /// Named groups that participated in the match: name -> text
    pub named: HashMap<String, String>,
}

impl PatternMatch {
    pub(crate) fn from_captures(regex: &Regex, caps: &Captures<'_>) -> Self {
        let whole = caps.get(0).expect("group 0 is always present in a match");
        let groups = (1..caps.len())
            .map(|i| caps.get(i).map(|m| m.as_str().to_string()))
            .collect();
        let named = regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();

        Self {
            byte_start: whole.start(),
            byte_end: whole.end(),
            text: whole.as_str().to_string(),
            groups,
            named,
        }
    }

    /// Positional capture group, 1-based like `$1`.
    pub fn group(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return Some(&self.text);
        }
        self.groups.get(index - 1)?.as_deref()
    }

    /// Named capture group.
    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }
}

/// Compiled pattern used by finds and replacements.
///
/// # Example Patterns
///
/// ```text
/// a\+b                          // literal arithmetic
/// \i\.track\((\i)\)             // any `x.track(y)` call, capturing y
/// (?<store>\i)\.getState\(\)    // named capture
/// ```
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    source: String,
    regex: Regex,
}

impl PatternMatcher {
    /// Compile a pattern, expanding the `\i` shorthand first.
    pub fn new(pattern: &str) -> Result<Self, MatcherError> {
        let expanded = canonicalize(pattern);
        let regex = cache::get_or_compile(&expanded).map_err(|e| MatcherError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Matcher for an exact piece of text.
    pub fn literal(text: &str) -> Self {
        let escaped = regex::escape(text);
        let regex = cache::get_or_compile(&escaped).expect("escaped literal is always valid");
        Self {
            source: escaped,
            regex,
        }
    }

    /// The pattern as written, before `\i` expansion.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }

    /// First match, or `None`.
    pub fn find(&self, haystack: &str) -> Option<PatternMatch> {
        self.regex
            .captures(haystack)
            .map(|caps| PatternMatch::from_captures(&self.regex, &caps))
    }

    /// Every non-overlapping match, left to right.
    pub fn find_all(&self, haystack: &str) -> Vec<PatternMatch> {
        self.regex
            .captures_iter(haystack)
            .map(|caps| PatternMatch::from_captures(&self.regex, &caps))
            .collect()
    }
}
