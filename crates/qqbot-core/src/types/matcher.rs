//! Command matchers.

use regex::Regex;
use std::fmt;

/// How a command recognises a message.
///
/// Literal matching is a case-sensitive substring test against the raw
/// content, not token-bounded. Regex matching is a search, not a full match.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Any of these substrings.
    Literal(Vec<String>),
    /// A regex search.
    Regex(Regex),
}

impl Matcher {
    /// Literal matcher over one or more command words.
    pub fn literal<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut words: Vec<String> = Vec::new();
        for word in commands.into_iter().map(Into::into) {
            if !word.is_empty() && !words.contains(&word) {
                words.push(word);
            }
        }
        Self::Literal(words)
    }

    /// Regex matcher.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    /// Whether this is a literal matcher.
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Test the raw message content.
    pub fn matches(&self, content: &str) -> bool {
        match self {
            Self::Literal(words) => words.iter().any(|w| content.contains(w.as_str())),
            Self::Regex(re) => re.is_match(content),
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Eq for Matcher {}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(words) => write!(f, "literal{:?}", words),
            Self::Regex(re) => write!(f, "regex({})", re.as_str()),
        }
    }
}

impl From<&str> for Matcher {
    fn from(command: &str) -> Self {
        Self::literal([command])
    }
}

impl From<String> for Matcher {
    fn from(command: String) -> Self {
        Self::literal([command])
    }
}

impl From<Regex> for Matcher {
    fn from(re: Regex) -> Self {
        Self::Regex(re)
    }
}
