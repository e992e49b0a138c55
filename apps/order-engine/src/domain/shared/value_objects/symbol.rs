//! Symbol value object for instrument identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An equity ticker, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new Symbol.
    ///
    /// Surrounding whitespace is dropped and the ticker is uppercased.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_uppercase())
    }

    /// Get the symbol string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the ticker is blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_is_uppercased() {
        assert_eq!(Symbol::new("aapl").as_str(), "AAPL");
        assert_eq!(Symbol::from(" msft ").as_str(), "MSFT");
    }

    #[test]
    fn blank_symbol_is_empty() {
        assert!(Symbol::new("   ").is_empty());
        assert!(!Symbol::new("SPY").is_empty());
    }
}
