//! Name allow/deny lists
//!
//! Both resolution and crawling can be restricted to a set of ArNS names. A list is
//! either unset, the wildcard `*`, or an explicit comma-separated set of names.

use serde::Deserialize;
use std::fmt;

/// One allow-list or deny-list value
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum NameFilter {
    /// No list configured
    #[default]
    Unset,

    /// `*`: every name
    All,

    /// An explicit set of names
    Names(Vec<String>),
}

impl NameFilter {
    /// Parses a raw list value
    ///
    /// Blank input is `Unset`, `*` is `All`, anything else is split on commas with
    /// whitespace trimmed and empty items dropped. A list with no remaining items is
    /// treated as `Unset`.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() {
            return Self::Unset;
        }
        if value == "*" {
            return Self::All;
        }

        let names: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        if names.is_empty() {
            Self::Unset
        } else {
            Self::Names(names)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl From<String> for NameFilter {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl fmt::Display for NameFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "none"),
            Self::All => write!(f, "*"),
            Self::Names(names) => write!(f, "{}", names.join(",")),
        }
    }
}

/// An allow-list and deny-list applied together
#[derive(Debug, Clone, Copy)]
pub struct NameFilters<'a> {
    pub allow: &'a NameFilter,
    pub deny: &'a NameFilter,
}

impl<'a> NameFilters<'a> {
    pub fn new(allow: &'a NameFilter, deny: &'a NameFilter) -> Self {
        Self { allow, deny }
    }

    /// True when the deny-list excludes everything
    pub fn denies_all(&self) -> bool {
        self.deny.is_all()
    }
}
