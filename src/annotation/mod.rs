//! Gene-ontology annotation mapping
//!
//! The mapping is built once by [`AnnotationLoader`] before any worker
//! starts and is only ever read afterwards, so workers share it by plain
//! reference without locking.

pub mod loader;
pub mod slim;

pub use loader::AnnotationLoader;
pub use slim::write_term_lists;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which annotation column defines partition membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "column", rename_all = "snake_case")]
pub enum GroupingKey {
    /// Labels come from the named column
    Column(String),
    /// Labels come from the last column of each file
    LastColumn,
    /// Every row of a file belongs to one term named after the file stem
    FileStem,
}

impl Default for GroupingKey {
    fn default() -> Self {
        GroupingKey::LastColumn
    }
}

impl std::str::FromStr for GroupingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err("grouping key must not be empty".to_string()),
            "@last" => Ok(GroupingKey::LastColumn),
            "@file" => Ok(GroupingKey::FileStem),
            column => Ok(GroupingKey::Column(column.to_string())),
        }
    }
}

/// A term label together with the grouping key it was selected under
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GoTerm {
    pub label: String,
    pub key: String,
}

impl GoTerm {
    pub fn new(label: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for GoTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Identifier → terms, with terms kept in first-seen order per identifier.
///
/// Terms are distinct by label: a label already held by an identifier is not
/// added again under another key. An identifier with an empty term set is
/// treated exactly like an absent one: it is unassigned.
#[derive(Debug, Clone, Default)]
pub struct AnnotationMapping {
    entries: IndexMap<String, IndexSet<GoTerm>>,
}

impl AnnotationMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from `(identifier, labels)` pairs under one key
    pub fn from_entries<I, S, L>(key: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<L>)>,
        S: Into<String>,
        L: Into<String>,
    {
        let mut mapping = Self::new();
        for (id, labels) in entries {
            let id = id.into();
            mapping.ensure(&id);
            for label in labels {
                mapping.insert(&id, GoTerm::new(label, key));
            }
        }
        mapping
    }

    pub(crate) fn ensure(&mut self, id: &str) {
        if !self.entries.contains_key(id) {
            self.entries.insert(id.to_string(), IndexSet::new());
        }
    }

    pub(crate) fn insert(&mut self, id: &str, term: GoTerm) {
        match self.entries.get_mut(id) {
            Some(terms) => {
                if !terms.iter().any(|t| t.label == term.label) {
                    terms.insert(term);
                }
            }
            None => {
                self.entries.insert(id.to_string(), IndexSet::from([term]));
            }
        }
    }

    /// Terms for an identifier, or `None` when it is unassigned
    pub fn terms(&self, id: &str) -> Option<&IndexSet<GoTerm>> {
        self.entries.get(id).filter(|terms| !terms.is_empty())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.terms(id).is_some()
    }

    /// Number of identifiers seen, including those without terms
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every distinct term label, sorted
    pub fn labels(&self) -> BTreeSet<&str> {
        self.entries
            .values()
            .flat_map(|terms| terms.iter().map(|t| t.label.as_str()))
            .collect()
    }
}
