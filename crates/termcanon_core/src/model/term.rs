//! Term domain model.
//!
//! # Responsibility
//! - Define normalized term keys and the stable term identity.
//! - Provide the read model returned by registry lookups.
//!
//! # Invariants
//! - `NormalizedKey` values are only produced by the normalizer or by
//!   storage decoding that re-checks normalization.
//! - Raw spellings attached to a term normalize to that term's key.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a registered term.
///
/// Assigned on first registration and persisted with the term row.
pub type TermId = Uuid;

/// Canonical string form used for term equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    /// Wraps a value that is already known to be normalized.
    pub(crate) fn from_normalized(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for NormalizedKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NormalizedKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Read model for one registered term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    /// Stable term id.
    pub id: TermId,
    /// Normalized key shared by all spellings.
    pub key: NormalizedKey,
    /// Raw display spellings in registration order.
    pub spellings: Vec<String>,
}

impl Term {
    /// Preferred human-facing spelling: the first registered one, or the key.
    pub fn display_name(&self) -> &str {
        self.spellings
            .first()
            .map(String::as_str)
            .unwrap_or_else(|| self.key.as_str())
    }
}

/// Where a resolved canonical label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// The cluster has an explicit preferred term.
    Preferred,
    /// No usable preferred term; the key labels itself.
    Fallback,
    /// Unregistered input passed through as free text.
    FreeText,
}

/// Result of resolving one raw term to its canonical label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTerm {
    /// Canonical label used for deduplication and display ordering.
    pub canonical: NormalizedKey,
    /// Normalized form of the caller's input.
    pub key: NormalizedKey,
    /// Whether the label comes from a designation or the fallback.
    pub source: LabelSource,
    /// Display spelling of the canonical term.
    pub display_name: String,
}

impl ResolvedTerm {
    pub fn is_preferred(&self) -> bool {
        self.source == LabelSource::Preferred
    }
}

#[cfg(test)]
mod tests {
    use super::{NormalizedKey, Term};
    use uuid::Uuid;

    #[test]
    fn display_name_falls_back_to_key() {
        let term = Term {
            id: Uuid::new_v4(),
            key: NormalizedKey::from_normalized("rust".to_string()),
            spellings: Vec::new(),
        };
        assert_eq!(term.display_name(), "rust");
    }

    #[test]
    fn display_name_prefers_first_spelling() {
        let term = Term {
            id: Uuid::new_v4(),
            key: NormalizedKey::from_normalized("reactjs".to_string()),
            spellings: vec!["React.js".to_string(), "ReactJS".to_string()],
        };
        assert_eq!(term.display_name(), "React.js");
    }
}
