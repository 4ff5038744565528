//! Suppressed term keys.
//!
//! # Invariants
//! - Blocking is a visibility filter only; cluster structure is untouched.
//! - `block` / `unblock` are idempotent and accept unregistered keys.

use crate::model::term::NormalizedKey;
use std::collections::BTreeSet;

/// Set of normalized keys that must never surface as a resolution.
#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    keys: BTreeSet<NormalizedKey>,
}

impl Blocklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks `key`. Returns `true` when the key was not blocked before.
    pub fn block(&mut self, key: NormalizedKey) -> bool {
        self.keys.insert(key)
    }

    /// Unblocks `key`. Returns `true` when the key was blocked before.
    pub fn unblock(&mut self, key: &NormalizedKey) -> bool {
        self.keys.remove(key)
    }

    pub fn is_blocked(&self, key: &NormalizedKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns blocked keys in sorted order.
    pub fn blocked_keys(&self) -> Vec<NormalizedKey> {
        self.keys.iter().cloned().collect()
    }
}

impl FromIterator<NormalizedKey> for Blocklist {
    fn from_iter<I: IntoIterator<Item = NormalizedKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Blocklist;
    use crate::canon::normalize;

    #[test]
    fn block_and_unblock_are_idempotent() {
        let mut blocklist = Blocklist::new();
        assert!(blocklist.block(normalize("Solidity")));
        assert!(!blocklist.block(normalize("solidity")));
        assert!(blocklist.is_blocked(&normalize("SOLIDITY")));

        assert!(blocklist.unblock(&normalize("solidity")));
        assert!(!blocklist.unblock(&normalize("solidity")));
        assert!(!blocklist.is_blocked(&normalize("solidity")));
    }

    #[test]
    fn blocked_keys_are_sorted() {
        let blocklist: Blocklist = ["zig", "ada", "cobol"].into_iter().map(normalize).collect();
        let keys: Vec<_> = blocklist
            .blocked_keys()
            .into_iter()
            .map(|key| key.into_string())
            .collect();
        assert_eq!(keys, vec!["ada", "cobol", "zig"]);
    }
}
