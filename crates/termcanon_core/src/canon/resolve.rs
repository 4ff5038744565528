//! Canonical label resolution over registry + blocklist.
//!
//! # Responsibility
//! - Answer "what is the canonical label for this raw term, and is it visible?"
//! - Match raw tag lists into deduplicated canonical labels.
//!
//! # Invariants
//! - A blocked input key always resolves to `Suppressed`.
//! - A blocked preferred term is never returned as a label; the input key
//!   labels itself instead.
//! - `match_many` keeps input order of first appearance per canonical label.

use crate::canon::blocklist::Blocklist;
use crate::canon::normalize::normalize;
use crate::canon::registry::SynonymRegistry;
use crate::model::term::{LabelSource, NormalizedKey, ResolvedTerm};
use log::trace;
use std::collections::HashSet;

/// Outcome of resolving one raw term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedTerm),
    /// The input key is blocked.
    Suppressed(NormalizedKey),
    /// The input key was never registered.
    Unknown(NormalizedKey),
}

impl Resolution {
    pub fn resolved(self) -> Option<ResolvedTerm> {
        match self {
            Self::Resolved(term) => Some(term),
            Self::Suppressed(_) | Self::Unknown(_) => None,
        }
    }
}

/// All mutable canonicalization state, guarded as one unit.
#[derive(Debug, Default)]
pub struct CanonState {
    pub registry: SynonymRegistry,
    pub blocklist: Blocklist,
}

impl CanonState {
    pub fn new(registry: SynonymRegistry, blocklist: Blocklist) -> Self {
        Self {
            registry,
            blocklist,
        }
    }

    /// Normalizes `raw` and resolves it.
    pub fn resolve(&self, raw: &str) -> Resolution {
        self.resolve_key(&normalize(raw))
    }

    /// Resolves an already normalized key.
    pub fn resolve_key(&self, key: &NormalizedKey) -> Resolution {
        if self.blocklist.is_blocked(key) {
            return Resolution::Suppressed(key.clone());
        }
        let Ok(cluster) = self.registry.resolve_cluster(key) else {
            return Resolution::Unknown(key.clone());
        };

        let preferred = self
            .registry
            .preferred_term_of(key)
            .ok()
            .flatten()
            .filter(|preferred| !self.blocklist.is_blocked(preferred));
        let (canonical, source) = match preferred {
            Some(preferred) => (preferred, LabelSource::Preferred),
            None => (key.clone(), LabelSource::Fallback),
        };
        let display_name = self
            .registry
            .display_name(&canonical)
            .unwrap_or_else(|| canonical.as_str())
            .to_string();
        trace!(
            "event=resolve module=canon status=ok cluster={} source={:?}",
            cluster.index(),
            source
        );

        Resolution::Resolved(ResolvedTerm {
            canonical,
            key: key.clone(),
            source,
            display_name,
        })
    }

    /// Resolves each raw term, dropping suppressed and unknown inputs and
    /// deduplicating by canonical label.
    pub fn match_many<S: AsRef<str>>(&self, raw_terms: &[S]) -> Vec<ResolvedTerm> {
        let mut seen = HashSet::new();
        raw_terms
            .iter()
            .filter_map(|raw| self.resolve(raw.as_ref()).resolved())
            .filter(|term| seen.insert(term.canonical.clone()))
            .collect()
    }
}
