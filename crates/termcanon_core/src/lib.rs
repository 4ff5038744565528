//! Core domain logic for term canonicalization.
//! This crate is the single source of truth for synonym and blocklist invariants.

pub mod canon;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use canon::{normalize, Blocklist, LinkOutcome, RegistryError, Resolution, SynonymRegistry};
pub use config::{CanonConfig, ConfigError};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::term::{LabelSource, NormalizedKey, ResolvedTerm, Term, TermId};
pub use repo::term_repo::{RepoError, RepoResult, SqliteTermRepository, TermRepository};
pub use service::canon_service::{CanonError, CanonResult, TermCanon};
pub use service::suggestion_service::{
    GroupCatalog, SkillSuggestionsData, StaticGroupCatalog, SuggestionError, SuggestionItem,
    SuggestionQuery, SuggestionsResponse, UsageSignal,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
