//! Canonicalization facade consumed by the transport layer.
//!
//! # Responsibility
//! - Expose term creation, synonym linking, blocking, tag matching and
//!   suggestion queries as use-case APIs.
//! - Own the shared canonicalization state behind one read-write lock.
//! - Flush changed clusters to the term store after each mutation.
//!
//! # Invariants
//! - Mutations run one at a time; readers never see a half-merged cluster.
//! - Storage I/O never happens while the state lock is held.
//! - Inputs are validated before any state changes.
//! - A `CanonError::Repo` means memory already holds the change but the store
//!   does not. Callers must retry the same call; every retry re-flushes the
//!   whole cluster.
//!
//! # Concurrency
//! - `TermCanon` is a cheap `Clone` handle; clones share one state.
//! - Writers take the store mutex first, then the state write lock, and
//!   release the state lock before persisting.

use crate::canon::normalize::normalize;
use crate::canon::registry::{
    ClusterSnapshot, LinkOutcome, PreferredChange, RegistryError, SynonymRegistry,
};
use crate::canon::resolve::{CanonState, Resolution};
use crate::canon::Blocklist;
use crate::config::CanonConfig;
use crate::model::term::{NormalizedKey, ResolvedTerm, Term, TermId};
use crate::repo::term_repo::{RepoError, TermRepository};
use crate::service::suggestion_service::{
    GroupCatalog, SkillSuggestionsData, StaticGroupCatalog, SuggestionError, SuggestionQuery,
    SuggestionService, SuggestionsResponse, UsageSignal,
};
use log::{error, info};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type CanonResult<T> = Result<T, CanonError>;

/// Facade error for canonicalization use-cases.
#[derive(Debug)]
pub enum CanonError {
    Registry(RegistryError),
    Suggestion(SuggestionError),
    /// The in-memory change committed but could not be persisted.
    Repo(RepoError),
}

impl Display for CanonError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry(err) => write!(f, "{err}"),
            Self::Suggestion(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "term store failure: {err}"),
        }
    }
}

impl Error for CanonError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(err) => Some(err),
            Self::Suggestion(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RegistryError> for CanonError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<SuggestionError> for CanonError {
    fn from(value: SuggestionError) -> Self {
        Self::Suggestion(value)
    }
}

impl From<RepoError> for CanonError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Storage work produced by one mutation.
enum Flush {
    Cluster(ClusterSnapshot),
    Blocked(Vec<NormalizedKey>),
    Unblocked(Vec<NormalizedKey>),
}

type SharedStore = Arc<Mutex<Option<Box<dyn TermRepository + Send>>>>;

/// Shared handle over canonicalization state.
#[derive(Clone)]
pub struct TermCanon {
    state: Arc<RwLock<CanonState>>,
    store: SharedStore,
    config: Arc<CanonConfig>,
    suggestions: SuggestionService,
    groups: Arc<dyn GroupCatalog>,
    usage: Option<Arc<dyn UsageSignal>>,
}

impl TermCanon {
    /// Creates an empty, memory-only handle.
    pub fn new(config: CanonConfig) -> Self {
        Self::from_parts(config, CanonState::default(), None)
    }

    /// Rebuilds state from `repo` and keeps it as the write-through store.
    pub fn open<R>(config: CanonConfig, repo: R) -> CanonResult<Self>
    where
        R: TermRepository + Send + 'static,
    {
        let stored = repo.load_state()?;
        let terms = stored.registry.terms.len();
        let registry = SynonymRegistry::restore(stored.registry)?;
        let blocklist: Blocklist = stored.blocked.into_iter().collect();
        info!(
            "event=canon_open module=service status=ok terms={} blocked={}",
            terms,
            blocklist.len()
        );
        Ok(Self::from_parts(
            config,
            CanonState::new(registry, blocklist),
            Some(Box::new(repo)),
        ))
    }

    fn from_parts(
        config: CanonConfig,
        state: CanonState,
        store: Option<Box<dyn TermRepository + Send>>,
    ) -> Self {
        Self {
            suggestions: SuggestionService::new(config.max_page_size),
            state: Arc::new(RwLock::new(state)),
            store: Arc::new(Mutex::new(store)),
            config: Arc::new(config),
            groups: Arc::new(StaticGroupCatalog::new()),
            usage: None,
        }
    }

    /// Uses `groups` to bucket suggestions.
    pub fn with_groups(mut self, groups: Arc<dyn GroupCatalog>) -> Self {
        self.groups = groups;
        self
    }

    /// Uses `usage` to order suggestions by popularity.
    pub fn with_usage(mut self, usage: Arc<dyn UsageSignal>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn config(&self) -> &CanonConfig {
        &self.config
    }

    /// Explicitly registers a technology name.
    pub fn create_technology(&self, name: &str) -> CanonResult<TermId> {
        self.create_term("technology", name)
    }

    /// Explicitly registers a tag name.
    pub fn create_tag(&self, name: &str) -> CanonResult<TermId> {
        self.create_term("tag", name)
    }

    /// Registers `name` and makes it the preferred term of its cluster.
    ///
    /// `normalized_name` must normalize to the same key as `name`.
    pub fn create_preferred_term(&self, name: &str, normalized_name: &str) -> CanonResult<TermId> {
        let key = normalize(name);
        let declared = normalize(normalized_name);
        if key.is_empty() {
            return Err(RegistryError::InvalidTerm(name.to_string()).into());
        }
        if key != declared {
            return Err(RegistryError::InvalidPreferredTerm {
                key,
                preferred: declared,
            }
            .into());
        }

        self.mutate(|state| {
            let registration = state.registry.register(name)?;
            state
                .registry
                .set_preferred_term(&registration.key, &registration.key)?;
            let snapshot = state.registry.cluster_snapshot(&registration.key)?;
            Ok((registration.id, vec![Flush::Cluster(snapshot)]))
        })
    }

    /// Designates `preferred_name` as the preferred term of `name`'s cluster.
    pub fn set_preferred_term(
        &self,
        name: &str,
        preferred_name: &str,
    ) -> CanonResult<PreferredChange> {
        let key = normalize(name);
        let preferred = normalize(preferred_name);
        self.mutate(|state| {
            let change = state.registry.set_preferred_term(&key, &preferred)?;
            let snapshot = state.registry.cluster_snapshot(&key)?;
            Ok((change, vec![Flush::Cluster(snapshot)]))
        })
    }

    /// Links `synonym_name` to `technology_name`, merging their clusters.
    pub fn link_synonym(
        &self,
        technology_name: &str,
        synonym_name: &str,
    ) -> CanonResult<LinkOutcome> {
        for raw in [technology_name, synonym_name] {
            if normalize(raw).is_empty() {
                return Err(RegistryError::InvalidTerm(raw.to_string()).into());
            }
        }

        let outcome = self.mutate(|state| {
            let technology = state.registry.register(technology_name)?.key;
            let synonym = state.registry.register(synonym_name)?.key;
            let outcome = state.registry.link(&technology, &synonym)?;
            let mut snapshot = state.registry.cluster_snapshot(&outcome.root)?;
            snapshot.absorbed_root = outcome.absorbed_root.clone();
            Ok((outcome, vec![Flush::Cluster(snapshot)]))
        })?;

        info!(
            "event=link_synonym module=service status=ok merged={} conflict={}",
            outcome.merged,
            outcome.conflict_demoted.is_some()
        );
        Ok(outcome)
    }

    /// Blocks every name. Returns the keys that were newly blocked.
    pub fn create_blocked_terms<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> CanonResult<Vec<NormalizedKey>> {
        let keys = normalize_all(names)?;
        self.mutate(|state| {
            let added: Vec<NormalizedKey> = keys
                .into_iter()
                .filter(|key| state.blocklist.block(key.clone()))
                .collect();
            Ok((added.clone(), vec![Flush::Blocked(added)]))
        })
    }

    /// Unblocks every name. Returns the keys that were blocked before.
    pub fn unblock_terms<S: AsRef<str>>(&self, names: &[S]) -> CanonResult<Vec<NormalizedKey>> {
        let keys = normalize_all(names)?;
        self.mutate(|state| {
            let removed: Vec<NormalizedKey> = keys
                .into_iter()
                .filter(|key| state.blocklist.unblock(key))
                .collect();
            Ok((removed.clone(), vec![Flush::Unblocked(removed)]))
        })
    }

    /// Blocked keys in sorted order.
    pub fn blocked_terms(&self) -> Vec<NormalizedKey> {
        self.state.read().blocklist.blocked_keys()
    }

    /// Resolves one raw name without registering it.
    pub fn resolve(&self, name: &str) -> Resolution {
        self.state.read().resolve(name)
    }

    /// Returns the read model of one term.
    pub fn term(&self, name: &str) -> Option<Term> {
        self.state.read().registry.term(&normalize(name))
    }

    /// Members of the cluster containing `name`.
    pub fn cluster_members(&self, name: &str) -> CanonResult<BTreeSet<NormalizedKey>> {
        let state = self.state.read();
        let cluster = state.registry.resolve_cluster(&normalize(name))?;
        Ok(state.registry.members_of(cluster))
    }

    /// Matches free-text tags against the registry.
    ///
    /// Unknown tags are registered first when `auto_register_unknown` is set.
    pub fn match_tags<S: AsRef<str>>(&self, tags: &[S]) -> CanonResult<Vec<ResolvedTerm>> {
        if self.config.auto_register_unknown {
            self.register_unknown(tags)?;
        }
        Ok(self.state.read().match_many(tags))
    }

    /// Grouped suggestions for job search.
    pub fn get_job_suggestions(&self, query: &SuggestionQuery) -> CanonResult<SuggestionsResponse> {
        let state = self.state.read();
        Ok(self.suggestions.job_suggestions(
            &state,
            query,
            self.groups.as_ref(),
            self.usage.as_deref(),
        )?)
    }

    /// Ungrouped skill suggestions.
    pub fn get_skill_suggestions(
        &self,
        query: &SuggestionQuery,
    ) -> CanonResult<SkillSuggestionsData> {
        let state = self.state.read();
        Ok(self.suggestions.skill_suggestions(
            &state,
            query,
            self.groups.as_ref(),
            self.usage.as_deref(),
        )?)
    }

    fn create_term(&self, kind: &'static str, name: &str) -> CanonResult<TermId> {
        let (id, created) = self.mutate(|state| {
            let registration = state.registry.register(name)?;
            let snapshot = state.registry.cluster_snapshot(&registration.key)?;
            Ok((
                (registration.id, registration.created),
                vec![Flush::Cluster(snapshot)],
            ))
        })?;
        info!("event=create_term module=service status=ok kind={kind} created={created}");
        Ok(id)
    }

    fn register_unknown<S: AsRef<str>>(&self, tags: &[S]) -> CanonResult<()> {
        let pending: Vec<&str> = {
            let state = self.state.read();
            tags.iter()
                .map(AsRef::as_ref)
                .filter(|raw| matches!(state.resolve(raw), Resolution::Unknown(ref key) if !key.is_empty()))
                .collect()
        };
        if pending.is_empty() {
            return Ok(());
        }

        self.mutate(|state| {
            let mut flushes = Vec::with_capacity(pending.len());
            for raw in &pending {
                let registration = state.registry.register(raw)?;
                if registration.created {
                    flushes.push(Flush::Cluster(
                        state.registry.cluster_snapshot(&registration.key)?,
                    ));
                }
            }
            info!(
                "event=auto_register module=service status=ok count={}",
                flushes.len()
            );
            Ok(((), flushes))
        })
    }

    /// Runs one mutation under the write lock, then persists its flushes.
    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut CanonState) -> CanonResult<(T, Vec<Flush>)>,
    ) -> CanonResult<T> {
        let mut store = self.store.lock();
        let (value, flushes) = {
            let mut state = self.state.write();
            apply(&mut state)?
        };

        let Some(repo) = store.as_mut() else {
            return Ok(value);
        };
        for flush in &flushes {
            let result = match flush {
                Flush::Cluster(snapshot) => repo.save_cluster(snapshot),
                Flush::Blocked(keys) if !keys.is_empty() => repo.save_blocked(keys),
                Flush::Unblocked(keys) if !keys.is_empty() => repo.delete_blocked(keys),
                Flush::Blocked(_) | Flush::Unblocked(_) => Ok(()),
            };
            if let Err(err) = result {
                error!("event=flush module=service status=error error={err}");
                return Err(err.into());
            }
        }
        Ok(value)
    }
}

fn normalize_all<S: AsRef<str>>(names: &[S]) -> CanonResult<Vec<NormalizedKey>> {
    names
        .iter()
        .map(|raw| {
            let key = normalize(raw.as_ref());
            if key.is_empty() {
                Err(RegistryError::InvalidTerm(raw.as_ref().to_string()).into())
            } else {
                Ok(key)
            }
        })
        .collect()
}
