//! Suggestion use-case service.
//!
//! # Responsibility
//! - Turn a free-text fragment or raw tag list into canonical suggestions.
//! - Apply group filtering, stable ordering and page slicing.
//!
//! # Invariants
//! - Pagination input is validated before any candidate is resolved.
//! - Blocked keys never appear; unknown keys appear only as explicit
//!   free-text pass-through.
//! - Each canonical label appears at most once per result set.
//! - Ordering: catalog group order, then usage (when supplied), then label.

use crate::canon::resolve::{CanonState, Resolution};
use crate::canon::normalize::normalize;
use crate::model::term::{LabelSource, NormalizedKey, ResolvedTerm};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Suggestion errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionError {
    /// Page or page size cannot produce a valid slice.
    InvalidPagination {
        page: i64,
        page_size: i64,
        reason: &'static str,
    },
}

impl Display for SuggestionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPagination {
                page,
                page_size,
                reason,
            } => write!(
                f,
                "invalid pagination page={page} page_size={page_size}: {reason}"
            ),
        }
    }
}

impl Error for SuggestionError {}

/// Pipeline stages of one suggestion query, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionStage {
    Received,
    Normalized,
    Filtered,
    Grouped,
    Paginated,
    Returned,
}

/// What the caller typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionInput {
    /// Partial text; matches registered keys containing its normalized form.
    Fragment(String),
    /// Explicit raw tags, resolved one by one.
    Terms(Vec<String>),
}

/// One suggestion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionQuery {
    pub input: SuggestionInput,
    /// Zero-based page number.
    pub page: i64,
    pub page_size: i64,
    /// Restrict results to one catalog group.
    pub group: Option<String>,
    /// Pass unregistered inputs through as free-text suggestions.
    pub include_unregistered: bool,
}

impl SuggestionQuery {
    pub fn fragment(text: impl Into<String>, page: i64, page_size: i64) -> Self {
        Self {
            input: SuggestionInput::Fragment(text.into()),
            page,
            page_size,
            group: None,
            include_unregistered: false,
        }
    }

    pub fn terms<S: Into<String>>(
        terms: impl IntoIterator<Item = S>,
        page: i64,
        page_size: i64,
    ) -> Self {
        Self {
            input: SuggestionInput::Terms(terms.into_iter().map(Into::into).collect()),
            page,
            page_size,
            group: None,
            include_unregistered: false,
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_unregistered(mut self) -> Self {
        self.include_unregistered = true;
        self
    }
}

/// Caller-defined group with an id/label pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionGroup {
    pub id: String,
    pub label: String,
}

/// Group with the number of matching suggestions before group filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: String,
    pub label: String,
    pub count: usize,
}

/// Maps canonical labels to caller-defined groups.
pub trait GroupCatalog: Send + Sync {
    /// Groups in display order.
    fn groups(&self) -> Vec<SuggestionGroup>;
    /// Group id of a canonical label, if any.
    fn group_of(&self, label: &NormalizedKey) -> Option<String>;
}

/// External popularity signal used to order suggestions.
pub trait UsageSignal: Send + Sync {
    fn usage_count(&self, label: &NormalizedKey) -> Option<u64>;
}

impl UsageSignal for HashMap<NormalizedKey, u64> {
    fn usage_count(&self, label: &NormalizedKey) -> Option<u64> {
        self.get(label).copied()
    }
}

/// In-memory group catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticGroupCatalog {
    groups: Vec<SuggestionGroup>,
    members: HashMap<NormalizedKey, String>,
}

impl StaticGroupCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group and assigns `terms` (raw spellings) to it.
    ///
    /// A term already assigned to an earlier group keeps that group.
    pub fn with_group<S: AsRef<str>>(
        mut self,
        id: impl Into<String>,
        label: impl Into<String>,
        terms: impl IntoIterator<Item = S>,
    ) -> Self {
        let id = id.into();
        for term in terms {
            self.members
                .entry(normalize(term.as_ref()))
                .or_insert_with(|| id.clone());
        }
        self.groups.push(SuggestionGroup {
            id,
            label: label.into(),
        });
        self
    }
}

impl GroupCatalog for StaticGroupCatalog {
    fn groups(&self) -> Vec<SuggestionGroup> {
        self.groups.clone()
    }

    fn group_of(&self, label: &NormalizedKey) -> Option<String> {
        self.members.get(label).cloned()
    }
}

/// One suggestion entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionItem {
    pub label: NormalizedKey,
    pub display_name: String,
    pub group: Option<String>,
    pub source: LabelSource,
    pub usage: Option<u64>,
}

/// Grouped suggestion page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    pub groups: Vec<GroupSummary>,
    pub active_group: Option<SuggestionGroup>,
    pub items: Vec<SuggestionItem>,
    pub page: u64,
    pub has_more: bool,
}

/// Ungrouped suggestion page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSuggestionsData {
    pub items: Vec<SuggestionItem>,
    pub page: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageRequest {
    page: u64,
    size: u64,
}

impl PageRequest {
    fn slice<T: Clone>(&self, items: &[T]) -> (Vec<T>, bool) {
        let total = items.len() as u64;
        let start = self.page.saturating_mul(self.size).min(total) as usize;
        let end = (self.page.saturating_add(1)).saturating_mul(self.size);
        let has_more = end < total;
        let end = end.min(total) as usize;
        (items[start..end].to_vec(), has_more)
    }
}

/// Stateless suggestion pipeline over a canonicalization state snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SuggestionService {
    max_page_size: u32,
}

impl SuggestionService {
    pub fn new(max_page_size: u32) -> Self {
        Self { max_page_size }
    }

    /// Grouped suggestions with per-group counts.
    pub fn job_suggestions(
        &self,
        state: &CanonState,
        query: &SuggestionQuery,
        catalog: &dyn GroupCatalog,
        usage: Option<&dyn UsageSignal>,
    ) -> Result<SuggestionsResponse, SuggestionError> {
        let page = self.validate_page(query)?;
        let candidates = self.collect_items(state, query, catalog, usage);

        let catalog_groups = catalog.groups();
        let groups = catalog_groups
            .iter()
            .map(|group| GroupSummary {
                id: group.id.clone(),
                label: group.label.clone(),
                count: candidates
                    .iter()
                    .filter(|item| item.group.as_deref() == Some(group.id.as_str()))
                    .count(),
            })
            .collect();
        let active_group = query.group.as_ref().and_then(|id| {
            catalog_groups
                .iter()
                .find(|group| &group.id == id)
                .cloned()
        });

        let ordered = order_items(filter_group(candidates, query), &catalog_groups, usage);
        log_stage(SuggestionStage::Grouped, ordered.len());
        let (items, has_more) = page.slice(&ordered);
        log_stage(SuggestionStage::Paginated, items.len());

        let response = SuggestionsResponse {
            groups,
            active_group,
            items,
            page: page.page,
            has_more,
        };
        log_stage(SuggestionStage::Returned, response.items.len());
        Ok(response)
    }

    /// Suggestions without group summaries.
    pub fn skill_suggestions(
        &self,
        state: &CanonState,
        query: &SuggestionQuery,
        catalog: &dyn GroupCatalog,
        usage: Option<&dyn UsageSignal>,
    ) -> Result<SkillSuggestionsData, SuggestionError> {
        let page = self.validate_page(query)?;
        let candidates = self.collect_items(state, query, catalog, usage);
        let ordered = order_items(filter_group(candidates, query), &catalog.groups(), usage);
        let (items, has_more) = page.slice(&ordered);
        log_stage(SuggestionStage::Returned, items.len());

        Ok(SkillSuggestionsData {
            items,
            page: page.page,
            has_more,
        })
    }

    fn validate_page(&self, query: &SuggestionQuery) -> Result<PageRequest, SuggestionError> {
        let invalid = |reason| SuggestionError::InvalidPagination {
            page: query.page,
            page_size: query.page_size,
            reason,
        };
        if query.page < 0 {
            return Err(invalid("page must not be negative"));
        }
        if query.page_size <= 0 {
            return Err(invalid("page size must be positive"));
        }
        if query.page_size > i64::from(self.max_page_size) {
            return Err(invalid("page size exceeds the configured maximum"));
        }
        log_stage(SuggestionStage::Received, 0);
        Ok(PageRequest {
            page: query.page as u64,
            size: query.page_size as u64,
        })
    }

    fn collect_items(
        &self,
        state: &CanonState,
        query: &SuggestionQuery,
        catalog: &dyn GroupCatalog,
        usage: Option<&dyn UsageSignal>,
    ) -> Vec<SuggestionItem> {
        let resolutions: Vec<Resolution> = match &query.input {
            SuggestionInput::Fragment(text) => {
                let fragment = normalize(text);
                let mut resolutions: Vec<Resolution> = state
                    .registry
                    .keys()
                    .filter(|key| key.as_str().contains(fragment.as_str()))
                    .map(|key| state.resolve_key(key))
                    .collect();
                if !fragment.is_empty() && !state.registry.contains(&fragment) {
                    resolutions.push(state.resolve_key(&fragment));
                }
                resolutions
            }
            SuggestionInput::Terms(terms) => terms.iter().map(|raw| state.resolve(raw)).collect(),
        };

        let mut seen = HashSet::new();
        let items: Vec<SuggestionItem> = resolutions
            .into_iter()
            .filter_map(|resolution| match resolution {
                Resolution::Resolved(term) => Some(term),
                Resolution::Unknown(key) if query.include_unregistered && !key.is_empty() => {
                    Some(ResolvedTerm {
                        display_name: key.to_string(),
                        canonical: key.clone(),
                        key,
                        source: LabelSource::FreeText,
                    })
                }
                Resolution::Unknown(_) | Resolution::Suppressed(_) => None,
            })
            .filter(|term| seen.insert(term.canonical.clone()))
            .map(|term| SuggestionItem {
                group: catalog.group_of(&term.canonical),
                usage: usage.and_then(|signal| signal.usage_count(&term.canonical)),
                label: term.canonical,
                display_name: term.display_name,
                source: term.source,
            })
            .collect();
        log_stage(SuggestionStage::Normalized, items.len());
        items
    }
}

fn filter_group(items: Vec<SuggestionItem>, query: &SuggestionQuery) -> Vec<SuggestionItem> {
    let Some(group) = query.group.as_deref() else {
        return items;
    };
    let filtered: Vec<_> = items
        .into_iter()
        .filter(|item| item.group.as_deref() == Some(group))
        .collect();
    log_stage(SuggestionStage::Filtered, filtered.len());
    filtered
}

fn order_items(
    mut items: Vec<SuggestionItem>,
    groups: &[SuggestionGroup],
    usage: Option<&dyn UsageSignal>,
) -> Vec<SuggestionItem> {
    let positions: HashMap<&str, usize> = groups
        .iter()
        .enumerate()
        .map(|(position, group)| (group.id.as_str(), position))
        .collect();
    let group_rank = |item: &SuggestionItem| {
        item.group
            .as_deref()
            .and_then(|id| positions.get(id).copied())
            .unwrap_or(usize::MAX)
    };

    items.sort_by(|a, b| {
        let by_group = group_rank(a).cmp(&group_rank(b));
        let by_usage = if usage.is_some() {
            b.usage.unwrap_or(0).cmp(&a.usage.unwrap_or(0))
        } else {
            std::cmp::Ordering::Equal
        };
        by_group.then(by_usage).then_with(|| a.label.cmp(&b.label))
    });
    items
}

fn log_stage(stage: SuggestionStage, count: usize) {
    debug!(
        "event=suggest module=suggestion stage={:?} count={}",
        stage, count
    );
}

#[cfg(test)]
mod tests {
    use super::{
        GroupCatalog, PageRequest, StaticGroupCatalog, SuggestionError, SuggestionQuery,
        SuggestionService, UsageSignal,
    };
    use crate::canon::normalize;
    use crate::canon::resolve::CanonState;
    use crate::model::term::{LabelSource, NormalizedKey};
    use std::collections::HashMap;

    fn state() -> CanonState {
        let mut state = CanonState::default();
        for raw in ["Rust", "Ruby", "Rails", "React", "Redux", "Go"] {
            state.registry.register(raw).unwrap();
        }
        state
    }

    #[test]
    fn page_request_slices_and_reports_more() {
        let items: Vec<u32> = (0..5).collect();
        let page = PageRequest { page: 1, size: 2 };
        assert_eq!(page.slice(&items), (vec![2, 3], true));
        let last = PageRequest { page: 2, size: 2 };
        assert_eq!(last.slice(&items), (vec![4], false));
        let beyond = PageRequest { page: 9, size: 2 };
        assert_eq!(beyond.slice(&items), (Vec::new(), false));
    }

    #[test]
    fn rejects_bad_pagination_before_work() {
        let service = SuggestionService::new(50);
        let catalog = StaticGroupCatalog::new();
        for (page, size) in [(-1, 10), (0, 0), (0, -3), (0, 51)] {
            let query = SuggestionQuery::fragment("r", page, size);
            let err = service
                .job_suggestions(&state(), &query, &catalog, None)
                .unwrap_err();
            assert!(matches!(err, SuggestionError::InvalidPagination { .. }));
        }
    }

    #[test]
    fn fragment_matches_contained_keys_in_label_order() {
        let service = SuggestionService::new(50);
        let query = SuggestionQuery::fragment("R", 0, 10);
        let data = service
            .skill_suggestions(&state(), &query, &StaticGroupCatalog::new(), None)
            .unwrap();
        let labels: Vec<_> = data.items.iter().map(|item| item.label.as_str()).collect();
        assert_eq!(labels, vec!["rails", "react", "redux", "ruby", "rust"]);
        assert!(!data.has_more);
    }

    #[test]
    fn groups_report_counts_and_filter_items() {
        let service = SuggestionService::new(50);
        let catalog = StaticGroupCatalog::new()
            .with_group("lang", "Languages", ["Rust", "Ruby", "Go"])
            .with_group("web", "Web", ["React", "Redux", "Rails"]);
        assert_eq!(catalog.group_of(&normalize("rails")).as_deref(), Some("web"));

        let query = SuggestionQuery::fragment("r", 0, 2).in_group("web");
        let response = service
            .job_suggestions(&state(), &query, &catalog, None)
            .unwrap();
        let counts: Vec<_> = response
            .groups
            .iter()
            .map(|group| (group.id.as_str(), group.count))
            .collect();
        assert_eq!(counts, vec![("lang", 2), ("web", 3)]);
        assert_eq!(response.active_group.unwrap().label, "Web");
        let labels: Vec<_> = response.items.iter().map(|item| item.label.as_str()).collect();
        assert_eq!(labels, vec!["rails", "react"]);
        assert!(response.has_more);
    }

    fn labels(items: &[super::SuggestionItem]) -> Vec<&str> {
        items.iter().map(|item| item.label.as_str()).collect()
    }

    #[test]
    fn usage_signal_orders_before_label() {
        let service = SuggestionService::new(50);
        let usage: HashMap<NormalizedKey, u64> = [("rust", 5), ("ruby", 9), ("react", 5)]
            .into_iter()
            .map(|(raw, count)| (normalize(raw), count))
            .collect();
        let query = SuggestionQuery::fragment("r", 0, 10);
        let data = service
            .skill_suggestions(
                &state(),
                &query,
                &StaticGroupCatalog::new(),
                Some(&usage as &dyn UsageSignal),
            )
            .unwrap();
        assert_eq!(
            labels(&data.items),
            vec!["ruby", "react", "rust", "rails", "redux"]
        );
        assert_eq!(data.items[0].usage, Some(9));
        assert_eq!(data.items[3].usage, None);
    }

    #[test]
    fn unregistered_input_passes_through_only_on_request() {
        let service = SuggestionService::new(50);
        let catalog = StaticGroupCatalog::new();
        let mut state = state();
        state.blocklist.block(normalize("cobol"));

        let plain = SuggestionQuery::fragment("Elixir", 0, 10);
        let data = service
            .skill_suggestions(&state, &plain, &catalog, None)
            .unwrap();
        assert!(data.items.is_empty());

        let free = SuggestionQuery::fragment("Elixir", 0, 10).with_unregistered();
        let data = service
            .skill_suggestions(&state, &free, &catalog, None)
            .unwrap();
        assert_eq!(labels(&data.items), vec!["elixir"]);
        assert_eq!(data.items[0].source, LabelSource::FreeText);
        assert_eq!(data.items[0].display_name, "elixir");

        let blocked = SuggestionQuery::fragment("COBOL", 0, 10).with_unregistered();
        let data = service
            .skill_suggestions(&state, &blocked, &catalog, None)
            .unwrap();
        assert!(data.items.is_empty());
    }

    #[test]
    fn term_list_input_resolves_each_term_once() {
        let service = SuggestionService::new(50);
        let catalog = StaticGroupCatalog::new();
        let query = SuggestionQuery::terms(["Rust", "RUST ", "Go", "Kotlin"], 0, 10);
        let data = service
            .skill_suggestions(&state(), &query, &catalog, None)
            .unwrap();
        assert_eq!(labels(&data.items), vec!["go", "rust"]);

        let query = SuggestionQuery::terms(["Rust", "Kotlin"], 0, 10).with_unregistered();
        let data = service
            .skill_suggestions(&state(), &query, &catalog, None)
            .unwrap();
        assert_eq!(labels(&data.items), vec!["kotlin", "rust"]);
        assert_eq!(data.items[0].source, LabelSource::FreeText);
        assert_eq!(data.items[1].source, LabelSource::Fallback);
    }

    #[test]
    fn blocked_keys_drop_and_clusters_share_one_label() {
        let service = SuggestionService::new(50);
        let mut state = state();
        state
            .registry
            .link(&normalize("react"), &normalize("redux"))
            .unwrap();
        state
            .registry
            .set_preferred_term(&normalize("redux"), &normalize("react"))
            .unwrap();
        state.blocklist.block(normalize("ruby"));

        let query = SuggestionQuery::fragment("r", 0, 10);
        let data = service
            .skill_suggestions(&state, &query, &StaticGroupCatalog::new(), None)
            .unwrap();
        assert_eq!(labels(&data.items), vec!["rails", "react", "rust"]);
        let react = &data.items[1];
        assert_eq!(react.source, LabelSource::Preferred);
        assert_eq!(react.display_name, "React");
    }
}
