//! Synonym registry: disjoint-set clusters over normalized term keys.
//!
//! # Responsibility
//! - Register terms as singleton clusters and merge clusters on `link`.
//! - Keep at most one preferred term per cluster, stored at the root.
//! - Export/restore a compact snapshot for storage.
//!
//! # Invariants
//! - Nodes live in index arenas (`parents`, `sizes`, `ring`); no node is
//!   ever removed, so indices are stable for the registry lifetime.
//! - `sizes` and `preferred` are only meaningful at roots.
//! - `ring` links every cluster's members into one cycle.
//! - Every mutation validates its inputs before touching any arena.
//!
//! Parent links are atomics so that `find` can compress paths while holding
//! only a shared borrow. Any ancestor is a valid parent, so concurrent
//! compressions cannot corrupt the forest. Unions need `&mut self`.

use crate::canon::normalize::{is_normalized, normalize};
use crate::logging::sanitize_message;
use crate::model::term::{NormalizedKey, Term, TermId};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

const LOG_TERM_MAX_CHARS: usize = 64;

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Raw input normalizes to an empty key.
    InvalidTerm(String),
    /// Lookup on a key that was never registered.
    UnknownTerm(NormalizedKey),
    /// Designated preferred term is not a member of the target cluster.
    InvalidPreferredTerm {
        key: NormalizedKey,
        preferred: NormalizedKey,
    },
    /// Snapshot cannot be turned back into a valid partition.
    CorruptSnapshot(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTerm(raw) => write!(f, "term `{raw}` is empty after normalization"),
            Self::UnknownTerm(key) => write!(f, "unknown term: {key}"),
            Self::InvalidPreferredTerm { key, preferred } => write!(
                f,
                "preferred term `{preferred}` is not in the cluster of `{key}`"
            ),
            Self::CorruptSnapshot(message) => write!(f, "corrupt registry snapshot: {message}"),
        }
    }
}

impl Error for RegistryError {}

/// Identity of a cluster: the index of its current root node.
///
/// Only stable until the next structural mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterId(usize);

impl ClusterId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PreferredMark {
    node: usize,
    seq: u64,
}

/// Result of a successful `link`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    /// `false` when both terms were already in one cluster.
    pub merged: bool,
    /// Root of the resulting cluster.
    pub cluster: ClusterId,
    /// Root key of the resulting cluster.
    pub root: NormalizedKey,
    /// Root key of the cluster that was absorbed, if any.
    pub absorbed_root: Option<NormalizedKey>,
    /// Preferred term of the resulting cluster.
    pub preferred: Option<NormalizedKey>,
    /// Preferred term that lost a merge conflict and became a plain member.
    pub conflict_demoted: Option<NormalizedKey>,
}

/// Result of a successful preferred-term designation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferredChange {
    pub cluster: ClusterId,
    pub previous: Option<NormalizedKey>,
    pub changed: bool,
}

/// Result of registering a raw spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: TermId,
    pub key: NormalizedKey,
    pub created: bool,
}

/// Persisted form of one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRecord {
    pub id: TermId,
    pub key: NormalizedKey,
    pub root_key: NormalizedKey,
    /// Registration order; decides tie-breaks between equal clusters.
    pub ordinal: u64,
    pub spellings: Vec<String>,
}

/// Persisted form of one cluster root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub root_key: NormalizedKey,
    pub preferred_key: Option<NormalizedKey>,
    pub preferred_seq: Option<u64>,
}

/// One cluster's full persisted state after a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub cluster: ClusterRecord,
    pub members: Vec<TermRecord>,
    /// Root that no longer exists and must be dropped from storage.
    pub absorbed_root: Option<NormalizedKey>,
}

/// Whole-registry persisted state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub terms: Vec<TermRecord>,
    pub clusters: Vec<ClusterRecord>,
}

/// Union-find registry with union-by-size and path compression.
#[derive(Debug, Default)]
pub struct SynonymRegistry {
    index: HashMap<NormalizedKey, usize>,
    keys: Vec<NormalizedKey>,
    ids: Vec<TermId>,
    ordinals: Vec<u64>,
    spellings: Vec<Vec<String>>,
    parents: Vec<AtomicUsize>,
    sizes: Vec<usize>,
    ring: Vec<usize>,
    preferred: Vec<Option<PreferredMark>>,
    next_ordinal: u64,
    clock: u64,
}

impl SynonymRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &NormalizedKey) -> bool {
        self.index.contains_key(key)
    }

    /// Iterates registered keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &NormalizedKey> {
        self.keys.iter()
    }

    /// Returns the read model of one term.
    pub fn term(&self, key: &NormalizedKey) -> Option<Term> {
        let node = self.node(key)?;
        Some(Term {
            id: self.ids[node],
            key: self.keys[node].clone(),
            spellings: self.spellings[node].clone(),
        })
    }

    /// Returns the first registered spelling of `key`, or `None` when unregistered.
    pub fn display_name(&self, key: &NormalizedKey) -> Option<&str> {
        let node = self.node(key)?;
        Some(
            self.spellings[node]
                .first()
                .map(String::as_str)
                .unwrap_or_else(|| self.keys[node].as_str()),
        )
    }

    /// Registers `key` as a singleton cluster if absent. Idempotent.
    pub fn ensure_term(&mut self, key: &NormalizedKey) -> RegistryResult<TermId> {
        let node = self.ensure_node(key)?.0;
        Ok(self.ids[node])
    }

    /// Normalizes `raw`, registers its key, and records `raw` as a spelling.
    pub fn register(&mut self, raw: &str) -> RegistryResult<Registration> {
        let key = normalize(raw);
        let (node, created) = self.ensure_node_for_raw(&key, raw)?;
        let spelling = raw.trim();
        if !self.spellings[node].iter().any(|known| known == spelling) {
            self.spellings[node].push(spelling.to_string());
        }
        Ok(Registration {
            id: self.ids[node],
            key,
            created,
        })
    }

    /// Merges the clusters containing `a` and `b`, registering either if needed.
    ///
    /// Conflict policy when both clusters carry different preferred terms:
    /// the larger cluster becomes the root and keeps its preferred term; on
    /// equal sizes the earlier designation wins. The losing preferred term
    /// stays a member and is reported in `conflict_demoted`.
    pub fn link(&mut self, a: &NormalizedKey, b: &NormalizedKey) -> RegistryResult<LinkOutcome> {
        if a.is_empty() {
            return Err(RegistryError::InvalidTerm(a.to_string()));
        }
        if b.is_empty() {
            return Err(RegistryError::InvalidTerm(b.to_string()));
        }

        let node_a = self.ensure_node(a)?.0;
        let node_b = self.ensure_node(b)?.0;
        let root_a = self.find(node_a);
        let root_b = self.find(node_b);

        if root_a == root_b {
            debug!(
                "event=link module=registry status=noop root={}",
                log_term(&self.keys[root_a])
            );
            return Ok(LinkOutcome {
                merged: false,
                cluster: ClusterId(root_a),
                root: self.keys[root_a].clone(),
                absorbed_root: None,
                preferred: self.preferred_key_at(root_a),
                conflict_demoted: None,
            });
        }

        let (winner, loser) = self.union_order(root_a, root_b);
        let conflict_demoted = match (self.preferred[winner], self.preferred[loser]) {
            (Some(_), Some(lost)) => Some(self.keys[lost.node].clone()),
            (None, Some(adopted)) => {
                self.preferred[winner] = Some(adopted);
                None
            }
            _ => None,
        };
        self.preferred[loser] = None;

        self.parents[loser].store(winner, Ordering::Relaxed);
        self.sizes[winner] += self.sizes[loser];
        self.ring.swap(winner, loser);

        let preferred = self.preferred_key_at(winner);
        if let Some(demoted) = conflict_demoted.as_ref() {
            warn!(
                "event=link_conflict module=registry status=demoted root={} kept={} demoted={}",
                log_term(&self.keys[winner]),
                preferred.as_ref().map_or_else(String::new, log_term),
                log_term(demoted)
            );
        }
        debug!(
            "event=link module=registry status=merged root={} absorbed={} size={}",
            log_term(&self.keys[winner]),
            log_term(&self.keys[loser]),
            self.sizes[winner]
        );

        Ok(LinkOutcome {
            merged: true,
            cluster: ClusterId(winner),
            root: self.keys[winner].clone(),
            absorbed_root: Some(self.keys[loser].clone()),
            preferred,
            conflict_demoted,
        })
    }

    /// Designates `preferred` as the preferred term of `key`'s cluster.
    ///
    /// A self-designation (`key == preferred`) registers the term when absent.
    pub fn set_preferred_term(
        &mut self,
        key: &NormalizedKey,
        preferred: &NormalizedKey,
    ) -> RegistryResult<PreferredChange> {
        let node = match self.node(key) {
            Some(node) => node,
            None if key == preferred => self.ensure_node(key)?.0,
            None => return Err(RegistryError::UnknownTerm(key.clone())),
        };
        let invalid = || RegistryError::InvalidPreferredTerm {
            key: key.clone(),
            preferred: preferred.clone(),
        };
        let preferred_node = self.node(preferred).ok_or_else(invalid)?;
        let root = self.find(node);
        if self.find(preferred_node) != root {
            return Err(invalid());
        }

        let previous = self.preferred[root];
        if previous.map(|mark| mark.node) == Some(preferred_node) {
            return Ok(PreferredChange {
                cluster: ClusterId(root),
                previous: Some(preferred.clone()),
                changed: false,
            });
        }

        let seq = self.tick();
        self.preferred[root] = Some(PreferredMark {
            node: preferred_node,
            seq,
        });
        debug!(
            "event=set_preferred module=registry status=ok root={} preferred={}",
            log_term(&self.keys[root]),
            log_term(preferred)
        );

        Ok(PreferredChange {
            cluster: ClusterId(root),
            previous: previous.map(|mark| self.keys[mark.node].clone()),
            changed: true,
        })
    }

    /// Returns the current root of `key`'s cluster, compressing the path.
    pub fn resolve_cluster(&self, key: &NormalizedKey) -> RegistryResult<ClusterId> {
        let node = self
            .node(key)
            .ok_or_else(|| RegistryError::UnknownTerm(key.clone()))?;
        Ok(ClusterId(self.find(node)))
    }

    /// Returns the preferred term of `key`'s cluster.
    pub fn preferred_term_of(&self, key: &NormalizedKey) -> RegistryResult<Option<NormalizedKey>> {
        let cluster = self.resolve_cluster(key)?;
        Ok(self.preferred_key_at(cluster.0))
    }

    /// Returns every member of the cluster containing node `cluster`.
    pub fn members_of(&self, cluster: ClusterId) -> BTreeSet<NormalizedKey> {
        let mut members = BTreeSet::new();
        if cluster.0 >= self.keys.len() {
            return members;
        }
        let mut current = cluster.0;
        loop {
            members.insert(self.keys[current].clone());
            current = self.ring[current];
            if current == cluster.0 {
                break;
            }
        }
        members
    }

    /// Captures the persisted state of `key`'s cluster.
    pub fn cluster_snapshot(&self, key: &NormalizedKey) -> RegistryResult<ClusterSnapshot> {
        let cluster = self.resolve_cluster(key)?;
        let root = cluster.0;
        let mut members = Vec::with_capacity(self.sizes[root]);
        let mut current = root;
        loop {
            members.push(self.term_record(current, root));
            current = self.ring[current];
            if current == root {
                break;
            }
        }
        members.sort_by_key(|record| record.ordinal);

        Ok(ClusterSnapshot {
            cluster: self.cluster_record(root),
            members,
            absorbed_root: None,
        })
    }

    /// Captures the full persisted state.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::default();
        for node in 0..self.keys.len() {
            let root = self.find(node);
            snapshot.terms.push(self.term_record(node, root));
            if root == node {
                snapshot.clusters.push(self.cluster_record(root));
            }
        }
        snapshot
    }

    /// Rebuilds a registry from a snapshot without replaying link history.
    pub fn restore(snapshot: RegistrySnapshot) -> RegistryResult<Self> {
        let mut registry = Self::new();
        let mut terms = snapshot.terms;
        terms.sort_by_key(|record| record.ordinal);

        for record in &terms {
            if record.key.is_empty() || !is_normalized(record.key.as_str()) {
                return Err(RegistryError::CorruptSnapshot(format!(
                    "term key `{}` is not normalized",
                    record.key
                )));
            }
            if registry.contains(&record.key) {
                return Err(RegistryError::CorruptSnapshot(format!(
                    "duplicate term key `{}`",
                    record.key
                )));
            }
            let node = registry.push_node(record.key.clone(), record.id);
            registry.ordinals[node] = record.ordinal;
            registry.next_ordinal = registry.next_ordinal.max(record.ordinal + 1);
            registry.spellings[node] = record.spellings.clone();
        }

        for (node, record) in terms.iter().enumerate() {
            let root = registry.node(&record.root_key).ok_or_else(|| {
                RegistryError::CorruptSnapshot(format!(
                    "term `{}` points at unknown root `{}`",
                    record.key, record.root_key
                ))
            })?;
            let root_record = &terms[root];
            if root_record.root_key != root_record.key {
                return Err(RegistryError::CorruptSnapshot(format!(
                    "root `{}` is not self-rooted",
                    record.root_key
                )));
            }
            if node != root {
                registry.parents[node].store(root, Ordering::Relaxed);
                registry.sizes[root] += 1;
                registry.ring.swap(node, root);
            }
        }

        for cluster in snapshot.clusters {
            let root = registry.node(&cluster.root_key).ok_or_else(|| {
                RegistryError::CorruptSnapshot(format!("unknown cluster root `{}`", cluster.root_key))
            })?;
            if registry.find(root) != root {
                return Err(RegistryError::CorruptSnapshot(format!(
                    "cluster `{}` is not a root",
                    cluster.root_key
                )));
            }
            let Some(preferred_key) = cluster.preferred_key else {
                continue;
            };
            let preferred_node = registry
                .node(&preferred_key)
                .filter(|node| registry.find(*node) == root)
                .ok_or_else(|| {
                    RegistryError::CorruptSnapshot(format!(
                        "preferred `{preferred_key}` is not a member of `{}`",
                        cluster.root_key
                    ))
                })?;
            let seq = cluster.preferred_seq.unwrap_or_default();
            registry.clock = registry.clock.max(seq);
            registry.preferred[root] = Some(PreferredMark {
                node: preferred_node,
                seq,
            });
        }

        Ok(registry)
    }

    fn node(&self, key: &NormalizedKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    fn ensure_node(&mut self, key: &NormalizedKey) -> RegistryResult<(usize, bool)> {
        self.ensure_node_for_raw(key, key.as_str())
    }

    fn ensure_node_for_raw(
        &mut self,
        key: &NormalizedKey,
        raw: &str,
    ) -> RegistryResult<(usize, bool)> {
        if key.is_empty() {
            return Err(RegistryError::InvalidTerm(raw.to_string()));
        }
        if let Some(node) = self.node(key) {
            return Ok((node, false));
        }
        let node = self.push_node(key.clone(), Uuid::new_v4());
        debug!(
            "event=term_registered module=registry status=ok key={}",
            log_term(key)
        );
        Ok((node, true))
    }

    fn push_node(&mut self, key: NormalizedKey, id: TermId) -> usize {
        let node = self.keys.len();
        self.index.insert(key.clone(), node);
        self.keys.push(key);
        self.ids.push(id);
        self.ordinals.push(self.next_ordinal);
        self.next_ordinal += 1;
        self.spellings.push(Vec::new());
        self.parents.push(AtomicUsize::new(node));
        self.sizes.push(1);
        self.ring.push(node);
        self.preferred.push(None);
        node
    }

    fn find(&self, node: usize) -> usize {
        let mut root = node;
        loop {
            let parent = self.parents[root].load(Ordering::Relaxed);
            if parent == root {
                break;
            }
            root = parent;
        }

        let mut current = node;
        while current != root {
            let next = self.parents[current].load(Ordering::Relaxed);
            self.parents[current].store(root, Ordering::Relaxed);
            current = next;
        }
        root
    }

    /// Picks `(winner, loser)` for a union of two distinct roots.
    fn union_order(&self, a: usize, b: usize) -> (usize, usize) {
        let by_size = self.sizes[a].cmp(&self.sizes[b]);
        let a_wins = match by_size {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => match (self.preferred[a], self.preferred[b]) {
                (Some(pa), Some(pb)) => pa.seq <= pb.seq,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => self.ordinals[a] < self.ordinals[b],
            },
        };
        if a_wins {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn preferred_key_at(&self, root: usize) -> Option<NormalizedKey> {
        self.preferred[root].map(|mark| self.keys[mark.node].clone())
    }

    fn term_record(&self, node: usize, root: usize) -> TermRecord {
        TermRecord {
            id: self.ids[node],
            key: self.keys[node].clone(),
            root_key: self.keys[root].clone(),
            ordinal: self.ordinals[node],
            spellings: self.spellings[node].clone(),
        }
    }

    fn cluster_record(&self, root: usize) -> ClusterRecord {
        let mark = self.preferred[root];
        ClusterRecord {
            root_key: self.keys[root].clone(),
            preferred_key: mark.map(|mark| self.keys[mark.node].clone()),
            preferred_seq: mark.map(|mark| mark.seq),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

fn log_term(key: &NormalizedKey) -> String {
    sanitize_message(key.as_str(), LOG_TERM_MAX_CHARS)
}
