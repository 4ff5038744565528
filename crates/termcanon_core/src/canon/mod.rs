//! Term canonicalization core.
//!
//! # Responsibility
//! - Normalize raw term spellings into comparable keys.
//! - Track synonym clusters and their preferred labels.
//! - Filter blocked keys out of every resolution path.
//!
//! # Invariants
//! - Every registered key belongs to exactly one cluster.
//! - A cluster's preferred term is always one of its members.
//! - Blocked keys are never returned as a resolved label.

pub mod blocklist;
pub mod normalize;
pub mod registry;
pub mod resolve;

pub use blocklist::Blocklist;
pub use normalize::normalize;
pub use registry::{
    ClusterId, ClusterRecord, ClusterSnapshot, LinkOutcome, PreferredChange, Registration,
    RegistryError, RegistryResult, RegistrySnapshot, SynonymRegistry, TermRecord,
};
pub use resolve::{CanonState, Resolution};
