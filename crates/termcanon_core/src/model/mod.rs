//! Domain model for canonicalized terms.
//!
//! # Responsibility
//! - Define the key, identity and read-model types shared by registry,
//!   storage and service layers.
//!
//! # Invariants
//! - A `NormalizedKey` is always the output of `canon::normalize`.
//! - Every registered term keeps one stable `TermId` for its lifetime.

pub mod term;
