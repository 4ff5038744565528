//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the term store contract used by the canonicalization facade.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes only accept keys already in normalized form.
//! - Repository APIs return semantic errors (`InvalidData`) in addition to DB
//!   transport errors.

pub mod term_repo;
